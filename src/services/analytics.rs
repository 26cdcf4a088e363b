use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder, QuerySelect};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::{
    entities::{
        invoice::{self, InvoiceStatus},
        order::{self, OrderStatus, PaymentStatus},
    },
    errors::ServiceError,
};

const RECENT_ORDERS: u64 = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PeriodRollup {
    pub orders: u64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct InvoiceStats {
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
    /// Sum of pending and overdue invoice amounts.
    pub outstanding_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderStats {
    pub total_orders: u64,
    /// Revenue of orders that are neither cancelled nor returned.
    pub total_revenue: Decimal,
    pub average_order_value: Decimal,
    pub by_status: BTreeMap<String, u64>,
    pub by_payment_status: BTreeMap<String, u64>,
    pub today: PeriodRollup,
    pub last_7_days: PeriodRollup,
    pub last_30_days: PeriodRollup,
    pub recent_orders: Vec<order::Model>,
    pub invoices: InvoiceStats,
    pub generated_at: DateTime<Utc>,
}

/// Columns the order aggregate needs.
pub type OrderRow = (DateTime<Utc>, Decimal, OrderStatus, PaymentStatus);

fn counts_revenue(status: OrderStatus) -> bool {
    !matches!(status, OrderStatus::Cancelled | OrderStatus::Returned)
}

/// Aggregates order rows relative to `now`. Recent orders and invoice
/// stats are left empty.
pub fn summarize_orders(rows: &[OrderRow], now: DateTime<Utc>) -> OrderStats {
    let today_start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|start| start.and_utc())
        .unwrap_or(now);
    let week_start = now - Duration::days(7);
    let month_start = now - Duration::days(30);

    let mut stats = OrderStats {
        total_orders: rows.len() as u64,
        total_revenue: Decimal::ZERO,
        average_order_value: Decimal::ZERO,
        by_status: BTreeMap::new(),
        by_payment_status: BTreeMap::new(),
        today: PeriodRollup::default(),
        last_7_days: PeriodRollup::default(),
        last_30_days: PeriodRollup::default(),
        recent_orders: Vec::new(),
        invoices: InvoiceStats::default(),
        generated_at: now,
    };

    let mut revenue_orders = 0u64;
    for (order_date, amount, status, payment_status) in rows {
        *stats.by_status.entry(status.to_string()).or_default() += 1;
        *stats
            .by_payment_status
            .entry(payment_status.to_string())
            .or_default() += 1;

        let revenue = if counts_revenue(*status) {
            revenue_orders += 1;
            stats.total_revenue += *amount;
            *amount
        } else {
            Decimal::ZERO
        };

        for (start, rollup) in [
            (today_start, &mut stats.today),
            (week_start, &mut stats.last_7_days),
            (month_start, &mut stats.last_30_days),
        ] {
            if *order_date >= start {
                rollup.orders += 1;
                rollup.revenue += revenue;
            }
        }
    }

    if revenue_orders > 0 {
        stats.average_order_value = (stats.total_revenue / Decimal::from(revenue_orders)).round_dp(2);
    }
    stats
}

pub fn summarize_invoices(rows: &[(InvoiceStatus, Decimal)]) -> InvoiceStats {
    let mut stats = InvoiceStats {
        total: rows.len() as u64,
        ..Default::default()
    };
    for (status, amount) in rows {
        *stats.by_status.entry(status.to_string()).or_default() += 1;
        if matches!(status, InvoiceStatus::Pending | InvoiceStatus::Overdue) {
            stats.outstanding_amount += *amount;
        }
    }
    stats
}

/// Read-side dashboard aggregate over orders and invoices.
#[derive(Clone)]
pub struct AnalyticsService {
    db: Arc<DatabaseConnection>,
}

impl AnalyticsService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn get_order_stats(&self) -> Result<OrderStats, ServiceError> {
        let db = &*self.db;
        let now = Utc::now();

        let rows: Vec<OrderRow> = order::Entity::find()
            .select_only()
            .column(order::Column::OrderDate)
            .column(order::Column::FinalAmount)
            .column(order::Column::Status)
            .column(order::Column::PaymentStatus)
            .into_tuple()
            .all(db)
            .await?;

        let invoice_rows: Vec<(InvoiceStatus, Decimal)> = invoice::Entity::find()
            .select_only()
            .column(invoice::Column::Status)
            .column(invoice::Column::Amount)
            .into_tuple()
            .all(db)
            .await?;

        let recent_orders = order::Entity::find()
            .order_by_desc(order::Column::OrderDate)
            .limit(RECENT_ORDERS)
            .all(db)
            .await?;

        let mut stats = summarize_orders(&rows, now);
        stats.recent_orders = recent_orders;
        stats.invoices = summarize_invoices(&invoice_rows);

        info!(
            total_orders = stats.total_orders,
            total_revenue = %stats.total_revenue,
            "order stats generated"
        );
        Ok(stats)
    }
}
