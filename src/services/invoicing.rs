use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::InvoiceConfig,
    entities::invoice::{self, Entity as InvoiceEntity, InvoiceStatus},
    errors::ServiceError,
    services::{date_coded_number, orders::find_order},
};

const INVOICE_NUMBER_ATTEMPTS: usize = 10;

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateInvoiceRequest {
    /// Defaults to the configured number of days after issue.
    pub due_date: Option<DateTime<Utc>>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub payment_method: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub payment_reference: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateInvoiceRequest {
    pub status: Option<InvoiceStatus>,
    pub due_date: Option<DateTime<Utc>>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub payment_method: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub payment_reference: Option<String>,
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Billing documents derived from orders.
///
/// Invoices are decoupled from the order lifecycle once created: changing
/// the order does not touch its invoice and vice versa.
#[derive(Clone)]
pub struct InvoiceService {
    db: Arc<DatabaseConnection>,
    config: InvoiceConfig,
}

impl InvoiceService {
    pub fn new(db: Arc<DatabaseConnection>, config: InvoiceConfig) -> Self {
        Self { db, config }
    }

    /// Issues the invoice for an order, copying its amounts.
    #[instrument(skip(self, request), fields(order_id = %order_id))]
    pub async fn create_invoice(
        &self,
        order_id: Uuid,
        request: CreateInvoiceRequest,
    ) -> Result<invoice::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db;
        let order = find_order(db, order_id).await?;

        if self.find_for_order(order_id).await?.is_some() {
            return Err(ServiceError::InvoiceAlreadyExists(order_id));
        }

        let now = Utc::now();
        let due_date = request
            .due_date
            .unwrap_or_else(|| now + Duration::days(self.config.default_due_days));
        if due_date < now - Duration::days(1) {
            return Err(ServiceError::ValidationError(
                "Due date must not be in the past".to_string(),
            ));
        }

        let invoice_number = self.allocate_invoice_number(now).await?;
        let created = invoice::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_number: Set(invoice_number),
            order_id: Set(order.id),
            issue_date: Set(now),
            due_date: Set(due_date),
            amount: Set(order.final_amount),
            tax_amount: Set(order.tax_amount),
            status: Set(InvoiceStatus::Pending),
            payment_method: Set(request.payment_method.or(Some(order.payment_method))),
            payment_reference: Set(request.payment_reference),
            payment_date: Set(None),
            notes: Set(request.notes),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                warn!("Concurrent invoice creation for order {}", order_id);
                ServiceError::InvoiceAlreadyExists(order_id)
            } else {
                error!("Failed to insert invoice for order {}: {}", order_id, e);
                ServiceError::DatabaseError(e)
            }
        })?;

        info!(
            invoice_id = %created.id,
            invoice_number = %created.invoice_number,
            amount = %created.amount,
            "invoice created"
        );
        Ok(created)
    }

    /// Applies the provided fields. Moving to `paid` records the payment
    /// date unless one is already set.
    #[instrument(skip(self, request), fields(invoice_id = %invoice_id))]
    pub async fn update_invoice(
        &self,
        invoice_id: Uuid,
        request: UpdateInvoiceRequest,
    ) -> Result<invoice::Model, ServiceError> {
        request.validate()?;
        let existing = self.get_invoice(invoice_id).await?;
        let now = Utc::now();
        let payment_date_missing = existing.payment_date.is_none();

        let mut active: invoice::ActiveModel = existing.into();
        if let Some(status) = request.status {
            active.status = Set(status);
            if status == InvoiceStatus::Paid && payment_date_missing {
                active.payment_date = Set(Some(now));
            }
        }
        if let Some(due_date) = request.due_date {
            active.due_date = Set(due_date);
        }
        if let Some(notes) = request.notes {
            active.notes = Set(Some(notes));
        }
        if let Some(method) = request.payment_method {
            active.payment_method = Set(Some(method));
        }
        if let Some(reference) = request.payment_reference {
            active.payment_reference = Set(Some(reference));
        }
        active.updated_at = Set(Some(now));

        let updated = active.update(&*self.db).await.map_err(|e| {
            error!("Failed to update invoice {}: {}", invoice_id, e);
            ServiceError::DatabaseError(e)
        })?;
        info!(status = %updated.status, "invoice updated");
        Ok(updated)
    }

    pub async fn get_invoice(&self, invoice_id: Uuid) -> Result<invoice::Model, ServiceError> {
        InvoiceEntity::find_by_id(invoice_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Invoice {} not found", invoice_id)))
    }

    pub async fn get_invoice_for_order(&self, order_id: Uuid) -> Result<invoice::Model, ServiceError> {
        self.find_for_order(order_id).await?.ok_or_else(|| {
            ServiceError::NotFound(format!("No invoice for order {}", order_id))
        })
    }

    async fn find_for_order(&self, order_id: Uuid) -> Result<Option<invoice::Model>, ServiceError> {
        Ok(InvoiceEntity::find()
            .filter(invoice::Column::OrderId.eq(order_id))
            .one(&*self.db)
            .await?)
    }

    /// Moves pending invoices whose due date has passed to `overdue`.
    #[instrument(skip(self))]
    pub async fn mark_overdue(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let result = InvoiceEntity::update_many()
            .col_expr(invoice::Column::Status, Expr::value(InvoiceStatus::Overdue))
            .col_expr(invoice::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(invoice::Column::Status.eq(InvoiceStatus::Pending))
            .filter(invoice::Column::DueDate.lt(now))
            .exec(&*self.db)
            .await?;
        if result.rows_affected > 0 {
            info!(count = result.rows_affected, "invoices marked overdue");
        }
        Ok(result.rows_affected)
    }

    async fn allocate_invoice_number(&self, at: DateTime<Utc>) -> Result<String, ServiceError> {
        for _ in 0..INVOICE_NUMBER_ATTEMPTS {
            let candidate = date_coded_number(&self.config.number_prefix, at);
            let taken = InvoiceEntity::find()
                .filter(invoice::Column::InvoiceNumber.eq(candidate.as_str()))
                .count(&*self.db)
                .await?;
            if taken == 0 {
                return Ok(candidate);
            }
        }
        Err(ServiceError::InternalError(
            "Could not allocate a unique invoice number".to_string(),
        ))
    }
}
