use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Delivery state of a queued notification.
///
/// `pending` and `failed` tasks are picked up by dispatch sweeps unless the
/// task is exhausted (`exhausted_at` set). `delivered`, `opened`, `clicked`
/// and `bounced` are reported by the provider after a successful send.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "opened")]
    Opened,
    #[sea_orm(string_value = "clicked")]
    Clicked,
    #[sea_orm(string_value = "bounced")]
    Bounced,
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// Lifecycle event that triggered a notification.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(48))")]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum NotificationKind {
    #[sea_orm(string_value = "order-confirmation")]
    OrderConfirmation,
    #[sea_orm(string_value = "order-admin-alert")]
    OrderAdminAlert,
    #[sea_orm(string_value = "order-shipped")]
    OrderShipped,
    #[sea_orm(string_value = "order-delivered")]
    OrderDelivered,
    #[sea_orm(string_value = "order-cancelled")]
    OrderCancelled,
    #[sea_orm(string_value = "payment-success")]
    PaymentSuccess,
    #[sea_orm(string_value = "payment-failed")]
    PaymentFailed,
    #[sea_orm(string_value = "payment-failed-admin-alert")]
    PaymentFailedAdminAlert,
    #[sea_orm(string_value = "payment-refunded")]
    PaymentRefunded,
}

/// The `notification_tasks` table: one row per outbound message.
///
/// Rows are never deleted. `attempt_count` only grows, and only through the
/// atomic claim in the dispatch engine.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "notification_tasks")]
#[schema(as = NotificationTask)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub kind: NotificationKind,
    pub recipient_email: String,
    pub recipient_name: Option<String>,
    pub actor_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub template_key: String,
    pub subject: String,
    #[sea_orm(column_type = "Text")]
    pub html_body: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub text_body: Option<String>,
    pub status: NotificationStatus,
    pub attempt_count: i32,
    #[sea_orm(column_type = "Text", nullable)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub bounced_at: Option<DateTime<Utc>>,
    /// Worker currently holding the task, if any.
    pub claimed_by: Option<String>,
    pub claim_expires_at: Option<DateTime<Utc>>,
    /// Set once automatic retries have stopped for good.
    pub exhausted_at: Option<DateTime<Utc>>,
    pub provider_message_id: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Terminal tasks are never picked up by a sweep again.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted_at.is_some()
    }
}
