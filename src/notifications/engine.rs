//! Durable notification queue with claim-based dispatch.
//!
//! Every task lives in `notification_tasks`. A sweep selects due tasks, claims
//! each one with a single conditional `UPDATE` (bumping `attempt_count`), sends
//! it outside of any transaction and records the outcome guarded by the claim.
//! Claims carry an expiry so a worker that dies mid-send cannot strand a task.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use rand::Rng;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::sender::{DeliveryError, EmailSender, OutboundEmail, SendReceipt};
use super::templates::RenderedEmail;
use crate::config::NotificationConfig;
use crate::entities::notification_task::{
    ActiveModel as TaskActiveModel, Column, Entity as TaskEntity, Model as TaskModel,
    NotificationKind, NotificationStatus,
};
use crate::errors::ServiceError;

/// A notification ready to be queued. Bodies are already rendered.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewNotification {
    pub kind: NotificationKind,
    #[validate(email(message = "recipient must be a valid e-mail address"))]
    pub recipient_email: String,
    pub recipient_name: Option<String>,
    pub actor_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    #[validate(length(min = 1))]
    pub template_key: String,
    #[validate(length(min = 1, max = 998))]
    pub subject: String,
    #[validate(custom = "not_blank")]
    pub html_body: String,
    pub text_body: Option<String>,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("rendered html must not be empty".into());
        return Err(err);
    }
    Ok(())
}

impl NewNotification {
    pub fn from_rendered(
        kind: NotificationKind,
        recipient_email: impl Into<String>,
        recipient_name: Option<String>,
        actor_id: Option<Uuid>,
        order_id: Option<Uuid>,
        rendered: RenderedEmail,
    ) -> Self {
        Self {
            kind,
            recipient_email: recipient_email.into(),
            recipient_name,
            actor_id,
            order_id,
            template_key: rendered.template_key,
            subject: rendered.subject,
            html_body: rendered.html,
            text_body: Some(rendered.text),
        }
    }
}

/// Provider callback about a message that was already sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryEvent {
    Delivered,
    Opened,
    Clicked,
    Bounced,
}

/// Read model of a task for the status query path.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TaskStatusView {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub recipient_email: String,
    pub order_id: Option<Uuid>,
    pub status: NotificationStatus,
    pub attempt_count: i32,
    pub max_attempts: u32,
    /// True once automatic retries have stopped; needs an operator.
    pub exhausted: bool,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
}

impl TaskStatusView {
    fn from_model(task: TaskModel, max_attempts: u32) -> Self {
        Self {
            exhausted: task.is_exhausted(),
            id: task.id,
            kind: task.kind,
            recipient_email: task.recipient_email,
            order_id: task.order_id,
            status: task.status,
            attempt_count: task.attempt_count,
            max_attempts,
            last_error: task.last_error,
            created_at: task.created_at,
            last_attempt_at: task.last_attempt_at,
            next_attempt_at: task.next_attempt_at,
            sent_at: task.sent_at,
            claimed_by: task.claimed_by,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QueueDepth {
    /// Never attempted
    pub pending: u64,
    /// Failed at least once, retry scheduled
    pub retry_scheduled: u64,
    /// Held by a worker right now
    pub in_flight: u64,
    /// Terminal failures awaiting an operator
    pub exhausted: u64,
}

impl QueueDepth {
    /// Tasks still awaiting a successful send.
    pub fn total(&self) -> u64 {
        self.pending + self.retry_scheduled
    }
}

/// Delivery statistics over tasks sent within a time range.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeliveryMetrics {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub sent_count: u64,
    pub delivered_count: u64,
    pub opened_count: u64,
    pub clicked_count: u64,
    pub bounced_count: u64,
    pub failed_count: u64,
    pub exhausted_count: u64,
    pub delivery_rate: f64,
    pub open_rate: f64,
    pub click_rate: f64,
}

/// Ratio that treats an empty denominator as zero.
pub fn rate(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    RetryScheduled,
    Exhausted,
    /// Another worker claimed the task first, or our claim was taken over.
    Skipped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub recovered_claims: u64,
    pub examined: usize,
    pub sent: usize,
    pub retry_scheduled: usize,
    pub exhausted: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// What happens to a task after a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { next_attempt_at: DateTime<Utc> },
    Exhausted,
}

/// Logical clock of one sweep: the time the sweep was asked to run as, advanced
/// by wall time elapsed since it started.
#[derive(Clone, Copy, Debug)]
struct SweepClock {
    started_at: DateTime<Utc>,
    started: Instant,
}

impl SweepClock {
    fn start(at: DateTime<Utc>) -> Self {
        Self {
            started_at: at,
            started: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.started_at + Duration::from_std(self.started.elapsed()).unwrap_or_else(|_| Duration::zero())
    }
}

/// Upper bound on a single backoff (one week).
const MAX_BACKOFF_SECS: u64 = 7 * 24 * 3600;

/// Delay before the next attempt, without jitter: `base * 2^attempts`.
pub fn backoff_delay(attempt_count: i32, base_backoff_secs: u64) -> Duration {
    let exponent = attempt_count.clamp(0, 20) as u32;
    let secs = base_backoff_secs.saturating_mul(2u64.saturating_pow(exponent));
    Duration::seconds(secs.min(MAX_BACKOFF_SECS) as i64)
}

/// Decides whether a task that has now failed `attempt_count` times is
/// retried, and when.
pub fn retry_decision<R: Rng + ?Sized>(
    attempt_count: i32,
    config: &NotificationConfig,
    now: DateTime<Utc>,
    rng: &mut R,
) -> RetryDecision {
    if attempt_count >= config.max_attempts as i32 {
        return RetryDecision::Exhausted;
    }
    let jitter_ms = if config.max_jitter_secs == 0 {
        0
    } else {
        rng.gen_range(0..config.max_jitter_secs.saturating_mul(1000)) as i64
    };
    RetryDecision::Retry {
        next_attempt_at: now
            + backoff_delay(attempt_count, config.base_backoff_secs)
            + Duration::milliseconds(jitter_ms),
    }
}

#[derive(Clone)]
pub struct NotificationEngine {
    db: Arc<DatabaseConnection>,
    sender: Arc<dyn EmailSender>,
    config: NotificationConfig,
    worker_id: String,
    wakeup: Arc<Notify>,
}

impl NotificationEngine {
    pub fn new(
        db: Arc<DatabaseConnection>,
        sender: Arc<dyn EmailSender>,
        config: NotificationConfig,
    ) -> Self {
        Self {
            db,
            sender,
            config,
            worker_id: format!("worker-{}", Uuid::new_v4()),
            wakeup: Arc::new(Notify::new()),
        }
    }

    /// Overrides the identity written into `claimed_by`.
    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }

    /// Signalled whenever a task is enqueued.
    pub fn wakeup(&self) -> Arc<Notify> {
        self.wakeup.clone()
    }

    /// Persists a new task. Fails only when required fields are invalid.
    #[instrument(skip(self, task), fields(kind = %task.kind, order_id = ?task.order_id))]
    pub async fn enqueue(&self, task: NewNotification) -> Result<Uuid, ServiceError> {
        task.validate()?;

        let now = Utc::now();
        let id = Uuid::new_v4();
        let model = TaskActiveModel {
            id: Set(id),
            kind: Set(task.kind),
            recipient_email: Set(task.recipient_email),
            recipient_name: Set(task.recipient_name),
            actor_id: Set(task.actor_id),
            order_id: Set(task.order_id),
            template_key: Set(task.template_key),
            subject: Set(task.subject),
            html_body: Set(task.html_body),
            text_body: Set(task.text_body),
            status: Set(NotificationStatus::Pending),
            attempt_count: Set(0),
            last_error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            last_attempt_at: Set(None),
            next_attempt_at: Set(None),
            sent_at: Set(None),
            delivered_at: Set(None),
            opened_at: Set(None),
            clicked_at: Set(None),
            bounced_at: Set(None),
            claimed_by: Set(None),
            claim_expires_at: Set(None),
            exhausted_at: Set(None),
            provider_message_id: Set(None),
        };

        model.insert(&*self.db).await.map_err(|e| {
            error!("Failed to enqueue notification: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        counter!("orderflow_notifications.enqueued", 1);
        debug!(task_id = %id, "notification enqueued");
        self.wakeup.notify_one();
        Ok(id)
    }

    /// Filter matching tasks a sweep at `now` may claim.
    fn dispatchable(&self, now: DateTime<Utc>) -> Condition {
        Condition::all()
            .add(Column::Status.is_in([NotificationStatus::Pending, NotificationStatus::Failed]))
            .add(Column::ExhaustedAt.is_null())
            .add(Column::AttemptCount.lt(self.config.max_attempts as i32))
            .add(
                Condition::any()
                    .add(Column::NextAttemptAt.is_null())
                    .add(Column::NextAttemptAt.lte(now)),
            )
            .add(
                Condition::any()
                    .add(Column::ClaimExpiresAt.is_null())
                    .add(Column::ClaimExpiresAt.lte(now)),
            )
    }

    /// Atomically claims a due task and bumps its attempt counter. `now` is the
    /// claim time; the claim expires `claim_ttl_secs` after it.
    ///
    /// Returns `None` when the task is not due or another worker won the race.
    #[instrument(skip(self), fields(worker = %self.worker_id))]
    pub async fn claim(
        &self,
        task_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskModel>, ServiceError> {
        let expires_at = now + Duration::seconds(self.config.claim_ttl_secs as i64);

        let result = TaskEntity::update_many()
            .col_expr(Column::AttemptCount, Expr::col(Column::AttemptCount).add(1))
            .col_expr(Column::ClaimedBy, Expr::value(self.worker_id.clone()))
            .col_expr(Column::ClaimExpiresAt, Expr::value(expires_at))
            .col_expr(Column::LastAttemptAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(task_id))
            .filter(self.dispatchable(now))
            .exec(&*self.db)
            .await?;

        if result.rows_affected != 1 {
            debug!(task_id = %task_id, "task not claimable");
            return Ok(None);
        }

        Ok(TaskEntity::find_by_id(task_id).one(&*self.db).await?)
    }

    /// Runs one sweep using the current time.
    pub async fn dispatch_due(&self) -> Result<DispatchReport, ServiceError> {
        self.dispatch_due_at(Utc::now()).await
    }

    /// Runs one sweep as of `now`: recovers expired claims, then claims and
    /// sends every due task up to the batch size.
    #[instrument(skip(self), fields(worker = %self.worker_id))]
    pub async fn dispatch_due_at(&self, now: DateTime<Utc>) -> Result<DispatchReport, ServiceError> {
        let clock = SweepClock::start(now);
        let recovered_claims = self.recover_expired_claims(now).await?;

        let due: Vec<Uuid> = TaskEntity::find()
            .select_only()
            .column(Column::Id)
            .filter(self.dispatchable(now))
            .order_by_asc(Column::NextAttemptAt)
            .order_by_asc(Column::CreatedAt)
            .limit(self.config.batch_size)
            .into_tuple::<Uuid>()
            .all(&*self.db)
            .await?;

        let mut report = DispatchReport {
            recovered_claims,
            examined: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            return Ok(report);
        }

        let outcomes: Vec<Result<DispatchOutcome, ServiceError>> = stream::iter(due)
            .map(|task_id| self.process(task_id, clock))
            .buffer_unordered(self.config.send_concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Ok(DispatchOutcome::Sent) => report.sent += 1,
                Ok(DispatchOutcome::RetryScheduled) => report.retry_scheduled += 1,
                Ok(DispatchOutcome::Exhausted) => report.exhausted += 1,
                Ok(DispatchOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    error!("notification dispatch error: {}", e);
                    report.errors += 1;
                }
            }
        }

        info!(
            examined = report.examined,
            sent = report.sent,
            retry_scheduled = report.retry_scheduled,
            exhausted = report.exhausted,
            skipped = report.skipped,
            "dispatch sweep finished"
        );
        Ok(report)
    }

    async fn process(&self, task_id: Uuid, clock: SweepClock) -> Result<DispatchOutcome, ServiceError> {
        let Some(task) = self.claim(task_id, clock.now()).await? else {
            return Ok(DispatchOutcome::Skipped);
        };

        let email = self.outbound(&task);
        let send_timeout = self.config.send_timeout();
        let started = Instant::now();
        let result = match tokio::time::timeout(send_timeout, self.sender.send(&email)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(send_timeout)),
        };
        let elapsed = started.elapsed();
        histogram!("orderflow_notifications.send_duration", elapsed);

        let finished_at = clock.now();
        match result {
            Ok(receipt) => self.mark_sent(&task, receipt, finished_at).await,
            Err(err) => {
                warn!(
                    task_id = %task.id,
                    attempt = task.attempt_count,
                    error = %err,
                    "notification send failed"
                );
                self.record_failure(&task, &err.to_string(), finished_at).await
            }
        }
    }

    fn outbound(&self, task: &TaskModel) -> OutboundEmail {
        OutboundEmail {
            to: task.recipient_email.clone(),
            to_name: task.recipient_name.clone(),
            from: self.config.from_address.clone(),
            from_name: self.config.from_name.clone(),
            subject: task.subject.clone(),
            html: task.html_body.clone(),
            text: task.text_body.clone(),
            idempotency_key: task.id,
        }
    }

    async fn mark_sent(
        &self,
        task: &TaskModel,
        receipt: SendReceipt,
        at: DateTime<Utc>,
    ) -> Result<DispatchOutcome, ServiceError> {
        let provider_message_id = receipt.provider_message_id;
        let result = TaskEntity::update_many()
            .col_expr(Column::Status, Expr::value(NotificationStatus::Sent))
            .col_expr(Column::SentAt, Expr::value(at))
            .col_expr(Column::UpdatedAt, Expr::value(at))
            .col_expr(Column::LastError, Expr::value(Option::<String>::None))
            .col_expr(Column::NextAttemptAt, Expr::value(Option::<DateTime<Utc>>::None))
            .col_expr(Column::ClaimedBy, Expr::value(Option::<String>::None))
            .col_expr(Column::ClaimExpiresAt, Expr::value(Option::<DateTime<Utc>>::None))
            .col_expr(
                Column::ProviderMessageId,
                Expr::value(provider_message_id.clone()),
            )
            .filter(Column::Id.eq(task.id))
            .filter(Column::ClaimedBy.eq(self.worker_id.as_str()))
            .exec(&*self.db)
            .await?;

        if result.rows_affected != 1 {
            // The provider accepted the message; record it unless another
            // worker holds the task now.
            let recorded = TaskEntity::update_many()
                .col_expr(Column::Status, Expr::value(NotificationStatus::Sent))
                .col_expr(Column::SentAt, Expr::value(at))
                .col_expr(Column::UpdatedAt, Expr::value(at))
                .col_expr(Column::LastError, Expr::value(Option::<String>::None))
                .col_expr(Column::NextAttemptAt, Expr::value(Option::<DateTime<Utc>>::None))
                .col_expr(Column::ExhaustedAt, Expr::value(Option::<DateTime<Utc>>::None))
                .col_expr(Column::ProviderMessageId, Expr::value(provider_message_id))
                .filter(Column::Id.eq(task.id))
                .filter(Column::ClaimedBy.is_null())
                .filter(Column::SentAt.is_null())
                .exec(&*self.db)
                .await?;
            if recorded.rows_affected != 1 {
                warn!(task_id = %task.id, "claim lost before recording successful send");
                return Ok(DispatchOutcome::Skipped);
            }
            warn!(task_id = %task.id, "claim expired during send; send recorded anyway");
        }

        counter!("orderflow_notifications.sent", 1);
        info!(task_id = %task.id, attempt = task.attempt_count, "notification sent");
        Ok(DispatchOutcome::Sent)
    }

    /// Records a failed attempt on a task this worker has claimed.
    async fn record_failure(
        &self,
        task: &TaskModel,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<DispatchOutcome, ServiceError> {
        let decision = {
            let mut rng = rand::thread_rng();
            retry_decision(task.attempt_count, &self.config, at, &mut rng)
        };

        let update = TaskEntity::update_many()
            .col_expr(Column::Status, Expr::value(NotificationStatus::Failed))
            .col_expr(Column::LastError, Expr::value(reason.to_string()))
            .col_expr(Column::UpdatedAt, Expr::value(at))
            .col_expr(Column::ClaimedBy, Expr::value(Option::<String>::None))
            .col_expr(Column::ClaimExpiresAt, Expr::value(Option::<DateTime<Utc>>::None))
            .filter(Column::Id.eq(task.id))
            .filter(Column::ClaimedBy.eq(self.worker_id.as_str()));

        let (update, outcome) = match decision {
            RetryDecision::Retry { next_attempt_at } => (
                update.col_expr(Column::NextAttemptAt, Expr::value(next_attempt_at)),
                DispatchOutcome::RetryScheduled,
            ),
            RetryDecision::Exhausted => (
                update
                    .col_expr(Column::NextAttemptAt, Expr::value(Option::<DateTime<Utc>>::None))
                    .col_expr(Column::ExhaustedAt, Expr::value(at)),
                DispatchOutcome::Exhausted,
            ),
        };

        let result = update.exec(&*self.db).await?;
        if result.rows_affected != 1 {
            warn!(task_id = %task.id, "claim lost before recording failed send");
            return Ok(DispatchOutcome::Skipped);
        }

        counter!("orderflow_notifications.failed", 1);
        if outcome == DispatchOutcome::Exhausted {
            counter!("orderflow_notifications.exhausted", 1);
            error!(
                task_id = %task.id,
                attempts = task.attempt_count,
                error = reason,
                "notification exhausted its retries"
            );
        }
        Ok(outcome)
    }

    /// Turns claims that outlived their expiry into failed attempts.
    ///
    /// Each recovered task is rescheduled with backoff, or becomes terminal
    /// when its attempts are used up. Returns the number of tasks recovered.
    #[instrument(skip(self))]
    pub async fn recover_expired_claims(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let stale = TaskEntity::find()
            .filter(Column::ClaimedBy.is_not_null())
            .filter(Column::ClaimExpiresAt.lte(now))
            .filter(Column::ExhaustedAt.is_null())
            .filter(Column::Status.is_in([NotificationStatus::Pending, NotificationStatus::Failed]))
            .all(&*self.db)
            .await?;

        let mut recovered = 0;
        for task in stale {
            let Some(previous_owner) = task.claimed_by.clone() else {
                continue;
            };
            let decision = {
                let mut rng = rand::thread_rng();
                retry_decision(task.attempt_count, &self.config, now, &mut rng)
            };

            let update = TaskEntity::update_many()
                .col_expr(Column::Status, Expr::value(NotificationStatus::Failed))
                .col_expr(
                    Column::LastError,
                    Expr::value(format!("claim held by {} expired before completion", previous_owner)),
                )
                .col_expr(Column::UpdatedAt, Expr::value(now))
                .col_expr(Column::ClaimedBy, Expr::value(Option::<String>::None))
                .col_expr(Column::ClaimExpiresAt, Expr::value(Option::<DateTime<Utc>>::None))
                .filter(Column::Id.eq(task.id))
                .filter(Column::ClaimedBy.eq(previous_owner.as_str()))
                .filter(Column::ClaimExpiresAt.lte(now));

            let update = match decision {
                RetryDecision::Retry { next_attempt_at } => {
                    update.col_expr(Column::NextAttemptAt, Expr::value(next_attempt_at))
                }
                RetryDecision::Exhausted => update
                    .col_expr(Column::NextAttemptAt, Expr::value(Option::<DateTime<Utc>>::None))
                    .col_expr(Column::ExhaustedAt, Expr::value(now)),
            };

            if update.exec(&*self.db).await?.rows_affected == 1 {
                recovered += 1;
                warn!(task_id = %task.id, owner = %previous_owner, "recovered expired claim");
                if matches!(decision, RetryDecision::Exhausted) {
                    counter!("orderflow_notifications.exhausted", 1);
                }
            }
        }

        if recovered > 0 {
            counter!("orderflow_notifications.claims_recovered", recovered);
        }
        Ok(recovered)
    }

    async fn find_task(&self, task_id: Uuid) -> Result<TaskModel, ServiceError> {
        TaskEntity::find_by_id(task_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Notification {} not found", task_id)))
    }

    #[instrument(skip(self))]
    pub async fn get_status(&self, task_id: Uuid) -> Result<TaskStatusView, ServiceError> {
        let task = self.find_task(task_id).await?;
        Ok(TaskStatusView::from_model(task, self.config.max_attempts))
    }

    /// Every task queued for one order, oldest first.
    #[instrument(skip(self))]
    pub async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<TaskStatusView>, ServiceError> {
        let tasks = TaskEntity::find()
            .filter(Column::OrderId.eq(order_id))
            .order_by_asc(Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(tasks
            .into_iter()
            .map(|task| TaskStatusView::from_model(task, self.config.max_attempts))
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn queue_depth(&self) -> Result<QueueDepth, ServiceError> {
        let db = &*self.db;
        let now = Utc::now();

        let pending = TaskEntity::find()
            .filter(Column::Status.eq(NotificationStatus::Pending))
            .filter(Column::ExhaustedAt.is_null())
            .count(db)
            .await?;
        let retry_scheduled = TaskEntity::find()
            .filter(Column::Status.eq(NotificationStatus::Failed))
            .filter(Column::ExhaustedAt.is_null())
            .count(db)
            .await?;
        let in_flight = TaskEntity::find()
            .filter(Column::ClaimedBy.is_not_null())
            .filter(Column::ClaimExpiresAt.gt(now))
            .count(db)
            .await?;
        let exhausted = TaskEntity::find()
            .filter(Column::ExhaustedAt.is_not_null())
            .count(db)
            .await?;

        Ok(QueueDepth {
            pending,
            retry_scheduled,
            in_flight,
            exhausted,
        })
    }

    /// Delivery statistics for messages sent in `[from, to)`; open bounds are unbounded.
    #[instrument(skip(self))]
    pub async fn metrics(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<DeliveryMetrics, ServiceError> {
        let db = &*self.db;

        let range = |column: Column| {
            let mut cond = Condition::all().add(column.is_not_null());
            if let Some(from) = from {
                cond = cond.add(column.gte(from));
            }
            if let Some(to) = to {
                cond = cond.add(column.lt(to));
            }
            cond
        };
        let sent_in_range = range(Column::SentAt);

        let sent_count = TaskEntity::find()
            .filter(sent_in_range.clone())
            .count(db)
            .await?;
        let delivered_count = TaskEntity::find()
            .filter(sent_in_range.clone())
            .filter(Column::DeliveredAt.is_not_null())
            .count(db)
            .await?;
        let opened_count = TaskEntity::find()
            .filter(sent_in_range.clone())
            .filter(Column::OpenedAt.is_not_null())
            .count(db)
            .await?;
        let clicked_count = TaskEntity::find()
            .filter(sent_in_range.clone())
            .filter(Column::ClickedAt.is_not_null())
            .count(db)
            .await?;
        let bounced_count = TaskEntity::find()
            .filter(sent_in_range)
            .filter(Column::BouncedAt.is_not_null())
            .count(db)
            .await?;
        let failed_count = TaskEntity::find()
            .filter(Column::Status.eq(NotificationStatus::Failed))
            .filter(range(Column::LastAttemptAt))
            .count(db)
            .await?;
        let exhausted_count = TaskEntity::find()
            .filter(range(Column::ExhaustedAt))
            .count(db)
            .await?;

        Ok(DeliveryMetrics {
            from,
            to,
            sent_count,
            delivered_count,
            opened_count,
            clicked_count,
            bounced_count,
            failed_count,
            exhausted_count,
            delivery_rate: rate(delivered_count, sent_count),
            open_rate: rate(opened_count, sent_count),
            click_rate: rate(clicked_count, sent_count),
        })
    }

    /// Stops automatic retries of an undelivered task by making it terminal.
    #[instrument(skip(self))]
    pub async fn suppress(&self, task_id: Uuid, reason: &str) -> Result<TaskStatusView, ServiceError> {
        let task = self.find_task(task_id).await?;
        if task.is_exhausted() {
            return Err(ServiceError::Conflict(format!(
                "Notification {} is already terminal",
                task_id
            )));
        }
        if !matches!(
            task.status,
            NotificationStatus::Pending | NotificationStatus::Failed
        ) {
            return Err(ServiceError::Conflict(format!(
                "Notification {} was already sent",
                task_id
            )));
        }
        if task.claimed_by.is_some() {
            warn!(task_id = %task_id, "suppressing a task with an active claim");
        }

        let now = Utc::now();
        let result = TaskEntity::update_many()
            .col_expr(Column::Status, Expr::value(NotificationStatus::Failed))
            .col_expr(Column::ExhaustedAt, Expr::value(now))
            .col_expr(Column::NextAttemptAt, Expr::value(Option::<DateTime<Utc>>::None))
            .col_expr(Column::ClaimedBy, Expr::value(Option::<String>::None))
            .col_expr(Column::ClaimExpiresAt, Expr::value(Option::<DateTime<Utc>>::None))
            .col_expr(Column::LastError, Expr::value(format!("suppressed: {}", reason)))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(task_id))
            .filter(Column::ExhaustedAt.is_null())
            .filter(Column::Status.is_in([NotificationStatus::Pending, NotificationStatus::Failed]))
            .exec(&*self.db)
            .await?;

        if result.rows_affected != 1 {
            return Err(ServiceError::Conflict(format!(
                "Notification {} changed while suppressing",
                task_id
            )));
        }

        info!(task_id = %task_id, reason, "notification suppressed");
        self.get_status(task_id).await
    }

    /// Applies a provider callback. Status never moves backwards
    /// (e.g. a late `delivered` after `opened`).
    #[instrument(skip(self))]
    pub async fn record_delivery_event(
        &self,
        task_id: Uuid,
        event: DeliveryEvent,
        at: DateTime<Utc>,
    ) -> Result<TaskStatusView, ServiceError> {
        let task = self.find_task(task_id).await?;
        if task.sent_at.is_none() {
            return Err(ServiceError::Conflict(format!(
                "Notification {} has not been sent",
                task_id
            )));
        }

        let (target, stamps): (NotificationStatus, &[Column]) = match event {
            DeliveryEvent::Delivered => (NotificationStatus::Delivered, &[Column::DeliveredAt]),
            DeliveryEvent::Opened => (
                NotificationStatus::Opened,
                &[Column::DeliveredAt, Column::OpenedAt],
            ),
            DeliveryEvent::Clicked => (
                NotificationStatus::Clicked,
                &[Column::DeliveredAt, Column::OpenedAt, Column::ClickedAt],
            ),
            DeliveryEvent::Bounced => (NotificationStatus::Bounced, &[Column::BouncedAt]),
        };
        let behind: Vec<NotificationStatus> = SENT_STATUSES
            .into_iter()
            .filter(|status| engagement_rank(*status) < engagement_rank(target))
            .collect();

        // Each write only fills an empty timestamp or moves status forward, so
        // concurrent callbacks cannot undo one another.
        let txn = self.db.begin().await?;
        for column in stamps {
            TaskEntity::update_many()
                .col_expr(*column, Expr::value(at))
                .filter(Column::Id.eq(task_id))
                .filter(column.is_null())
                .exec(&txn)
                .await?;
        }
        TaskEntity::update_many()
            .col_expr(Column::Status, Expr::value(target))
            .filter(Column::Id.eq(task_id))
            .filter(Column::Status.is_in(behind))
            .exec(&txn)
            .await?;
        TaskEntity::update_many()
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(task_id))
            .exec(&txn)
            .await?;
        let updated = TaskEntity::find_by_id(task_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Notification {} not found", task_id)))?;
        txn.commit().await?;

        debug!(task_id = %task_id, ?event, status = %updated.status, "delivery event recorded");
        Ok(TaskStatusView::from_model(updated, self.config.max_attempts))
    }
}

const SENT_STATUSES: [NotificationStatus; 5] = [
    NotificationStatus::Sent,
    NotificationStatus::Delivered,
    NotificationStatus::Opened,
    NotificationStatus::Clicked,
    NotificationStatus::Bounced,
];

fn engagement_rank(status: NotificationStatus) -> u8 {
    match status {
        NotificationStatus::Pending | NotificationStatus::Failed => 0,
        NotificationStatus::Sent => 1,
        NotificationStatus::Delivered => 2,
        NotificationStatus::Opened => 3,
        NotificationStatus::Clicked => 4,
        NotificationStatus::Bounced => 5,
    }
}
