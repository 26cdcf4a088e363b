mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use assert_matches::assert_matches;
use chrono::{DateTime, Duration, Utc};
use common::{DelayedSender, TestApp, WORKER_ID};
use orderflow::{
    entities::notification_task::{NotificationKind, NotificationStatus},
    errors::ServiceError,
    notifications::{DeliveryEvent, DispatchWorker, NewNotification, NotificationEngine, TaskStatusView},
};
use tokio::sync::watch;
use uuid::Uuid;

async fn enqueue(app: &TestApp, to: &str) -> Uuid {
    app.engine()
        .enqueue(NewNotification {
            kind: NotificationKind::OrderConfirmation,
            recipient_email: to.to_string(),
            recipient_name: Some("Jo".into()),
            actor_id: None,
            order_id: None,
            template_key: "order-confirmation".into(),
            subject: "Your order".into(),
            html_body: "<p>Thanks</p>".into(),
            text_body: Some("Thanks".into()),
        })
        .await
        .expect("enqueue failed")
}

async fn status(app: &TestApp, id: Uuid) -> TaskStatusView {
    app.engine().get_status(id).await.unwrap()
}

/// Asserts `at` lies in `[from + secs, from + secs + jitter]`, allowing a
/// second of send latency.
fn assert_backoff(at: Option<DateTime<Utc>>, from: DateTime<Utc>, secs: i64) {
    let at = at.expect("retry scheduled");
    let earliest = from + Duration::seconds(secs);
    let latest = earliest + Duration::seconds(30 + 1);
    assert!(
        at >= earliest && at <= latest,
        "next attempt {} outside [{}, {}]",
        at,
        earliest,
        latest
    );
}

#[tokio::test]
async fn failures_back_off_then_exhaust() {
    let app = TestApp::new().await;
    let id = enqueue(&app, "jo@example.com").await;
    app.sender.fail_next(3);

    let t0 = Utc::now();
    let report = app.engine().dispatch_due_at(t0).await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.retry_scheduled, 1);

    let first = status(&app, id).await;
    assert_eq!(first.attempt_count, 1);
    assert_eq!(first.status, NotificationStatus::Failed);
    assert!(!first.exhausted);
    assert!(first.last_error.as_deref().unwrap_or_default().contains("smtp unavailable"));
    assert_backoff(first.next_attempt_at, t0, 120);

    // Not due yet.
    let early = app
        .engine()
        .dispatch_due_at(t0 + Duration::seconds(60))
        .await
        .unwrap();
    assert_eq!(early.examined, 0);

    let t1 = first.next_attempt_at.unwrap() + Duration::seconds(1);
    let report = app.engine().dispatch_due_at(t1).await.unwrap();
    assert_eq!(report.retry_scheduled, 1);
    let second = status(&app, id).await;
    assert_eq!(second.attempt_count, 2);
    assert_backoff(second.next_attempt_at, t1, 240);

    let t2 = second.next_attempt_at.unwrap() + Duration::seconds(1);
    let report = app.engine().dispatch_due_at(t2).await.unwrap();
    assert_eq!(report.exhausted, 1);
    let last = status(&app, id).await;
    assert_eq!(last.attempt_count, 3);
    assert_eq!(last.status, NotificationStatus::Failed);
    assert!(last.exhausted);
    assert!(last.next_attempt_at.is_none());

    let later = app
        .engine()
        .dispatch_due_at(t2 + Duration::days(30))
        .await
        .unwrap();
    assert_eq!(later.examined, 0, "terminal tasks are never picked up again");
    assert!(app.sender.sent().is_empty());

    let depth = app.engine().queue_depth().await.unwrap();
    assert_eq!(depth.exhausted, 1);
    assert_eq!(depth.total(), 0);
}

#[tokio::test]
async fn third_attempt_can_still_succeed() {
    let app = TestApp::new().await;
    let id = enqueue(&app, "jo@example.com").await;
    app.sender.fail_next(2);

    let mut now = Utc::now();
    for _ in 0..3 {
        app.engine().dispatch_due_at(now).await.unwrap();
        let view = status(&app, id).await;
        match view.next_attempt_at {
            Some(next) => now = next + Duration::seconds(1),
            None => break,
        }
    }

    let view = status(&app, id).await;
    assert_eq!(view.status, NotificationStatus::Sent);
    assert_eq!(view.attempt_count, 3);
    assert!(view.sent_at.is_some());
    assert!(view.last_error.is_none());
    assert!(view.claimed_by.is_none());

    let sent = app.sender.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].idempotency_key, id);
    assert_eq!(sent[0].to, "jo@example.com");
}

#[tokio::test]
async fn a_claimed_task_belongs_to_one_worker() {
    let app = TestApp::new().await;
    let id = enqueue(&app, "jo@example.com").await;
    let other = NotificationEngine::new(
        app.db.clone(),
        app.sender.clone(),
        app.state.config.notifications.clone(),
    )
    .with_worker_id("other-worker");

    let now = Utc::now();
    let claimed = app.engine().claim(id, now).await.unwrap().expect("first claim wins");
    assert_eq!(claimed.attempt_count, 1);
    assert_eq!(claimed.claimed_by.as_deref(), Some(WORKER_ID));

    assert!(other.claim(id, now).await.unwrap().is_none());
    let report = other.dispatch_due_at(now + Duration::seconds(5)).await.unwrap();
    assert_eq!(report.examined, 0);
    assert!(app.sender.sent().is_empty());
}

#[tokio::test]
async fn expired_claims_are_recovered_as_failed_attempts() {
    let app = TestApp::new().await;
    let id = enqueue(&app, "jo@example.com").await;
    let ttl = app.state.config.notifications.claim_ttl_secs as i64;

    let t0 = Utc::now();
    app.engine().claim(id, t0).await.unwrap().expect("claimed");

    let t1 = t0 + Duration::seconds(ttl + 1);
    let report = app.engine().dispatch_due_at(t1).await.unwrap();
    assert_eq!(report.recovered_claims, 1);
    assert_eq!(report.examined, 0, "recovered task waits out its backoff");

    let view = status(&app, id).await;
    assert_eq!(view.status, NotificationStatus::Failed);
    assert_eq!(view.attempt_count, 1);
    assert!(view.claimed_by.is_none());
    assert!(view.last_error.as_deref().unwrap_or_default().contains("expired"));
    assert_backoff(view.next_attempt_at, t1, 120);

    let t2 = view.next_attempt_at.unwrap() + Duration::seconds(1);
    let report = app.engine().dispatch_due_at(t2).await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(status(&app, id).await.attempt_count, 2);
}

#[tokio::test]
async fn suppressed_tasks_stop_retrying() {
    let app = TestApp::new().await;
    let id = enqueue(&app, "jo@example.com").await;

    let view = app.engine().suppress(id, "customer unsubscribed").await.unwrap();
    assert!(view.exhausted);
    assert_eq!(view.status, NotificationStatus::Failed);
    assert_eq!(view.last_error.as_deref(), Some("suppressed: customer unsubscribed"));

    let report = app.engine().dispatch_due_at(Utc::now()).await.unwrap();
    assert_eq!(report.examined, 0);

    let err = app.engine().suppress(id, "again").await.unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));

    let err = app.engine().suppress(Uuid::new_v4(), "missing").await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn delivery_events_only_move_forward() {
    let app = TestApp::new().await;
    let id = enqueue(&app, "jo@example.com").await;

    let err = app
        .engine()
        .record_delivery_event(id, DeliveryEvent::Delivered, Utc::now())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));

    app.engine().dispatch_due_at(Utc::now()).await.unwrap();
    assert_eq!(status(&app, id).await.status, NotificationStatus::Sent);

    let opened = app
        .engine()
        .record_delivery_event(id, DeliveryEvent::Opened, Utc::now())
        .await
        .unwrap();
    assert_eq!(opened.status, NotificationStatus::Opened);

    let late = app
        .engine()
        .record_delivery_event(id, DeliveryEvent::Delivered, Utc::now())
        .await
        .unwrap();
    assert_eq!(late.status, NotificationStatus::Opened);

    let err = app.engine().suppress(id, "too late").await.unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn metrics_report_rates_over_sent_messages() {
    let app = TestApp::new().await;

    let empty = app.engine().metrics(None, None).await.unwrap();
    assert_eq!(empty.sent_count, 0);
    assert_eq!(empty.delivery_rate, 0.0);
    assert_eq!(empty.open_rate, 0.0);
    assert_eq!(empty.click_rate, 0.0);

    let first = enqueue(&app, "a@example.com").await;
    let second = enqueue(&app, "b@example.com").await;
    let report = app.engine().dispatch_due_at(Utc::now()).await.unwrap();
    assert_eq!(report.sent, 2);

    app.engine()
        .record_delivery_event(first, DeliveryEvent::Clicked, Utc::now())
        .await
        .unwrap();
    app.engine()
        .record_delivery_event(second, DeliveryEvent::Delivered, Utc::now())
        .await
        .unwrap();

    let metrics = app.engine().metrics(None, None).await.unwrap();
    assert_eq!(metrics.sent_count, 2);
    assert_eq!(metrics.delivered_count, 2);
    assert_eq!(metrics.opened_count, 1);
    assert_eq!(metrics.clicked_count, 1);
    assert_eq!(metrics.delivery_rate, 1.0);
    assert_eq!(metrics.open_rate, 0.5);
    assert_eq!(metrics.click_rate, 0.5);

    let future = Utc::now() + Duration::days(1);
    let none = app.engine().metrics(Some(future), None).await.unwrap();
    assert_eq!(none.sent_count, 0);
    assert_eq!(none.delivery_rate, 0.0);
}

#[tokio::test]
async fn queue_depth_tracks_backlog() {
    let app = TestApp::new().await;
    enqueue(&app, "a@example.com").await;
    enqueue(&app, "b@example.com").await;

    let depth = app.engine().queue_depth().await.unwrap();
    assert_eq!(depth.pending, 2);
    assert_eq!(depth.total(), 2);

    app.sender.fail_next(1);
    let report = app.engine().dispatch_due_at(Utc::now()).await.unwrap();
    assert_eq!(report.sent + report.retry_scheduled, 2);

    let depth = app.engine().queue_depth().await.unwrap();
    assert_eq!(depth.pending, 0);
    assert_eq!(depth.retry_scheduled, 1);
    assert_eq!(depth.in_flight, 0);
}

#[tokio::test]
async fn background_worker_sends_new_tasks() {
    let app = TestApp::new().await;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = DispatchWorker::new(app.engine().clone())
        .with_interval(StdDuration::from_millis(50))
        .spawn(shutdown_rx);

    let id = enqueue(&app, "jo@example.com").await;

    let sent = tokio::time::timeout(StdDuration::from_secs(5), async {
        loop {
            if status(&app, id).await.status == NotificationStatus::Sent {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(20)).await;
        }
    })
    .await;
    assert!(sent.is_ok(), "worker did not send the task in time");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
    assert_eq!(app.sender.sent().len(), 1);
}

#[tokio::test]
async fn slow_sends_keep_their_claims_across_overlapping_sweeps() {
    let app = TestApp::new().await;
    let sender = Arc::new(DelayedSender::new(StdDuration::from_millis(900)));
    let tune = |cfg: &mut orderflow::config::NotificationConfig| {
        cfg.claim_ttl_secs = 2;
        cfg.send_timeout_secs = 1;
        cfg.send_concurrency = 1;
    };
    let first = app.engine_with("worker-a", sender.clone(), tune);
    let second = app.engine_with("worker-b", sender.clone(), tune);

    let mut ids = Vec::new();
    for n in 0..4 {
        ids.push(enqueue(&app, &format!("customer{}@example.com", n)).await);
    }

    // The second sweep starts after the first sweep's start plus the claim TTL,
    // while the first is still working through its batch.
    let (first_report, second_report) = tokio::join!(first.dispatch_due(), async {
        tokio::time::sleep(StdDuration::from_millis(2300)).await;
        second.dispatch_due().await
    });
    let first_report = first_report.unwrap();
    let second_report = second_report.unwrap();
    assert_eq!(second_report.recovered_claims, 0);
    assert_eq!(first_report.sent + second_report.sent, 4);

    let later = first
        .dispatch_due_at(Utc::now() + Duration::minutes(30))
        .await
        .unwrap();
    assert_eq!(later.examined, 0);

    let mut sent = sender.sent_ids();
    let total = sent.len();
    sent.sort();
    sent.dedup();
    assert_eq!(sent.len(), total, "a task was sent more than once");
    assert_eq!(total, 4);
    for id in ids {
        let view = status(&app, id).await;
        assert_eq!(view.status, NotificationStatus::Sent);
        assert_eq!(view.attempt_count, 1);
    }
}

#[tokio::test]
async fn hung_sends_time_out_and_are_rescheduled() {
    let app = TestApp::new().await;
    let sender = Arc::new(DelayedSender::new(StdDuration::from_secs(60)));
    let engine = app.engine_with(WORKER_ID, sender.clone(), |cfg| cfg.send_timeout_secs = 1);
    let id = enqueue(&app, "jo@example.com").await;

    let t0 = Utc::now();
    let report = engine.dispatch_due_at(t0).await.unwrap();
    assert_eq!(report.retry_scheduled, 1);
    assert!(sender.sent_ids().is_empty());

    let view = status(&app, id).await;
    assert_eq!(view.status, NotificationStatus::Failed);
    assert_eq!(view.attempt_count, 1);
    assert!(view.claimed_by.is_none());
    assert!(view.last_error.as_deref().unwrap_or_default().contains("timed out"));
    let next = view.next_attempt_at.expect("retry scheduled");
    assert!(next >= t0 + Duration::seconds(121), "backoff counts from the timeout");
    assert!(next <= t0 + Duration::seconds(120 + 30 + 5));
}

#[tokio::test]
async fn crossing_delivery_callbacks_never_move_status_backwards() {
    let app = TestApp::new().await;
    let id = enqueue(&app, "jo@example.com").await;
    app.engine().dispatch_due_at(Utc::now()).await.unwrap();

    let at = Utc::now();
    let (clicked, bounced) = tokio::join!(
        app.engine().record_delivery_event(id, DeliveryEvent::Clicked, at),
        app.engine().record_delivery_event(id, DeliveryEvent::Bounced, at),
    );
    clicked.unwrap();
    bounced.unwrap();

    let view = status(&app, id).await;
    assert_eq!(view.status, NotificationStatus::Bounced);
    let metrics = app.engine().metrics(None, None).await.unwrap();
    assert_eq!(metrics.clicked_count, 1);
    assert_eq!(metrics.opened_count, 1);
    assert_eq!(metrics.bounced_count, 1);
}

#[tokio::test]
async fn worker_drains_a_backlog_larger_than_one_batch() {
    let app = TestApp::new().await;
    let engine = app.engine_with(WORKER_ID, app.sender.clone(), |cfg| cfg.batch_size = 2);
    for n in 0..5 {
        enqueue(&app, &format!("customer{}@example.com", n)).await;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    // Only the immediate first tick fires within the test.
    let handle = DispatchWorker::new(engine.clone())
        .with_interval(StdDuration::from_secs(3600))
        .spawn(shutdown_rx);

    let drained = tokio::time::timeout(StdDuration::from_secs(5), async {
        loop {
            if app.sender.sent().len() == 5 {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(20)).await;
        }
    })
    .await;
    assert!(drained.is_ok(), "backlog was not drained within one tick");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
    assert_eq!(engine.queue_depth().await.unwrap().total(), 0);
}
