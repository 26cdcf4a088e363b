//! Outbound lifecycle notifications: rendering, the durable dispatch queue,
//! its background worker and the order-event fan-out.

pub mod engine;
pub mod notifier;
pub mod sender;
pub mod templates;
pub mod worker;

pub use engine::{
    DeliveryEvent, DeliveryMetrics, DispatchReport, NewNotification, NotificationEngine,
    QueueDepth, TaskStatusView,
};
pub use notifier::OrderNotifier;
pub use sender::{DeliveryError, EmailSender, HttpEmailSender, LogEmailSender, OutboundEmail, SendReceipt};
pub use worker::DispatchWorker;
