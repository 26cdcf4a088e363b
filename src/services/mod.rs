// Pricing and collaborators
pub mod catalog;
pub mod pricing;

// Cart and checkout
pub mod cart;
pub mod checkout;

// Order lifecycle
pub mod order_status;
pub mod orders;

// Billing
pub mod invoicing;

// Analytics and Reporting
pub mod analytics;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Human-readable document number: `{prefix}-{YYYYMMDD}-{6 digits}`.
pub(crate) fn date_coded_number(prefix: &str, at: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{}-{}-{:06}", prefix, at.format("%Y%m%d"), suffix)
}
