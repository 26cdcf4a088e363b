use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::NotificationConfig;

/// A fully rendered message handed to the provider.
#[derive(Clone, Debug, Serialize)]
pub struct OutboundEmail {
    pub to: String,
    pub to_name: Option<String>,
    pub from: String,
    pub from_name: String,
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
    /// Lets providers deduplicate resends of the same task.
    pub idempotency_key: Uuid,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub provider_message_id: Option<String>,
}

/// Failure of a single delivery attempt. Never surfaced to business operations.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transient delivery failure: {0}")]
    Transient(String),
    #[error("provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

/// Outbound send capability.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, DeliveryError>;
}

/// Sender that only writes the message to the log. Used in development.
#[derive(Clone, Debug, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, DeliveryError> {
        info!(
            to = %email.to,
            subject = %email.subject,
            idempotency_key = %email.idempotency_key,
            "email (log provider)"
        );
        Ok(SendReceipt {
            provider_message_id: Some(format!("log-{}", email.idempotency_key)),
        })
    }
}

#[derive(Debug, Serialize)]
struct ProviderAddress<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ProviderRequest<'a> {
    from: ProviderAddress<'a>,
    to: Vec<ProviderAddress<'a>>,
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderResponse {
    #[serde(default, alias = "message_id")]
    id: Option<String>,
}

/// Sender for JSON e-mail APIs: `POST {url}` with a bearer key.
#[derive(Clone)]
pub struct HttpEmailSender {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpEmailSender {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Transient(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, DeliveryError> {
        let body = ProviderRequest {
            from: ProviderAddress {
                email: &email.from,
                name: Some(&email.from_name),
            },
            to: vec![ProviderAddress {
                email: &email.to,
                name: email.to_name.as_deref(),
            }],
            subject: &email.subject,
            html: &email.html,
            text: email.text.as_deref(),
        };

        let mut request = self
            .client
            .post(&self.url)
            .header("Idempotency-Key", email.idempotency_key.to_string())
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DeliveryError::Transient(format!("provider timed out: {}", e))
            } else {
                DeliveryError::Transient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ProviderResponse = response.json().await.unwrap_or_default();
        debug!(to = %email.to, provider_message_id = ?parsed.id, "email accepted by provider");
        Ok(SendReceipt {
            provider_message_id: parsed.id,
        })
    }
}

/// Builds the sender selected by configuration.
pub fn sender_from_config(
    cfg: &NotificationConfig,
) -> Result<std::sync::Arc<dyn EmailSender>, DeliveryError> {
    match cfg.provider.to_ascii_lowercase().as_str() {
        "http" => {
            let url = cfg.provider_url.clone().ok_or_else(|| {
                DeliveryError::Transient("provider_url is not configured".to_string())
            })?;
            Ok(std::sync::Arc::new(HttpEmailSender::new(
                url,
                cfg.provider_api_key.clone(),
                cfg.send_timeout(),
            )?))
        }
        _ => Ok(std::sync::Arc::new(LogEmailSender)),
    }
}
