#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use orderflow::{
    api,
    auth::{Actor, ACTOR_EMAIL_HEADER, ACTOR_ID_HEADER, ACTOR_NAME_HEADER, ACTOR_ROLE_HEADER},
    config::{AppConfig, NotificationConfig},
    db,
    entities::{
        address,
        catalog_item::{self, PriceType},
        price_tier,
    },
    handlers::AppServices,
    notifications::{DeliveryError, EmailSender, NotificationEngine, OutboundEmail, SendReceipt},
    services::{
        cart::AddCartItemRequest,
        catalog::{DbAddressBook, DbCatalog},
        checkout::CheckoutRequest,
        orders::OrderDetails,
    },
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub const ADMIN_INBOX: &str = "ops@example.com";
pub const WORKER_ID: &str = "test-worker";

/// Sender whose outcomes are scripted per call. Unscripted calls succeed.
#[derive(Default)]
pub struct ScriptedSender {
    script: Mutex<VecDeque<Result<(), String>>>,
    sent: Mutex<Vec<OutboundEmail>>,
}

impl ScriptedSender {
    pub fn fail_next(&self, times: usize) {
        let mut script = self.script.lock().unwrap();
        for n in 0..times {
            script.push_back(Err(format!("smtp unavailable ({})", n + 1)));
        }
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for ScriptedSender {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, DeliveryError> {
        let next = self.script.lock().unwrap().pop_front().unwrap_or(Ok(()));
        match next {
            Ok(()) => {
                self.sent.lock().unwrap().push(email.clone());
                Ok(SendReceipt {
                    provider_message_id: Some(format!("msg-{}", email.idempotency_key)),
                })
            }
            Err(reason) => Err(DeliveryError::Transient(reason)),
        }
    }
}

/// Sender that takes `delay` to accept each message.
pub struct DelayedSender {
    delay: Duration,
    sent: Mutex<Vec<Uuid>>,
}

impl DelayedSender {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Idempotency keys of every accepted message, in send order.
    pub fn sent_ids(&self) -> Vec<Uuid> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for DelayedSender {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, DeliveryError> {
        tokio::time::sleep(self.delay).await;
        self.sent.lock().unwrap().push(email.idempotency_key);
        Ok(SendReceipt {
            provider_message_id: None,
        })
    }
}

/// Application wired against a private in-memory SQLite database.
pub struct TestApp {
    pub state: AppState,
    pub db: Arc<DatabaseConnection>,
    pub sender: Arc<ScriptedSender>,
    pub customer: Actor,
    pub admin: Actor,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        // One long-lived connection keeps the in-memory database alive.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.db_idle_timeout_secs = 86_400;
        cfg.notifications.admin_recipients = vec![ADMIN_INBOX.to_string()];

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to open test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to migrate test database");
        let db = Arc::new(pool);

        let sender = Arc::new(ScriptedSender::default());
        let engine = NotificationEngine::new(db.clone(), sender.clone(), cfg.notifications.clone())
            .with_worker_id(WORKER_ID);
        let services = AppServices::with_engine(
            db.clone(),
            &cfg,
            engine,
            Arc::new(DbCatalog),
            Arc::new(DbAddressBook),
        );
        let state = AppState::new(db.clone(), cfg, services);
        let router = api::router(state.clone());

        Self {
            state,
            db,
            sender,
            customer: Actor::customer(Uuid::new_v4(), "jo@example.com", "Jo Doe"),
            admin: Actor::admin(Uuid::new_v4(), "admin@example.com", "Admin"),
            router,
        }
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    pub fn engine(&self) -> &NotificationEngine {
        &self.state.services.notifications
    }

    /// A second engine on the same database with its own sender and settings.
    pub fn engine_with(
        &self,
        worker_id: &str,
        sender: Arc<dyn EmailSender>,
        tune: impl FnOnce(&mut NotificationConfig),
    ) -> NotificationEngine {
        let mut cfg = self.state.config.notifications.clone();
        tune(&mut cfg);
        NotificationEngine::new(self.db.clone(), sender, cfg).with_worker_id(worker_id)
    }

    pub async fn seed_item(
        &self,
        sku: &str,
        base_price: Decimal,
        wholesale_price: Option<Decimal>,
        minimum_order_quantity: i32,
        tiers: &[(i32, Decimal)],
    ) -> catalog_item::Model {
        let item = catalog_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(sku.to_string()),
            name: Set(format!("Item {}", sku)),
            base_price: Set(base_price),
            wholesale_price: Set(wholesale_price),
            minimum_order_quantity: Set(minimum_order_quantity),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed catalog item");

        for (minimum_quantity, price) in tiers {
            price_tier::ActiveModel {
                id: Set(Uuid::new_v4()),
                catalog_item_id: Set(item.id),
                minimum_quantity: Set(*minimum_quantity),
                price: Set(*price),
            }
            .insert(&*self.db)
            .await
            .expect("failed to seed price tier");
        }
        item
    }

    pub async fn seed_address(&self, owner: &Actor) -> address::Model {
        address::ActiveModel {
            id: Set(Uuid::new_v4()),
            owner_id: Set(owner.id),
            recipient_name: Set(owner.name.clone()),
            line1: Set("1 Market Street".to_string()),
            line2: Set(None),
            city: Set("Springfield".to_string()),
            region: Set(Some("OR".to_string())),
            postal_code: Set("97403".to_string()),
            country: Set("US".to_string()),
            phone: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed address")
    }

    pub async fn add_to_cart(&self, actor: &Actor, item_id: Uuid, quantity: i32, price_type: PriceType) {
        self.services()
            .cart
            .add_item(
                actor,
                AddCartItemRequest {
                    catalog_item_id: item_id,
                    quantity,
                    price_type,
                },
            )
            .await
            .expect("failed to add cart line");
    }

    /// Cart of one standard line, checked out with no adjustments.
    pub async fn place_simple_order(&self, unit_price: Decimal, quantity: i32) -> OrderDetails {
        let sku = format!("SKU-{}", Uuid::new_v4().simple());
        let item = self.seed_item(&sku, unit_price, None, 1, &[]).await;
        let address = self.seed_address(&self.customer).await;
        self.add_to_cart(&self.customer, item.id, quantity, PriceType::Standard)
            .await;
        self.services()
            .checkout
            .checkout(&self.customer, checkout_request(address.id))
            .await
            .expect("checkout failed")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        actor: Option<&Actor>,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            builder = builder
                .header(ACTOR_ID_HEADER, actor.id.to_string())
                .header(ACTOR_ROLE_HEADER, actor.role.to_string())
                .header(ACTOR_EMAIL_HEADER, actor.email.as_str())
                .header(ACTOR_NAME_HEADER, actor.name.as_str());
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(builder.body(body).expect("invalid request"))
            .await
            .expect("router failed")
    }
}

pub fn checkout_request(shipping_address_id: Uuid) -> CheckoutRequest {
    CheckoutRequest {
        shipping_address_id,
        payment_method: "card".to_string(),
        tax_amount: Decimal::ZERO,
        shipping_amount: Decimal::ZERO,
        discount_amount: Decimal::ZERO,
    }
}

pub async fn response_json<T: DeserializeOwned>(response: axum::response::Response) -> (StatusCode, T) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    let value = serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        panic!(
            "unexpected body ({}): {}",
            e,
            String::from_utf8_lossy(&bytes)
        )
    });
    (status, value)
}
