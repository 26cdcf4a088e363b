pub mod analytics;
pub mod cart;
pub mod checkout;
pub mod health;
pub mod invoices;
pub mod notifications;
pub mod orders;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    notifications::{EmailSender, NotificationEngine, OrderNotifier},
    services::{
        analytics::AnalyticsService,
        cart::CartService,
        catalog::{AddressLookup, CatalogLookup, DbAddressBook, DbCatalog},
        checkout::CheckoutService,
        invoicing::InvoiceService,
        order_status::OrderStatusService,
        orders::OrderService,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
    pub order_status: Arc<OrderStatusService>,
    pub invoices: Arc<InvoiceService>,
    pub analytics: Arc<AnalyticsService>,
    pub notifications: NotificationEngine,
}

impl AppServices {
    /// Wires every service against the store-backed collaborators.
    pub fn new(db_pool: Arc<DbPool>, config: &AppConfig, sender: Arc<dyn EmailSender>) -> Self {
        let engine =
            NotificationEngine::new(db_pool.clone(), sender, config.notifications.clone());
        Self::with_engine(
            db_pool,
            config,
            engine,
            Arc::new(DbCatalog),
            Arc::new(DbAddressBook),
        )
    }

    /// Same as [`AppServices::new`] with explicit collaborators.
    pub fn with_engine(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        engine: NotificationEngine,
        catalog: Arc<dyn CatalogLookup>,
        addresses: Arc<dyn AddressLookup>,
    ) -> Self {
        let notifier = OrderNotifier::new(
            engine.clone(),
            config.notifications.admin_recipients.clone(),
        );

        Self {
            cart: Arc::new(CartService::new(db_pool.clone())),
            checkout: Arc::new(CheckoutService::new(
                db_pool.clone(),
                catalog,
                addresses,
                notifier.clone(),
                config.orders.clone(),
            )),
            orders: Arc::new(OrderService::new(db_pool.clone())),
            order_status: Arc::new(OrderStatusService::new(
                db_pool.clone(),
                notifier,
                config.orders.clone(),
            )),
            invoices: Arc::new(InvoiceService::new(
                db_pool.clone(),
                config.invoices.clone(),
            )),
            analytics: Arc::new(AnalyticsService::new(db_pool)),
            notifications: engine,
        }
    }
}

impl AppState {
    pub fn new(db: Arc<DbPool>, config: AppConfig, services: AppServices) -> Self {
        Self {
            db,
            config,
            services,
        }
    }
}
