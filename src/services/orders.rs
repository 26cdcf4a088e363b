use std::sync::Arc;

use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::Actor,
    entities::{
        address,
        order::{self, Entity as OrderEntity, OrderStatus},
        order_item,
    },
    errors::ServiceError,
};

/// An order with everything needed to render it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderDetails {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub shipping_address: Option<address::Model>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderPage {
    pub items: Vec<order::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

pub(crate) async fn load_items<C: ConnectionTrait>(
    db: &C,
    order_id: Uuid,
) -> Result<Vec<order_item::Model>, ServiceError> {
    Ok(order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::CreatedAt)
        .order_by_asc(order_item::Column::Sku)
        .all(db)
        .await?)
}

pub(crate) async fn find_order<C: ConnectionTrait>(
    db: &C,
    order_id: Uuid,
) -> Result<order::Model, ServiceError> {
    OrderEntity::find_by_id(order_id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
}

/// Read side for orders.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Hydrated order for its owner or an admin. Other callers get `NotFound`.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn get_order(&self, order_id: Uuid, actor: &Actor) -> Result<OrderDetails, ServiceError> {
        let db = &*self.db;
        let order = find_order(db, order_id).await?;
        if !actor.can_access(order.actor_id) {
            return Err(ServiceError::NotFound(format!("Order {} not found", order_id)));
        }

        let items = load_items(db, order.id).await?;
        let shipping_address = address::Entity::find_by_id(order.shipping_address_id)
            .one(db)
            .await?;

        Ok(OrderDetails {
            order,
            items,
            shipping_address,
        })
    }

    /// Newest first. Customers see their own orders, admins see all.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn list_orders(
        &self,
        actor: &Actor,
        status: Option<OrderStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<OrderPage, ServiceError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);

        let mut query = OrderEntity::find();
        if !actor.is_admin() {
            query = query.filter(order::Column::ActorId.eq(actor.id));
        }
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status));
        }

        let paginator = query
            .order_by_desc(order::Column::OrderDate)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page - 1).await?;

        Ok(OrderPage {
            items,
            total,
            page,
            per_page,
        })
    }
}
