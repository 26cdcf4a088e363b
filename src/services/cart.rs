use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::Actor,
    entities::{
        cart_item::{self, Entity as CartItemEntity},
        catalog_item::{self, PriceType},
        price_tier,
    },
    errors::ServiceError,
    services::{catalog::CatalogEntry, pricing::resolve_unit_price},
};

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct AddCartItemRequest {
    pub catalog_item_id: Uuid,
    #[validate(range(min = 1, max = 100000, message = "Quantity must be between 1 and 100000"))]
    pub quantity: i32,
    #[serde(default)]
    pub price_type: PriceType,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateCartItemRequest {
    #[validate(range(min = 1, max = 100000, message = "Quantity must be between 1 and 100000"))]
    pub quantity: i32,
}

/// A cart line with an indicative price. The binding price is resolved again
/// at checkout.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartLineView {
    pub id: Uuid,
    pub catalog_item_id: Uuid,
    pub sku: String,
    pub name: String,
    pub quantity: i32,
    pub price_type: PriceType,
    pub minimum_order_quantity: i32,
    pub unit_price: Option<Decimal>,
    pub line_total: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub subtotal: Decimal,
}

#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn active_item(&self, item_id: Uuid) -> Result<catalog_item::Model, ServiceError> {
        catalog_item::Entity::find_by_id(item_id)
            .filter(catalog_item::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Catalog item {} not found", item_id)))
    }

    async fn owned_line(&self, actor: &Actor, line_id: Uuid) -> Result<cart_item::Model, ServiceError> {
        CartItemEntity::find_by_id(line_id)
            .filter(cart_item::Column::ActorId.eq(actor.id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", line_id)))
    }

    /// Adds an item to the actor's cart, merging with an existing line for
    /// the same item and price type.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id, item_id = %request.catalog_item_id))]
    pub async fn add_item(
        &self,
        actor: &Actor,
        request: AddCartItemRequest,
    ) -> Result<cart_item::Model, ServiceError> {
        request.validate()?;
        self.active_item(request.catalog_item_id).await?;

        let now = Utc::now();
        let existing = CartItemEntity::find()
            .filter(cart_item::Column::ActorId.eq(actor.id))
            .filter(cart_item::Column::CatalogItemId.eq(request.catalog_item_id))
            .filter(cart_item::Column::PriceType.eq(request.price_type))
            .one(&*self.db)
            .await?;

        let line = match existing {
            Some(line) => {
                let quantity = line.quantity.saturating_add(request.quantity);
                let mut active: cart_item::ActiveModel = line.into();
                active.quantity = Set(quantity);
                active.updated_at = Set(Some(now));
                active.update(&*self.db).await?
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    actor_id: Set(actor.id),
                    catalog_item_id: Set(request.catalog_item_id),
                    quantity: Set(request.quantity),
                    price_type: Set(request.price_type),
                    created_at: Set(now),
                    updated_at: Set(None),
                }
                .insert(&*self.db)
                .await
                .map_err(|e| {
                    error!("Failed to insert cart line: {}", e);
                    ServiceError::DatabaseError(e)
                })?
            }
        };

        info!(line_id = %line.id, quantity = line.quantity, "cart line saved");
        Ok(line)
    }

    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn update_quantity(
        &self,
        actor: &Actor,
        line_id: Uuid,
        request: UpdateCartItemRequest,
    ) -> Result<cart_item::Model, ServiceError> {
        request.validate()?;
        let line = self.owned_line(actor, line_id).await?;

        let mut active: cart_item::ActiveModel = line.into();
        active.quantity = Set(request.quantity);
        active.updated_at = Set(Some(Utc::now()));
        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn remove_item(&self, actor: &Actor, line_id: Uuid) -> Result<(), ServiceError> {
        let line = self.owned_line(actor, line_id).await?;
        CartItemEntity::delete_by_id(line.id).exec(&*self.db).await?;
        info!(line_id = %line_id, "cart line removed");
        Ok(())
    }

    /// The actor's cart lines with indicative pricing.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn get_cart(&self, actor: &Actor) -> Result<CartView, ServiceError> {
        let db = &*self.db;
        let lines = CartItemEntity::find()
            .filter(cart_item::Column::ActorId.eq(actor.id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .find_also_related(catalog_item::Entity)
            .all(db)
            .await?;

        let mut views = Vec::with_capacity(lines.len());
        let mut subtotal = Decimal::ZERO;
        for (line, item) in lines {
            let Some(item) = item else {
                continue;
            };
            let tiers = price_tier::Entity::find()
                .filter(price_tier::Column::CatalogItemId.eq(item.id))
                .all(db)
                .await?;
            let entry = CatalogEntry { item, tiers };

            let unit_price = resolve_unit_price(&entry, line.quantity, line.price_type).ok();
            let line_total = unit_price.map(|price| price * Decimal::from(line.quantity));
            if let Some(total) = line_total {
                subtotal += total;
            }

            views.push(CartLineView {
                id: line.id,
                catalog_item_id: entry.item.id,
                sku: entry.item.sku,
                name: entry.item.name,
                quantity: line.quantity,
                price_type: line.price_type,
                minimum_order_quantity: entry.item.minimum_order_quantity,
                unit_price,
                line_total,
            });
        }

        Ok(CartView {
            lines: views,
            subtotal,
        })
    }
}
