//! Read-only collaborators consumed by checkout: the product catalog and the
//! address book. Both are looked up inside the caller's transaction so their
//! reads belong to the same unit of work.

use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

use crate::entities::{address, catalog_item, price_tier};
use crate::errors::ServiceError;

/// A catalog item with its quantity-break tiers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogEntry {
    pub item: catalog_item::Model,
    pub tiers: Vec<price_tier::Model>,
}

#[async_trait]
pub trait CatalogLookup: Send + Sync {
    /// Current pricing data of an active item, or `None` when it does not exist.
    async fn get_item(
        &self,
        txn: &DatabaseTransaction,
        item_id: Uuid,
    ) -> Result<Option<CatalogEntry>, ServiceError>;
}

#[async_trait]
pub trait AddressLookup: Send + Sync {
    /// The address if it exists and belongs to `owner_id`.
    async fn get_address(
        &self,
        txn: &DatabaseTransaction,
        address_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<address::Model>, ServiceError>;
}

/// Catalog backed by the `catalog_items` and `price_tiers` tables.
#[derive(Clone, Debug, Default)]
pub struct DbCatalog;

#[async_trait]
impl CatalogLookup for DbCatalog {
    async fn get_item(
        &self,
        txn: &DatabaseTransaction,
        item_id: Uuid,
    ) -> Result<Option<CatalogEntry>, ServiceError> {
        let Some(item) = catalog_item::Entity::find_by_id(item_id)
            .filter(catalog_item::Column::IsActive.eq(true))
            .one(txn)
            .await?
        else {
            return Ok(None);
        };

        let tiers = price_tier::Entity::find()
            .filter(price_tier::Column::CatalogItemId.eq(item_id))
            .order_by_desc(price_tier::Column::MinimumQuantity)
            .all(txn)
            .await?;

        Ok(Some(CatalogEntry { item, tiers }))
    }
}

/// Address book backed by the `addresses` table.
#[derive(Clone, Debug, Default)]
pub struct DbAddressBook;

#[async_trait]
impl AddressLookup for DbAddressBook {
    async fn get_address(
        &self,
        txn: &DatabaseTransaction,
        address_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<address::Model>, ServiceError> {
        Ok(address::Entity::find_by_id(address_id)
            .filter(address::Column::OwnerId.eq(owner_id))
            .one(txn)
            .await?)
    }
}
