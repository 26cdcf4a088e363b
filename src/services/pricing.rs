use rust_decimal::Decimal;
use std::cmp::Ordering;

use crate::entities::{catalog_item::PriceType, price_tier};
use crate::errors::ServiceError;
use crate::services::catalog::CatalogEntry;

/// Orders tiers so the applicable one comes first: larger minimum quantity
/// first, and for equal minimums the higher price first.
fn tier_precedence(a: &price_tier::Model, b: &price_tier::Model) -> Ordering {
    b.minimum_quantity
        .cmp(&a.minimum_quantity)
        .then_with(|| b.price.cmp(&a.price))
}

/// Resolves the unit price of `requested_qty` units of a catalog item.
///
/// Quantity-break tiers win over list prices: the tier with the largest
/// minimum quantity not exceeding the request applies. Without an applicable
/// tier the base price is used, or the wholesale price when requested and
/// the item has one.
pub fn resolve_unit_price(
    entry: &CatalogEntry,
    requested_qty: i32,
    price_type: PriceType,
) -> Result<Decimal, ServiceError> {
    let item = &entry.item;

    if requested_qty <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "Quantity for item {} must be positive",
            item.id
        )));
    }
    if requested_qty < item.minimum_order_quantity {
        return Err(ServiceError::BelowMinimumQuantity {
            item_id: item.id,
            requested: requested_qty,
            minimum: item.minimum_order_quantity,
        });
    }

    let mut tiers: Vec<&price_tier::Model> = entry.tiers.iter().collect();
    tiers.sort_by(|a, b| tier_precedence(a, b));

    if let Some(tier) = tiers
        .into_iter()
        .find(|tier| tier.minimum_quantity <= requested_qty)
    {
        return Ok(tier.price);
    }

    Ok(match price_type {
        PriceType::Wholesale => item.wholesale_price.unwrap_or(item.base_price),
        PriceType::Standard => item.base_price,
    })
}
