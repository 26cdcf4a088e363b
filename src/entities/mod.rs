pub mod address;
pub mod cart_item;
pub mod catalog_item;
pub mod invoice;
pub mod notification_task;
pub mod order;
pub mod order_item;
pub mod price_tier;
