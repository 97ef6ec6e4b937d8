pub mod batch;
pub mod order;
pub mod order_item;
pub mod product;
pub mod stock_item;
pub mod stock_movement;
pub mod stock_movement_lot;
pub mod warehouse;
