pub mod coupons;
pub mod order_status;
pub mod orders;
pub mod pricing;
pub mod settings;
pub mod settlement;
pub mod stock;
