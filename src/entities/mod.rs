pub mod coupon;
pub mod discount_offer;
pub mod order;
pub mod order_line;
pub mod payment;
pub mod product;
pub mod system_setting;

pub use coupon::Entity as Coupon;
pub use discount_offer::Entity as DiscountOffer;
pub use order::Entity as Order;
pub use order_line::Entity as OrderLine;
pub use payment::Entity as Payment;
pub use product::Entity as Product;
pub use system_setting::Entity as SystemSetting;
