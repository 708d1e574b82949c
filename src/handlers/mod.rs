pub mod admin;
pub mod auth;
pub mod coupon;

pub use admin::admin_config;
pub use auth::auth_config;
pub use coupon::coupon_config;
