pub mod admin;
pub mod common;
pub mod coupon;

pub use admin::*;
pub use common::*;
pub use coupon::*;
