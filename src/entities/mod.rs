pub mod admins;
pub mod coupon_claims;
pub mod coupons;

pub use admins as admin_entity;
pub use coupon_claims as coupon_claim_entity;
pub use coupons as coupon_entity;
