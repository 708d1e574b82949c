pub mod auth_service;
pub mod claim_service;
pub mod coupon_service;
pub mod eligibility;
pub mod rate_limiter;

pub use auth_service::*;
pub use claim_service::*;
pub use coupon_service::*;
pub use rate_limiter::*;
