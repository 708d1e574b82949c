pub mod connection;
pub mod coupon_store;
pub mod memory_store;

pub use connection::{DbPool, create_pool, run_migrations};
pub use coupon_store::{CouponStore, SeaOrmCouponStore};
pub use memory_store::MemoryCouponStore;
