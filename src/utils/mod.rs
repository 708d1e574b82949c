pub mod identity;
pub mod jwt;
pub mod password;

pub use identity::*;
pub use jwt::*;
pub use password::*;
