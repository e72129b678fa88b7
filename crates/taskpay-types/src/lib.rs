pub mod amount;
pub mod error;
pub mod id;
pub mod phone;

pub use amount::{UsdAmount, USD_BASE_UNIT, USD_DECIMALS};
pub use error::{Result, TaskPayError};
pub use id::UserId;
