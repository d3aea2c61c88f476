pub mod error;
pub mod events;
pub mod period;

pub use error::{CoreError, ErrorCategory, Result};
pub use period::BillingPeriod;
