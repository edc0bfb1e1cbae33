#[allow(clippy::module_inception)]
pub mod error;
pub mod reason;

pub use error::{ConfigError, CoordinatorError, RegistryError};
pub use reason::{ErrorCode, FailureReason};
