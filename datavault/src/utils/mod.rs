//! Utility modules for DataVault.

pub mod errors;
pub mod logger;

pub use errors::{DataVaultError, Result};
