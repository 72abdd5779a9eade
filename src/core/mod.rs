//! Core business logic modules.

pub mod clock;
pub mod codec;
pub mod config;
pub mod dates;
pub mod file_lock;
pub mod file_store;
#[cfg(feature = "keyring")]
pub mod keyring_store;
pub mod ledger;
pub mod manager;
pub mod paths;
pub mod store;
