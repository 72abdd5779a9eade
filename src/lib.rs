//! Expiring keyring: time-limited credentials over a plain secret store.
//!
//! Every stored value is encrypted under a key shared by all credentials that
//! expire at the same instant (a "bucket"). A ledger kept in the store itself
//! maps identities to buckets; once a bucket's instant passes, its key and
//! every member ciphertext are deleted together.
//!
//! ## Modules
//! - `cli`: Command-line handlers
//! - `core`: Codec, date resolution, ledger, lifecycle manager, stores
//! - `models`: Serialized data structures (ledger document, settings)
//! - `util`: Filesystem helpers

pub mod cli;
pub mod constants;
pub mod core;
pub mod error;
pub mod models;
pub mod util;

pub use crate::core::clock::{Clock, ManualClock, SystemClock};
pub use crate::core::dates::Expiration;
pub use crate::core::ledger::{Association, Identity};
pub use crate::core::manager::{CredentialState, ExpiringKeyring, KeyringOptions};
pub use crate::core::store::{MemoryStore, SecretStore};
pub use crate::error::{KeyringError, Result};
