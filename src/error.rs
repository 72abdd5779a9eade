//! Error taxonomy for expirable keyring operations.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KeyringError>;

#[derive(Error, Debug)]
pub enum KeyringError {
    /// The identity has no ledger association.
    #[error("{service}:{username} is not an expirable entry")]
    NotManaged { service: String, username: String },

    /// The expiration instant has already passed.
    #[error("expiration {timestamp} already passed")]
    AlreadyExpired { timestamp: String },

    #[error("bucket {0} not found")]
    BucketNotFound(String),

    #[error("bucket {0} already exists")]
    BucketAlreadyExists(String),

    #[error("identity {service}:{username} not found in ledger")]
    IdentityNotFound { service: String, username: String },

    #[error("invalid date format: {0}")]
    InvalidDateFormat(String),

    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// Wrong key or tampered token; the two are deliberately indistinguishable.
    #[error("authentication failed")]
    AuthenticationFailure,

    #[error("encryption failed")]
    EncryptionFailure,

    #[error("ledger document is corrupt: {0}")]
    CorruptLedger(String),

    #[error("secret store error: {0}")]
    Backend(String),

    #[error("decrypted value is not valid UTF-8")]
    Encoding,
}

impl KeyringError {
    /// Stable label printed by the command surface.
    pub fn signal(&self) -> &'static str {
        match self {
            KeyringError::NotManaged { .. } => "INVALID",
            KeyringError::AlreadyExpired { .. } => "EXPIRED",
            _ => "ERROR",
        }
    }

    /// Process exit status for the command surface.
    pub fn exit_code(&self) -> u8 {
        match self {
            KeyringError::NotManaged { .. } => 3,
            KeyringError::AlreadyExpired { .. } => 4,
            _ => 1,
        }
    }

    pub(crate) fn not_managed(service: &str, username: &str) -> Self {
        KeyringError::NotManaged {
            service: service.to_string(),
            username: username.to_string(),
        }
    }
}

impl From<serde_json::Error> for KeyringError {
    fn from(err: serde_json::Error) -> Self {
        KeyringError::CorruptLedger(err.to_string())
    }
}
