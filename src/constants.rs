//! Centralized constants for reserved names, formats, permissions, and limits.

/// Default service name under which the ledger document is stored.
pub const DEFAULT_META_SERVICE: &str = "EKR_META";

/// Default username under which the ledger document is stored.
pub const DEFAULT_META_USERNAME: &str = "ledger";

/// Default service namespace for named secrets.
pub const DEFAULT_SECRETS_SERVICE: &str = "EKR_SECRETS";

/// Separator between service and username in ledger identity keys.
pub const IDENTITY_SEPARATOR: char = '|';

/// Canonical bucket timestamp format: `YYYYMMDDHHMMSS`.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Width of a canonical bucket timestamp.
pub const TIMESTAMP_WIDTH: usize = 14;

/// Default PBKDF2 iteration count for token key derivation.
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

/// Salt length embedded at the front of every token.
pub const SALT_LEN: usize = 16;

/// Length of the big-endian iteration count following the salt.
pub const ITERATIONS_LEN: usize = 4;

/// AES-GCM nonce length, prefixed to the authenticated ciphertext.
pub const NONCE_LEN: usize = 12;

/// Random bytes behind a generated bucket key (url-safe base64 encoded).
pub const GENERATED_KEY_BYTES: usize = 32;

/// Default keyring root directory name under the user config dir.
pub const ROOT_DIR_NAME: &str = "ekring";

/// Environment variable holding the tracing filter.
pub const LOG_ENV_VAR: &str = "EKRING_LOG";

/// Permission mode for the keyring root directory.
pub const ROOT_DIR_MODE: u32 = 0o700;

/// Permission mode for the file-backed store and settings.
pub const STORE_FILE_MODE: u32 = 0o600;

/// Maximum secret size in bytes (1 MiB).
pub const MAX_SECRET_SIZE: usize = 1_048_576;
