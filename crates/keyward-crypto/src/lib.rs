//! keyward-crypto: vault cryptography
//!
//! Key hierarchy:
//! ```text
//! Master password + vault salt (32)
//!   └── Wrap key: PBKDF2-HMAC-SHA384 → AES-256 key (32) ‖ IV (16)
//!       └── Wrapped block (112): rotation salt (32) ‖ rotation IV (16) ‖ master secret (64)
//!           └── Settings key: PBKDF2-HMAC-SHA256(secret, rotation salt), IV = rotation IV
//! Master secret + domain + username
//!   └── Password: PBKDF2-HMAC-SHA512 digest spent over the entry template
//! ```

pub mod cipher;
pub mod kdf;
pub mod master;
pub mod password;

pub use cipher::{decrypt, decrypt_fixed, encrypt, encrypt_fixed};
pub use kdf::{derive_legacy_key, derive_settings_key, derive_wrap_key, KdfParams, SettingsKey, WrapKey};
pub use master::{generate_salt, ManagerState, MasterSecret, MasterSecretManager, SecretOrigin};
pub use password::{generate, generate_for_entry, DerivationInput};

/// AES-256 key size
pub const KEY_SIZE: usize = 32;

/// AES-CBC IV size
pub const IV_SIZE: usize = 16;

/// AES block size
pub const BLOCK_SIZE: usize = 16;

/// Vault and rotation salt size
pub const SALT_SIZE: usize = 32;

/// Master secret size
pub const SECRET_SIZE: usize = 64;

/// Encrypted rotation salt ‖ rotation IV ‖ secret, seven AES blocks
pub const WRAPPED_BLOCK_SIZE: usize = SALT_SIZE + IV_SIZE + SECRET_SIZE;
