//! Key derivation: PBKDF2 password → wrap key, secret → settings key

use pbkdf2::pbkdf2_hmac;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Sha256, Sha384, Sha512};
use zeroize::Zeroize;

use crate::{IV_SIZE, KEY_SIZE};

/// Default PBKDF2-HMAC-SHA384 rounds for the wrap key.
pub const WRAP_ITERATIONS: u32 = 32768;
/// Default PBKDF2-HMAC-SHA256 rounds for the settings key.
pub const SETTINGS_ITERATIONS: u32 = 1024;
/// Rounds used by the version-0 export format.
pub const LEGACY_ITERATIONS: u32 = 32768;

/// AES key and IV for the master-secret block. Zeroized on drop.
#[derive(Clone)]
pub struct WrapKey {
    key: [u8; KEY_SIZE],
    iv: [u8; IV_SIZE],
}

impl WrapKey {
    /// Split 48 bytes of KDF output into key (first 32) and IV (last 16).
    fn from_output(output: &[u8]) -> Self {
        let mut key = [0u8; KEY_SIZE];
        let mut iv = [0u8; IV_SIZE];
        key.copy_from_slice(&output[..KEY_SIZE]);
        iv.copy_from_slice(&output[KEY_SIZE..KEY_SIZE + IV_SIZE]);
        Self { key, iv }
    }

    pub fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }
}

impl Drop for WrapKey {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
    }
}

impl std::fmt::Debug for WrapKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrapKey")
            .field("key", &"[REDACTED]")
            .field("iv", &"[REDACTED]")
            .finish()
    }
}

/// AES key for the settings payload. Zeroized on drop.
#[derive(Clone)]
pub struct SettingsKey {
    bytes: [u8; KEY_SIZE],
}

impl SettingsKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SettingsKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SettingsKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Iteration counts for the two vault KDFs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// PBKDF2-HMAC-SHA384 rounds, password → wrap key (default: 32768)
    pub wrap_iterations: u32,
    /// PBKDF2-HMAC-SHA256 rounds, secret → settings key (default: 1024)
    pub settings_iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            wrap_iterations: WRAP_ITERATIONS,
            settings_iterations: SETTINGS_ITERATIONS,
        }
    }
}

/// PBKDF2-HMAC-SHA256(secret, salt, iterations) → 32-byte AES key.
pub fn derive_settings_key(secret: &[u8], salt: &[u8], iterations: u32) -> SettingsKey {
    let mut bytes = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(secret, salt, iterations, &mut bytes);
    SettingsKey { bytes }
}

/// PBKDF2-HMAC-SHA384(password, salt, iterations) → key (32) ‖ IV (16).
pub fn derive_wrap_key(password: &SecretString, salt: &[u8], iterations: u32) -> WrapKey {
    let mut output = [0u8; KEY_SIZE + IV_SIZE];
    pbkdf2_hmac::<Sha384>(
        password.expose_secret().as_bytes(),
        salt,
        iterations,
        &mut output,
    );
    let key = WrapKey::from_output(&output);
    output.zeroize();
    key
}

/// Key and IV of the version-0 export format: the first 48 bytes of
/// PBKDF2-HMAC-SHA512(password, salt, 32768).
pub fn derive_legacy_key(password: &SecretString, salt: &[u8]) -> WrapKey {
    let mut output = pbkdf2_sha512(
        password.expose_secret().as_bytes(),
        salt,
        LEGACY_ITERATIONS,
    );
    let key = WrapKey::from_output(&output);
    output.zeroize();
    key
}

/// Raw PBKDF2-HMAC-SHA512 with a 64-byte output.
pub fn pbkdf2_sha512(message: &[u8], salt: &[u8], iterations: u32) -> [u8; 64] {
    let mut digest = [0u8; 64];
    pbkdf2_hmac::<Sha512>(message, salt, iterations, &mut digest);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pbkdf2_sha512_vector() {
        let digest = pbkdf2_sha512(b"message", b"pepper", 3);
        assert_eq!(
            hex::encode(digest),
            "2646f9ccb58d21406815bafc62245771bf80aaa080a633ff1bdd660eb44f369a\
             89da48fb041c5551a118de20cfb8b96b92e7a9945425ba889e9ad645614522eb"
        );
    }

    #[test]
    fn test_wrap_key_deterministic() {
        let password = SecretString::from("secret");
        let salt = [7u8; 32];

        let a = derive_wrap_key(&password, &salt, 64);
        let b = derive_wrap_key(&password, &salt, 64);

        assert_eq!(a.key(), b.key());
        assert_eq!(a.iv(), b.iv());
    }

    #[test]
    fn test_wrap_key_depends_on_password_and_salt() {
        let salt = [7u8; 32];
        let base = derive_wrap_key(&SecretString::from("a"), &salt, 64);
        let other_pw = derive_wrap_key(&SecretString::from("b"), &salt, 64);
        let other_salt = derive_wrap_key(&SecretString::from("a"), &[8u8; 32], 64);

        assert_ne!(base.key(), other_pw.key());
        assert_ne!(base.key(), other_salt.key());
    }

    #[test]
    fn test_wrap_key_is_prefix_of_sha384_output() {
        let password = SecretString::from("pw");
        let mut full = [0u8; 48];
        pbkdf2_hmac::<Sha384>(b"pw", b"salt", 10, &mut full);

        let wrap = derive_wrap_key(&password, b"salt", 10);

        assert_eq!(&full[..32], wrap.key());
        assert_eq!(&full[32..], wrap.iv());
    }

    #[test]
    fn test_settings_key_differs_by_salt() {
        let a = derive_settings_key(b"secret", &[1u8; 32], 16);
        let b = derive_settings_key(b"secret", &[2u8; 32], 16);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_legacy_key_matches_sha512_prefix() {
        let password = SecretString::from("pw");
        let digest = pbkdf2_sha512(b"pw", b"salt", LEGACY_ITERATIONS);
        let legacy = derive_legacy_key(&password, b"salt");

        assert_eq!(&digest[..32], legacy.key());
        assert_eq!(&digest[32..48], legacy.iv());
    }

    #[test]
    fn test_debug_redacts() {
        let key = derive_settings_key(b"secret", b"salt", 1);
        assert!(format!("{key:?}").contains("[REDACTED]"));
    }
}
