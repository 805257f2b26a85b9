//! Master secret lifecycle and the 112-byte wrapped block.
//!
//! ```text
//! wrapped block = AES-256-CBC_nopad(wrap_key, rotation_salt(32) ‖ rotation_iv(16) ‖ secret(64))
//! wrap_key      = PBKDF2-HMAC-SHA384(password, vault_salt)
//! settings_key  = PBKDF2-HMAC-SHA256(secret, rotation_salt), iv = rotation_iv
//! ```
//!
//! The secret never changes for the life of a vault. Rotation salt and IV
//! are regenerated on every [`MasterSecretManager::rotate_and_wrap`], so each
//! save encrypts the settings under a different key.

use keyward_core::{KeywardError, KeywardResult};
use rand::{CryptoRng, RngCore};
use secrecy::SecretString;
use zeroize::Zeroize;

use crate::cipher::{decrypt_fixed, encrypt_fixed};
use crate::kdf::{derive_settings_key, derive_wrap_key, KdfParams, SettingsKey, WrapKey};
use crate::{IV_SIZE, SALT_SIZE, SECRET_SIZE, WRAPPED_BLOCK_SIZE};

/// The 64-byte root of every derived password. Zeroized on drop.
#[derive(Clone)]
pub struct MasterSecret {
    bytes: [u8; SECRET_SIZE],
}

impl MasterSecret {
    pub fn from_bytes(bytes: [u8; SECRET_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn generate<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; SECRET_SIZE];
        rng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_SIZE] {
        &self.bytes
    }
}

impl PartialEq for MasterSecret {
    fn eq(&self, other: &Self) -> bool {
        self.bytes
            .iter()
            .zip(other.bytes.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl Eq for MasterSecret {}

impl Drop for MasterSecret {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterSecret")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Rotation salt and IV stored next to the secret.
#[derive(Clone)]
struct Rotation {
    salt: [u8; SALT_SIZE],
    iv: [u8; IV_SIZE],
}

impl Rotation {
    fn generate<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> Self {
        let mut salt = [0u8; SALT_SIZE];
        let mut iv = [0u8; IV_SIZE];
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut iv);
        Self { salt, iv }
    }
}

impl Drop for Rotation {
    fn drop(&mut self) {
        self.salt.zeroize();
        self.iv.zeroize();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Uninitialized,
    WrapKeyReady,
    SecretReady,
    Persisted,
}

/// Where the current secret came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretOrigin {
    /// Created locally because no valid block existed.
    Generated,
    /// Decrypted from a stored or imported block.
    Unwrapped,
}

pub struct MasterSecretManager {
    params: KdfParams,
    state: ManagerState,
    vault_salt: Option<[u8; SALT_SIZE]>,
    wrap_key: Option<WrapKey>,
    secret: Option<MasterSecret>,
    rotation: Option<Rotation>,
    origin: Option<SecretOrigin>,
}

impl MasterSecretManager {
    pub fn new(params: KdfParams) -> Self {
        Self {
            params,
            state: ManagerState::Uninitialized,
            vault_salt: None,
            wrap_key: None,
            secret: None,
            rotation: None,
            origin: None,
        }
    }

    pub fn params(&self) -> KdfParams {
        self.params
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn origin(&self) -> Option<SecretOrigin> {
        self.origin
    }

    pub fn vault_salt(&self) -> Option<&[u8; SALT_SIZE]> {
        self.vault_salt.as_ref()
    }

    pub fn secret(&self) -> Option<&MasterSecret> {
        self.secret.as_ref()
    }

    /// Derive the wrap key for `password` and `vault_salt`. Any secret held
    /// so far is kept; call [`MasterSecretManager::unwrap`] to load one.
    pub fn derive_wrap_key(&mut self, password: &SecretString, vault_salt: &[u8]) -> KeywardResult<()> {
        let salt = to_salt(vault_salt)?;
        tracing::debug!(iterations = self.params.wrap_iterations, "deriving wrap key");
        self.wrap_key = Some(derive_wrap_key(password, &salt, self.params.wrap_iterations));
        self.vault_salt = Some(salt);
        if self.state == ManagerState::Uninitialized {
            self.state = ManagerState::WrapKeyReady;
        }
        Ok(())
    }

    /// Load the secret from `block`, or create a fresh one when `block` is not
    /// exactly [`WRAPPED_BLOCK_SIZE`] bytes (first run).
    ///
    /// A wrong password is not detected here: it yields a wrong secret, and
    /// the settings payload then fails to decrypt.
    pub fn unwrap<R: RngCore + CryptoRng + ?Sized>(
        &mut self,
        block: &[u8],
        password: &SecretString,
        vault_salt: &[u8],
        rng: &mut R,
    ) -> KeywardResult<()> {
        self.derive_wrap_key(password, vault_salt)?;
        let wrap_key = self.wrap_key.as_ref().ok_or(KeywardError::Locked("wrap key"))?;

        if block.len() == WRAPPED_BLOCK_SIZE {
            let (secret, rotation) = open_block(wrap_key, block)?;
            self.secret = Some(secret);
            self.rotation = Some(rotation);
            self.origin = Some(SecretOrigin::Unwrapped);
        } else {
            tracing::info!(len = block.len(), "no master secret block, generating a new secret");
            self.secret = Some(MasterSecret::generate(rng));
            self.rotation = Some(Rotation::generate(rng));
            self.origin = Some(SecretOrigin::Generated);
        }
        self.state = ManagerState::SecretReady;
        Ok(())
    }

    /// Regenerate the rotation salt and IV and wrap the unchanged secret.
    pub fn rotate_and_wrap<R: RngCore + CryptoRng + ?Sized>(&mut self, rng: &mut R) -> KeywardResult<Vec<u8>> {
        if self.secret.is_none() {
            return Err(KeywardError::Locked("master secret"));
        }
        self.rotation = Some(Rotation::generate(rng));
        let block = self.wrapped_block()?;
        self.state = ManagerState::Persisted;
        Ok(block)
    }

    /// Wrap the secret with the current rotation values, without rotating.
    pub fn wrapped_block(&self) -> KeywardResult<Vec<u8>> {
        let wrap_key = self.wrap_key.as_ref().ok_or(KeywardError::Locked("wrap key"))?;
        let secret = self.secret.as_ref().ok_or(KeywardError::Locked("master secret"))?;
        let rotation = self.rotation.as_ref().ok_or(KeywardError::Locked("rotation salt"))?;

        let mut plain = Vec::with_capacity(WRAPPED_BLOCK_SIZE);
        plain.extend_from_slice(&rotation.salt);
        plain.extend_from_slice(&rotation.iv);
        plain.extend_from_slice(secret.as_bytes());
        let block = encrypt_fixed(wrap_key.key(), wrap_key.iv(), &plain);
        plain.zeroize();
        block
    }

    /// Key for the settings payload under the current rotation values.
    pub fn settings_key(&self) -> KeywardResult<SettingsKey> {
        let secret = self.secret.as_ref().ok_or(KeywardError::Locked("master secret"))?;
        let rotation = self.rotation.as_ref().ok_or(KeywardError::Locked("rotation salt"))?;
        Ok(derive_settings_key(
            secret.as_bytes(),
            &rotation.salt,
            self.params.settings_iterations,
        ))
    }

    pub fn rotation_iv(&self) -> KeywardResult<&[u8; IV_SIZE]> {
        self.rotation
            .as_ref()
            .map(|r| &r.iv)
            .ok_or(KeywardError::Locked("rotation IV"))
    }

    /// Open a remote vault's block and check it against the local secret.
    ///
    /// Returns a manager holding the remote secret and rotation values, for
    /// decrypting the remote settings. Local state is never touched here:
    /// once the remote settings have decrypted, call
    /// [`MasterSecretManager::adopt`] to take over the remote secret. A
    /// different secret in an established vault fails with
    /// [`KeywardError::VaultConflict`].
    pub fn import_remote(
        &self,
        password: &SecretString,
        remote_salt: &[u8],
        remote_block: &[u8],
    ) -> KeywardResult<MasterSecretManager> {
        if remote_block.len() != WRAPPED_BLOCK_SIZE {
            return Err(KeywardError::length(
                "wrapped master secret block",
                WRAPPED_BLOCK_SIZE,
                remote_block.len(),
            ));
        }
        let mut remote = MasterSecretManager::new(self.params);
        remote.derive_wrap_key(password, remote_salt)?;
        let wrap_key = remote.wrap_key.as_ref().ok_or(KeywardError::Locked("wrap key"))?;
        let (secret, rotation) = open_block(wrap_key, remote_block)?;
        remote.secret = Some(secret);
        remote.rotation = Some(rotation);
        remote.origin = Some(SecretOrigin::Unwrapped);
        remote.state = ManagerState::SecretReady;

        if !self.same_secret(&remote) && self.is_established() {
            tracing::error!("remote vault was created with a different master secret");
            return Err(KeywardError::VaultConflict);
        }
        Ok(remote)
    }

    /// Take over the secret of a manager returned by
    /// [`MasterSecretManager::import_remote`]. A no-op when both already hold
    /// the same secret; an established vault refuses a different one.
    pub fn adopt(&mut self, remote: &MasterSecretManager) -> KeywardResult<()> {
        if self.same_secret(remote) {
            return Ok(());
        }
        if self.is_established() {
            return Err(KeywardError::VaultConflict);
        }
        let secret = remote.secret.clone().ok_or(KeywardError::Locked("master secret"))?;
        tracing::info!("adopting master secret from remote vault");
        self.secret = Some(secret);
        self.rotation = remote.rotation.clone();
        self.origin = Some(SecretOrigin::Unwrapped);
        if self.wrap_key.is_some() {
            self.state = ManagerState::SecretReady;
        }
        Ok(())
    }

    fn same_secret(&self, other: &MasterSecretManager) -> bool {
        self.secret.is_some() && self.secret.as_ref() == other.secret.as_ref()
    }

    /// A secret that was loaded from a block or already written out.
    fn is_established(&self) -> bool {
        self.secret.is_some()
            && !(self.origin == Some(SecretOrigin::Generated) && self.state == ManagerState::SecretReady)
    }
}

impl std::fmt::Debug for MasterSecretManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterSecretManager")
            .field("state", &self.state)
            .field("origin", &self.origin)
            .field("params", &self.params)
            .field("has_secret", &self.secret.is_some())
            .finish()
    }
}

fn to_salt(salt: &[u8]) -> KeywardResult<[u8; SALT_SIZE]> {
    salt.try_into()
        .map_err(|_| KeywardError::length("vault salt", SALT_SIZE, salt.len()))
}

fn open_block(wrap_key: &WrapKey, block: &[u8]) -> KeywardResult<(MasterSecret, Rotation)> {
    let mut plain = decrypt_fixed(wrap_key.key(), wrap_key.iv(), block)?;
    let mut salt = [0u8; SALT_SIZE];
    let mut iv = [0u8; IV_SIZE];
    let mut secret = [0u8; SECRET_SIZE];
    salt.copy_from_slice(&plain[..SALT_SIZE]);
    iv.copy_from_slice(&plain[SALT_SIZE..SALT_SIZE + IV_SIZE]);
    secret.copy_from_slice(&plain[SALT_SIZE + IV_SIZE..]);
    plain.zeroize();
    Ok((MasterSecret::from_bytes(secret), Rotation { salt, iv }))
}

/// Random 32-byte vault salt.
pub fn generate_salt<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rng.fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fast() -> KdfParams {
        KdfParams {
            wrap_iterations: 16,
            settings_iterations: 8,
        }
    }

    fn pw(s: &str) -> SecretString {
        SecretString::from(s)
    }

    fn unlocked(rng: &mut StdRng, salt: &[u8; 32]) -> MasterSecretManager {
        let mut m = MasterSecretManager::new(fast());
        m.unwrap(b"", &pw("xyz"), salt, rng).unwrap();
        m
    }

    #[test]
    fn test_state_progression() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut m = MasterSecretManager::new(fast());
        assert_eq!(m.state(), ManagerState::Uninitialized);

        m.derive_wrap_key(&pw("xyz"), &[1u8; 32]).unwrap();
        assert_eq!(m.state(), ManagerState::WrapKeyReady);

        m.unwrap(b"", &pw("xyz"), &[1u8; 32], &mut rng).unwrap();
        assert_eq!(m.state(), ManagerState::SecretReady);

        m.rotate_and_wrap(&mut rng).unwrap();
        assert_eq!(m.state(), ManagerState::Persisted);
    }

    #[test]
    fn test_wrong_length_block_generates_fresh_secret() {
        let mut rng = StdRng::seed_from_u64(2);
        for len in [0usize, 16, 111, 113, 144] {
            let mut m = MasterSecretManager::new(fast());
            m.unwrap(&vec![0xAB; len], &pw("xyz"), &[3u8; 32], &mut rng).unwrap();
            assert_eq!(m.origin(), Some(SecretOrigin::Generated), "len {len}");
            assert!(m.secret().is_some());
        }
    }

    #[test]
    fn test_rotate_and_unwrap_recovers_secret() {
        let mut rng = StdRng::seed_from_u64(3);
        let salt = [4u8; 32];
        let mut m = unlocked(&mut rng, &salt);
        let block = m.rotate_and_wrap(&mut rng).unwrap();
        assert_eq!(block.len(), WRAPPED_BLOCK_SIZE);

        let mut reopened = MasterSecretManager::new(fast());
        reopened.unwrap(&block, &pw("xyz"), &salt, &mut rng).unwrap();

        assert_eq!(reopened.origin(), Some(SecretOrigin::Unwrapped));
        assert_eq!(reopened.secret(), m.secret());
        assert_eq!(reopened.rotation_iv().unwrap(), m.rotation_iv().unwrap());
        assert_eq!(
            reopened.settings_key().unwrap().as_bytes(),
            m.settings_key().unwrap().as_bytes()
        );
    }

    #[test]
    fn test_rotation_changes_block_and_settings_key() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut m = unlocked(&mut rng, &[5u8; 32]);
        let secret = m.secret().unwrap().clone();

        let first = m.rotate_and_wrap(&mut rng).unwrap();
        let key1 = m.settings_key().unwrap();
        let second = m.rotate_and_wrap(&mut rng).unwrap();
        let key2 = m.settings_key().unwrap();

        assert_ne!(first, second);
        assert_ne!(key1.as_bytes(), key2.as_bytes());
        assert_eq!(m.secret().unwrap(), &secret);
    }

    #[test]
    fn test_wrong_password_yields_different_secret() {
        let mut rng = StdRng::seed_from_u64(5);
        let salt = [6u8; 32];
        let mut m = unlocked(&mut rng, &salt);
        let block = m.rotate_and_wrap(&mut rng).unwrap();

        let mut other = MasterSecretManager::new(fast());
        other.unwrap(&block, &pw("wrong"), &salt, &mut rng).unwrap();

        assert_ne!(other.secret(), m.secret());
    }

    #[test]
    fn test_rotate_requires_secret() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut m = MasterSecretManager::new(fast());
        assert!(matches!(
            m.rotate_and_wrap(&mut rng),
            Err(KeywardError::Locked(_))
        ));
    }

    #[test]
    fn test_vault_salt_length_checked() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut m = MasterSecretManager::new(fast());
        assert!(matches!(
            m.unwrap(b"", &pw("xyz"), &[0u8; 16], &mut rng),
            Err(KeywardError::InvalidSaltOrKeyLength { expected: 32, actual: 16, .. })
        ));
    }

    #[test]
    fn test_import_remote_same_secret() {
        let mut rng = StdRng::seed_from_u64(8);
        let salt = [9u8; 32];
        let mut local = unlocked(&mut rng, &salt);
        let block = local.rotate_and_wrap(&mut rng).unwrap();

        let remote = local.import_remote(&pw("xyz"), &salt, &block).unwrap();

        assert_eq!(remote.secret(), local.secret());
    }

    #[test]
    fn test_import_remote_conflict() {
        let mut rng = StdRng::seed_from_u64(10);
        let mut a = unlocked(&mut rng, &[1u8; 32]);
        a.rotate_and_wrap(&mut rng).unwrap();
        let mut b = unlocked(&mut rng, &[2u8; 32]);
        let remote_block = b.rotate_and_wrap(&mut rng).unwrap();
        let before = a.secret().unwrap().clone();

        let result = a.import_remote(&pw("xyz"), &[2u8; 32], &remote_block);

        assert!(matches!(result, Err(KeywardError::VaultConflict)));
        assert_eq!(a.secret().unwrap(), &before);
    }

    #[test]
    fn test_import_remote_adopts_into_fresh_vault() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut remote_vault = unlocked(&mut rng, &[1u8; 32]);
        let remote_block = remote_vault.rotate_and_wrap(&mut rng).unwrap();

        let mut fresh = unlocked(&mut rng, &[2u8; 32]);
        assert_eq!(fresh.origin(), Some(SecretOrigin::Generated));
        let remote = fresh.import_remote(&pw("xyz"), &[1u8; 32], &remote_block).unwrap();
        fresh.adopt(&remote).unwrap();

        assert_eq!(fresh.secret(), remote_vault.secret());
        assert_eq!(fresh.origin(), Some(SecretOrigin::Unwrapped));
        assert_eq!(fresh.vault_salt(), Some(&[2u8; 32]));
    }

    #[test]
    fn test_import_remote_alone_keeps_fresh_secret() {
        let mut rng = StdRng::seed_from_u64(13);
        let mut remote_vault = unlocked(&mut rng, &[1u8; 32]);
        let remote_block = remote_vault.rotate_and_wrap(&mut rng).unwrap();
        let fresh = unlocked(&mut rng, &[2u8; 32]);
        let before = fresh.secret().unwrap().clone();

        // Wrong password: the block still decrypts, to a garbage secret.
        let remote = fresh.import_remote(&pw("wrong"), &[1u8; 32], &remote_block).unwrap();

        assert_ne!(remote.secret(), remote_vault.secret());
        assert_eq!(fresh.secret().unwrap(), &before);
        assert_eq!(fresh.origin(), Some(SecretOrigin::Generated));
    }

    #[test]
    fn test_adopt_refused_by_established_vault() {
        let mut rng = StdRng::seed_from_u64(14);
        let mut a = unlocked(&mut rng, &[1u8; 32]);
        a.rotate_and_wrap(&mut rng).unwrap();
        let b = unlocked(&mut rng, &[2u8; 32]);

        assert!(matches!(a.adopt(&b), Err(KeywardError::VaultConflict)));
    }

    #[test]
    fn test_debug_hides_secret() {
        let mut rng = StdRng::seed_from_u64(12);
        let m = unlocked(&mut rng, &[1u8; 32]);
        let rendered = format!("{:?} {:?}", m, m.secret().unwrap());
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("bytes: ["));
    }
}
