//! AES-256-CBC, PKCS#7-padded and unpadded.
//!
//! Decryption failures are reported as [`KeywardError::WrongPasswordOrCorruptData`]
//! without distinguishing a bad pad byte from any other failure.

use aes::Aes256;
use cbc::cipher::block_padding::{NoPadding, Pkcs7};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use keyward_core::{KeywardError, KeywardResult};

use crate::{BLOCK_SIZE, IV_SIZE, KEY_SIZE};

type Encryptor = cbc::Encryptor<Aes256>;
type Decryptor = cbc::Decryptor<Aes256>;

fn check_lengths(key: &[u8], iv: &[u8]) -> KeywardResult<()> {
    if key.len() != KEY_SIZE {
        return Err(KeywardError::length("AES key", KEY_SIZE, key.len()));
    }
    if iv.len() != IV_SIZE {
        return Err(KeywardError::length("AES IV", IV_SIZE, iv.len()));
    }
    Ok(())
}

fn encryptor(key: &[u8], iv: &[u8]) -> KeywardResult<Encryptor> {
    check_lengths(key, iv)?;
    Encryptor::new_from_slices(key, iv).map_err(|_| KeywardError::length("AES key", KEY_SIZE, key.len()))
}

fn decryptor(key: &[u8], iv: &[u8]) -> KeywardResult<Decryptor> {
    check_lengths(key, iv)?;
    Decryptor::new_from_slices(key, iv).map_err(|_| KeywardError::length("AES key", KEY_SIZE, key.len()))
}

/// Encrypt with PKCS#7 padding. The output is always 1..=16 bytes longer
/// than the input.
pub fn encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> KeywardResult<Vec<u8>> {
    Ok(encryptor(key, iv)?.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

pub fn decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> KeywardResult<Vec<u8>> {
    decryptor(key, iv)?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| KeywardError::WrongPasswordOrCorruptData)
}

/// Encrypt block-aligned input without padding.
pub fn encrypt_fixed(key: &[u8], iv: &[u8], plaintext: &[u8]) -> KeywardResult<Vec<u8>> {
    let cipher = encryptor(key, iv)?;
    check_aligned("plaintext", plaintext)?;
    Ok(cipher.encrypt_padded_vec_mut::<NoPadding>(plaintext))
}

pub fn decrypt_fixed(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> KeywardResult<Vec<u8>> {
    let cipher = decryptor(key, iv)?;
    check_aligned("ciphertext", ciphertext)?;
    cipher
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| KeywardError::WrongPasswordOrCorruptData)
}

fn check_aligned(what: &'static str, data: &[u8]) -> KeywardResult<()> {
    if data.len() % BLOCK_SIZE != 0 {
        let expected = data.len().next_multiple_of(BLOCK_SIZE);
        return Err(KeywardError::length(what, expected, data.len()));
    }
    Ok(())
}
