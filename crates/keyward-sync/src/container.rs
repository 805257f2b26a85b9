//! Byte layouts of the local container and the export blob.
//!
//! Local container:
//! ```text
//! [0..32)    vault salt
//! [32..144)  wrapped master secret block
//! [144..)    AES-CBC(settings key, rotation IV,
//!                u32 BE L ‖ sync endpoint block (L) ‖ packed settings document)
//! ```
//!
//! Export blob (base64):
//! ```text
//! v1: 0x01 ‖ vault salt (32) ‖ wrapped block (112) ‖ AES-CBC(settings key, rotation IV, packed map)
//! v0: 0x00 ‖ salt (32) ‖ AES-CBC(legacy key, legacy IV, packed map)      read-only
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use keyward_core::types::{EntryRecord, RemoteRecord};
use keyward_core::{KeywardError, KeywardResult};
use keyward_crypto::{SALT_SIZE, WRAPPED_BLOCK_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::endpoint::SyncEndpoint;
use crate::packer::{pack, unpack};

/// Salt plus wrapped block.
pub const HEADER_SIZE: usize = SALT_SIZE + WRAPPED_BLOCK_SIZE;

/// Domain → record as received from a remote store, tombstones included.
pub type RemoteCollection = BTreeMap<String, RemoteRecord>;

// ── Local container ───────────────────────────────────────────────────────────

/// Borrowed view of a local container.
#[derive(Debug, Clone, Copy)]
pub struct LocalContainer<'a> {
    pub vault_salt: &'a [u8],
    pub wrapped_block: &'a [u8],
    pub encrypted_settings: &'a [u8],
}

impl<'a> LocalContainer<'a> {
    /// Split a container. Returns `None` for anything shorter than the
    /// header, which callers treat as an empty vault.
    pub fn split(bytes: &'a [u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            vault_salt: &bytes[..SALT_SIZE],
            wrapped_block: &bytes[SALT_SIZE..HEADER_SIZE],
            encrypted_settings: &bytes[HEADER_SIZE..],
        })
    }

    pub fn assemble(vault_salt: &[u8], wrapped_block: &[u8], encrypted_settings: &[u8]) -> KeywardResult<Vec<u8>> {
        if vault_salt.len() != SALT_SIZE {
            return Err(KeywardError::length("vault salt", SALT_SIZE, vault_salt.len()));
        }
        if wrapped_block.len() != WRAPPED_BLOCK_SIZE {
            return Err(KeywardError::length(
                "wrapped master secret block",
                WRAPPED_BLOCK_SIZE,
                wrapped_block.len(),
            ));
        }
        let mut out = Vec::with_capacity(HEADER_SIZE + encrypted_settings.len());
        out.extend_from_slice(vault_salt);
        out.extend_from_slice(wrapped_block);
        out.extend_from_slice(encrypted_settings);
        Ok(out)
    }
}

/// Decrypted settings document of the local container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsDocument {
    #[serde(default)]
    pub settings: BTreeMap<String, EntryRecord>,
    /// Domains that were in sync with the remote when stored
    #[serde(default)]
    pub synced: Vec<String>,
    /// Local deletions not yet acknowledged by the remote: domain → `mDate`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deleted: BTreeMap<String, String>,
}

/// Plaintext of the local container's encrypted section.
#[derive(Debug, Default)]
pub struct SettingsPayload {
    pub endpoint: Option<SyncEndpoint>,
    pub document: SettingsDocument,
}

impl SettingsPayload {
    pub fn encode(&self) -> KeywardResult<Vec<u8>> {
        let endpoint = match &self.endpoint {
            Some(endpoint) => endpoint.to_block()?,
            None => Vec::new(),
        };
        let endpoint_len = u32::try_from(endpoint.len())
            .map_err(|_| KeywardError::Serialization("sync settings too large".into()))?;
        let document = pack(&serde_json::to_vec(&self.document)?)?;

        let mut out = Vec::with_capacity(4 + endpoint.len() + document.len());
        out.extend_from_slice(&endpoint_len.to_be_bytes());
        out.extend_from_slice(&endpoint);
        out.extend_from_slice(&document);
        Ok(out)
    }

    pub fn decode(plain: &[u8]) -> KeywardResult<Self> {
        if plain.len() < 4 {
            return Err(KeywardError::WrongPasswordOrCorruptData);
        }
        let mut len = [0u8; 4];
        len.copy_from_slice(&plain[..4]);
        let endpoint_len = u32::from_be_bytes(len) as usize;
        let rest = &plain[4..];
        if rest.len() < endpoint_len {
            return Err(KeywardError::WrongPasswordOrCorruptData);
        }
        let (endpoint, document) = rest.split_at(endpoint_len);

        let document = unpack(document)?;
        if document.is_empty() {
            return Err(KeywardError::WrongPasswordOrCorruptData);
        }
        let document: SettingsDocument =
            serde_json::from_slice(&document).map_err(|_| KeywardError::WrongPasswordOrCorruptData)?;
        let endpoint = SyncEndpoint::from_block(endpoint)?;
        Ok(Self { endpoint, document })
    }
}

// ── Export blob ───────────────────────────────────────────────────────────────

pub const VERSION_LEGACY: u8 = 0x00;
pub const VERSION_CURRENT: u8 = 0x01;

/// Decoded export blob, one variant per format version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportBlob {
    /// Password-keyed, no master secret layer. Read-only.
    V0 { salt: Vec<u8>, ciphertext: Vec<u8> },
    V1 {
        vault_salt: Vec<u8>,
        wrapped_block: Vec<u8>,
        ciphertext: Vec<u8>,
    },
}

impl ExportBlob {
    pub fn version(&self) -> u8 {
        match self {
            ExportBlob::V0 { .. } => VERSION_LEGACY,
            ExportBlob::V1 { .. } => VERSION_CURRENT,
        }
    }

    pub fn decode(blob: &str) -> KeywardResult<Self> {
        let raw = STANDARD
            .decode(blob.trim())
            .map_err(|e| KeywardError::Serialization(format!("export blob is not base64: {e}")))?;
        Self::decode_bytes(&raw)
    }

    pub fn decode_bytes(raw: &[u8]) -> KeywardResult<Self> {
        let Some((&version, body)) = raw.split_first() else {
            return Err(KeywardError::WrongPasswordOrCorruptData);
        };
        match version {
            VERSION_LEGACY => {
                if body.len() < SALT_SIZE {
                    return Err(KeywardError::length("legacy export salt", SALT_SIZE, body.len()));
                }
                let (salt, ciphertext) = body.split_at(SALT_SIZE);
                Ok(ExportBlob::V0 {
                    salt: salt.to_vec(),
                    ciphertext: ciphertext.to_vec(),
                })
            }
            VERSION_CURRENT => {
                if body.len() < HEADER_SIZE {
                    return Err(KeywardError::length("export header", HEADER_SIZE, body.len()));
                }
                Ok(ExportBlob::V1 {
                    vault_salt: body[..SALT_SIZE].to_vec(),
                    wrapped_block: body[SALT_SIZE..HEADER_SIZE].to_vec(),
                    ciphertext: body[HEADER_SIZE..].to_vec(),
                })
            }
            other => Err(KeywardError::FormatVersion(other)),
        }
    }

    /// Base64 encoding. Only the current version is ever written.
    pub fn encode(&self) -> KeywardResult<String> {
        match self {
            ExportBlob::V0 { .. } => Err(KeywardError::FormatVersion(VERSION_LEGACY)),
            ExportBlob::V1 {
                vault_salt,
                wrapped_block,
                ciphertext,
            } => {
                let mut raw = Vec::with_capacity(1 + HEADER_SIZE + ciphertext.len());
                raw.push(VERSION_CURRENT);
                raw.extend_from_slice(vault_salt);
                raw.extend_from_slice(wrapped_block);
                raw.extend_from_slice(ciphertext);
                Ok(STANDARD.encode(raw))
            }
        }
    }
}

/// Packed JSON map of domain → record, tombstones included.
pub fn encode_collection(collection: &RemoteCollection) -> KeywardResult<Vec<u8>> {
    let map: BTreeMap<&str, EntryRecord> = collection
        .iter()
        .map(|(domain, record)| (domain.as_str(), record.clone().into_record()))
        .collect();
    pack(&serde_json::to_vec(&map)?)
}

pub fn decode_collection(packed: &[u8]) -> KeywardResult<RemoteCollection> {
    let json = unpack(packed)?;
    let map: BTreeMap<String, EntryRecord> =
        serde_json::from_slice(&json).map_err(|_| KeywardError::WrongPasswordOrCorruptData)?;
    Ok(map
        .into_iter()
        .map(|(domain, record)| (domain, RemoteRecord::from_record(record)))
        .collect())
}
