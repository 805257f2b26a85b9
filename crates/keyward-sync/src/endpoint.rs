//! Sync server settings stored inside the local container.

use keyward_core::KeywardResult;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::packer::{pack, unpack};

/// Address, credentials and pinned certificate of the sync server.
#[derive(Clone)]
pub struct SyncEndpoint {
    /// Base URL with scheme
    pub server_address: String,
    pub username: String,
    pub password: SecretString,
    /// PEM certificate the server must present
    pub certificate: String,
}

#[derive(Serialize, Deserialize)]
struct EndpointWire {
    #[serde(rename = "server-address")]
    server_address: String,
    username: String,
    password: String,
    certificate: String,
}

impl Drop for EndpointWire {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

impl SyncEndpoint {
    /// Packed JSON sub-block.
    pub fn to_block(&self) -> KeywardResult<Vec<u8>> {
        let wire = EndpointWire {
            server_address: self.server_address.clone(),
            username: self.username.clone(),
            password: self.password.expose_secret().to_string(),
            certificate: self.certificate.clone(),
        };
        let mut json = serde_json::to_vec(&wire)?;
        let block = pack(&json);
        json.zeroize();
        block
    }

    /// Parse a sub-block written by [`SyncEndpoint::to_block`]. An empty block
    /// means no endpoint is configured.
    pub fn from_block(block: &[u8]) -> KeywardResult<Option<Self>> {
        if block.is_empty() {
            return Ok(None);
        }
        let mut json = unpack(block)?;
        let parsed = serde_json::from_slice::<EndpointWire>(&json);
        json.zeroize();
        match parsed {
            Ok(wire) => Ok(Some(SyncEndpoint {
                server_address: wire.server_address.clone(),
                username: wire.username.clone(),
                password: SecretString::from(wire.password.clone()),
                certificate: wire.certificate.clone(),
            })),
            Err(e) => {
                tracing::warn!("ignoring incomplete sync settings: {e}");
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for SyncEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEndpoint")
            .field("server_address", &self.server_address)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("certificate_len", &self.certificate.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> SyncEndpoint {
        SyncEndpoint {
            server_address: "https://sync.example.com/keyward/".into(),
            username: "alice".into(),
            password: SecretString::from("s3cret"),
            certificate: "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----".into(),
        }
    }

    #[test]
    fn test_block_roundtrip() {
        let block = endpoint().to_block().unwrap();
        let parsed = SyncEndpoint::from_block(&block).unwrap().unwrap();

        assert_eq!(parsed.server_address, "https://sync.example.com/keyward/");
        assert_eq!(parsed.username, "alice");
        assert_eq!(parsed.password.expose_secret(), "s3cret");
        assert!(parsed.certificate.starts_with("-----BEGIN"));
    }

    #[test]
    fn test_wire_keys() {
        let block = endpoint().to_block().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&unpack(&block).unwrap()).unwrap();
        assert_eq!(json["server-address"], "https://sync.example.com/keyward/");
        assert!(json.get("certificate").is_some());
    }

    #[test]
    fn test_empty_block_is_none() {
        assert!(SyncEndpoint::from_block(&[]).unwrap().is_none());
    }

    #[test]
    fn test_missing_keys_is_none() {
        let block = pack(br#"{"server-address": "https://x"}"#).unwrap();
        assert!(SyncEndpoint::from_block(&block).unwrap().is_none());
    }

    #[test]
    fn test_debug_redacts_password() {
        assert!(!format!("{:?}", endpoint()).contains("s3cret"));
    }
}
