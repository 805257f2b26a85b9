use thiserror::Error;

pub type KeywardResult<T> = Result<T, KeywardError>;

#[derive(Debug, Error)]
pub enum KeywardError {
    /// Decryption or decompression produced nothing usable. A wrong master
    /// password and a corrupted container look identical from here.
    #[error("wrong password or corrupt data")]
    WrongPasswordOrCorruptData,

    #[error("unsupported data format version: {0:#04x}")]
    FormatVersion(u8),

    #[error("vault conflict: the remote data was created with a different master secret")]
    VaultConflict,

    /// An operation needed key material that has not been derived yet.
    #[error("vault is locked: {0}")]
    Locked(&'static str),

    #[error("malformed date: {0:?}")]
    MalformedDate(String),

    #[error("invalid {what} length: expected {expected} bytes, got {actual}")]
    InvalidSaltOrKeyLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for KeywardError {
    fn from(e: serde_json::Error) -> Self {
        KeywardError::Serialization(e.to_string())
    }
}

impl KeywardError {
    /// Shorthand for a length check failure on cryptographic material.
    pub fn length(what: &'static str, expected: usize, actual: usize) -> Self {
        KeywardError::InvalidSaltOrKeyLength {
            what,
            expected,
            actual,
        }
    }
}
