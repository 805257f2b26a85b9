//! Remote blob store contract.
//!
//! A transport moves one opaque base64 export blob. Calls block; there is no
//! timeout, retry or cancellation at this level.

use keyward_core::{KeywardError, KeywardResult};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::file::atomic_write;

pub trait SyncTransport: Send + Sync {
    /// Current remote blob, or `None` if the remote holds nothing yet.
    fn pull(&self) -> KeywardResult<Option<String>>;

    /// Replace the remote blob. Returns whether the remote accepted it.
    fn push(&self, blob: &str) -> KeywardResult<bool>;
}

// ── In-memory ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MemoryRemote {
    blob: Option<String>,
    offline: bool,
    pushes: usize,
}

/// Shared in-process remote. Clones talk to the same blob, so two stores
/// holding clones behave like two machines syncing through one server.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<MemoryRemote>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> KeywardResult<std::sync::MutexGuard<'_, MemoryRemote>> {
        self.inner
            .lock()
            .map_err(|_| KeywardError::Transport("memory remote lock poisoned".into()))
    }

    /// Simulate a network outage: pulls and pushes fail until reset.
    pub fn set_offline(&self, offline: bool) -> KeywardResult<()> {
        self.lock()?.offline = offline;
        Ok(())
    }

    pub fn blob(&self) -> KeywardResult<Option<String>> {
        Ok(self.lock()?.blob.clone())
    }

    pub fn set_blob(&self, blob: impl Into<String>) -> KeywardResult<()> {
        self.lock()?.blob = Some(blob.into());
        Ok(())
    }

    pub fn push_count(&self) -> KeywardResult<usize> {
        Ok(self.lock()?.pushes)
    }
}

impl SyncTransport for MemoryTransport {
    fn pull(&self) -> KeywardResult<Option<String>> {
        let remote = self.lock()?;
        if remote.offline {
            return Err(KeywardError::Transport("remote unreachable".into()));
        }
        Ok(remote.blob.clone())
    }

    fn push(&self, blob: &str) -> KeywardResult<bool> {
        let mut remote = self.lock()?;
        if remote.offline {
            return Err(KeywardError::Transport("remote unreachable".into()));
        }
        remote.blob = Some(blob.to_string());
        remote.pushes += 1;
        Ok(true)
    }
}

// ── File ──────────────────────────────────────────────────────────────────────

/// Remote kept as a single file, e.g. in a directory shared between machines.
#[derive(Debug, Clone)]
pub struct FileTransport {
    path: PathBuf,
}

impl FileTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Accepts `file:///abs/path` or a bare path.
    pub fn from_address(address: &str) -> Self {
        Self::new(address.strip_prefix("file://").unwrap_or(address))
    }
}

impl SyncTransport for FileTransport {
    fn pull(&self) -> KeywardResult<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(blob) if blob.trim().is_empty() => Ok(None),
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KeywardError::Transport(format!(
                "reading {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn push(&self, blob: &str) -> KeywardResult<bool> {
        atomic_write(&self.path, blob.as_bytes())?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_clones_share_remote() {
        let a = MemoryTransport::new();
        let b = a.clone();

        assert_eq!(a.pull().unwrap(), None);
        assert!(b.push("blob").unwrap());
        assert_eq!(a.pull().unwrap().as_deref(), Some("blob"));
        assert_eq!(a.push_count().unwrap(), 1);
    }

    #[test]
    fn test_memory_offline() {
        let t = MemoryTransport::new();
        t.set_offline(true).unwrap();
        assert!(matches!(t.pull(), Err(KeywardError::Transport(_))));
        assert!(t.push("x").is_err());
    }

    #[test]
    fn test_file_transport_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let address = format!("file://{}", tmp.path().join("remote.blob").display());
        let t = FileTransport::from_address(&address);

        assert_eq!(t.pull().unwrap(), None);
        assert!(t.push("AQID").unwrap());
        assert_eq!(t.pull().unwrap().as_deref(), Some("AQID"));
    }
}
