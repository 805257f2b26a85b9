//! Whole-file persistence for containers, written atomically via temp+rename.
//!
//! There is no locking: two processes storing the same container race and
//! the last rename wins.

use anyhow::Context;
use keyward_core::KeywardResult;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ContainerFile {
    path: PathBuf,
}

impl ContainerFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Entire file contents. A missing file reads as empty, which the store
    /// treats as a fresh vault.
    pub fn read(&self) -> KeywardResult<Vec<u8>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "container does not exist yet");
                Ok(Vec::new())
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("reading container: {}", self.path.display()))
                .into()),
        }
    }

    pub fn write(&self, bytes: &[u8]) -> KeywardResult<()> {
        atomic_write(&self.path, bytes)
    }
}

/// Write `bytes` to a sibling temp file, restrict it to the owner, then
/// rename it over `path`.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> KeywardResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating container dir: {}", parent.display()))?;
        }
    }

    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, bytes)
        .with_context(|| format!("writing container temp: {}", tmp_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("restricting permissions: {}", tmp_path.display()))?;
    }

    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming container: {}", path.display()))?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "container written");
    Ok(())
}
