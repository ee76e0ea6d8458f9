//! Persisted wallet record and storage backends
//!
//! A wallet instance persists exactly one record: the public address plus
//! the encrypted private-key envelope. The record is never mutated in
//! place; create/import writes a whole new one, disconnect deletes it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// The on-disk wallet representation. Contains no secrets beyond the
/// envelope, which is useless without the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedWalletRecord {
    /// Checksummed public address, kept for display and balance lookups
    pub address: String,
    /// Base64 cipher envelope wrapping the private key hex
    pub encrypted_private_key: String,
}

/// Storage backend for the single wallet record
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Read the record, or `None` if no wallet has been persisted
    async fn load(&self) -> Result<Option<EncryptedWalletRecord>>;

    /// Write the record, replacing any existing one
    async fn save(&self, record: &EncryptedWalletRecord) -> Result<()>;

    /// Remove the record. Removing a nonexistent record is a no-op.
    async fn delete(&self) -> Result<()>;
}

/// JSON-file-backed store. Writes go through a temp file and an atomic
/// rename; on Unix the file is created `0600` and a group- or
/// world-readable record is refused at load time.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(unix)]
    fn check_permissions(&self, metadata: &std::fs::Metadata) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(Error::Storage(format!(
                "wallet record {} has insecure permissions {:o}; run 'chmod 600' on it",
                self.path.display(),
                mode & 0o777
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl WalletStore for FileStore {
    async fn load(&self) -> Result<Option<EncryptedWalletRecord>> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        #[cfg(unix)]
        self.check_permissions(&metadata)?;
        #[cfg(not(unix))]
        let _ = metadata;

        let bytes = tokio::fs::read(&self.path).await?;
        let record = serde_json::from_slice(&bytes)?;
        debug!(path = %self.path.display(), "loaded wallet record");
        Ok(Some(record))
    }

    async fn save(&self, record: &EncryptedWalletRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let bytes = serde_json::to_vec_pretty(record)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }
        tokio::fs::rename(&tmp, &self.path).await?;
        info!(path = %self.path.display(), "wallet record saved");
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "wallet record deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests and ephemeral embedding
#[derive(Default)]
pub struct MemoryStore {
    record: Mutex<Option<EncryptedWalletRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletStore for MemoryStore {
    async fn load(&self) -> Result<Option<EncryptedWalletRecord>> {
        Ok(self.record.lock().await.clone())
    }

    async fn save(&self, record: &EncryptedWalletRecord) -> Result<()> {
        *self.record.lock().await = Some(record.clone());
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        *self.record.lock().await = None;
        Ok(())
    }
}
