//! File storage for the JSON snapshot and the rendered interface config
//!
//! Writes go through a temp file in the same directory followed by a rename,
//! so a crash mid-write never leaves a truncated snapshot behind. The temp
//! file is created owner-only and is removed if the write does not complete.

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use wgdesk_common::Result;

/// Owner read/write only
pub const PRIVATE_MODE: u32 = 0o600;

/// Named-file storage with explicit permission bits
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a file; `None` when it does not exist
    async fn read(&self, name: &str) -> Result<Option<String>>;

    /// Replace a file's contents and set its mode
    async fn write(&self, name: &str, contents: &str, mode: u32) -> Result<()>;
}

/// Storage rooted at a directory on disk
#[derive(Debug, Clone)]
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

#[async_trait]
impl Storage for DirStorage {
    async fn read(&self, name: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path(name)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, name: &str, contents: &str, mode: u32) -> Result<()> {
        fs::create_dir_all(&self.root).await?;

        let root = self.root.clone();
        let path = self.path(name);
        let target = path.clone();
        let data = contents.as_bytes().to_vec();
        tokio::task::spawn_blocking(move || replace_file(&root, &target, &data, mode))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;

        debug!("Wrote {:?} ({} bytes, mode {:o})", path, contents.len(), mode);
        Ok(())
    }
}

/// Write `data` to a fresh temp file in `root` and rename it over `path`.
///
/// `NamedTempFile` creates the file with mode 0600 and deletes it on drop,
/// which covers every early return below.
fn replace_file(root: &Path, path: &Path, data: &[u8], mode: u32) -> Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".wgdesk-")
        .suffix(".tmp")
        .tempfile_in(root)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    set_mode(tmp.path(), mode)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
