#![forbid(unsafe_code)]

use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const META_FILE: &str = "meta.json";
const SNAPSHOT_FILE: &str = "snapshot.pf";

/// What the remote says about its copy, read before any snapshot transfer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMeta {
    pub last_update_ms: u64,
    pub model_version: f64,
}

/// The other side of a sync. Implementations own their transport; the engine only sees
/// sealed envelope text and the meta record.
pub trait RemoteTarget {
    fn read_meta(&self) -> Result<Option<RemoteMeta>, StoreError>;
    fn read_snapshot(&self) -> Result<Option<String>, StoreError>;
    /// Writes the snapshot first, then the meta, so a reader never sees meta for a snapshot
    /// that is not there yet.
    fn write(&self, meta: &RemoteMeta, sealed: &str) -> Result<(), StoreError>;
}

/// A remote kept in a plain directory (a mounted share or a synced folder).
#[derive(Clone, Debug)]
pub struct LocalDirRemote {
    dir: PathBuf,
}

impl LocalDirRemote {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl RemoteTarget for LocalDirRemote {
    fn read_meta(&self) -> Result<Option<RemoteMeta>, StoreError> {
        let Some(text) = read_optional(&self.dir.join(META_FILE))? else {
            return Ok(None);
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|err| StoreError::Remote(format!("{META_FILE}: {err}")))
    }

    fn read_snapshot(&self) -> Result<Option<String>, StoreError> {
        read_optional(&self.dir.join(SNAPSHOT_FILE))
    }

    fn write(&self, meta: &RemoteMeta, sealed: &str) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        write_atomic(&self.dir.join(SNAPSHOT_FILE), sealed)?;
        write_atomic(&self.dir.join(META_FILE), &serde_json::to_string(meta)?)?;
        Ok(())
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(StoreError::Io(err)),
    }
}

fn write_atomic(path: &Path, text: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, text)?;
    std::fs::rename(tmp, path)
}
