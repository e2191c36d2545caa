// On-disk resource cache laid out as <root>/<subfolder>/<filename>.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::fs;
use tracing::debug;

use crate::config::{ORIGINALS_SUBFOLDER, THUMBNAILS_SUBFOLDER};
use crate::error::CacheError;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Class of resource, one subfolder each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    Thumbnail,
    Original,
}

impl ResourceClass {
    pub fn subfolder(self) -> &'static str {
        match self {
            ResourceClass::Thumbnail => THUMBNAILS_SUBFOLDER,
            ResourceClass::Original => ORIGINALS_SUBFOLDER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub subfolder: String,
    pub filename: String,
}

impl CacheKey {
    pub fn new(subfolder: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            subfolder: subfolder.into(),
            filename: filename.into(),
        }
    }

    pub fn for_class(class: ResourceClass, filename: impl Into<String>) -> Self {
        Self::new(class.subfolder(), filename)
    }

    fn validate(&self) -> Result<(), CacheError> {
        check_segment(&self.subfolder)?;
        check_segment(&self.filename)
    }
}

/// Each key part must be exactly one normal path component.
fn check_segment(segment: &str) -> Result<(), CacheError> {
    let bad = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\\')
        || segment.contains('\0');
    if bad {
        return Err(CacheError::InvalidKey(segment.to_string()));
    }
    Ok(())
}

/// Blob store keyed by `(subfolder, filename)`.
///
/// All operations go through `tokio::fs`, so callers never block on disk I/O.
/// Writes land in a temp file first and are renamed into place; a reader sees
/// either the old file, the new file, or nothing.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic on-disk location of `key`.
    pub fn path_for(&self, key: &CacheKey) -> Result<PathBuf, CacheError> {
        key.validate()?;
        Ok(self.root.join(&key.subfolder).join(&key.filename))
    }

    /// Create `<root>/<subfolder>` if absent. Succeeds when it already exists.
    pub async fn ensure_directory(&self, subfolder: &str) -> Result<PathBuf, CacheError> {
        check_segment(subfolder)?;
        let dir = self.root.join(subfolder);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| CacheError::io(&dir, e))?;
        Ok(dir)
    }

    /// True only when a regular file is stored under `key`.
    pub async fn exists(&self, key: &CacheKey) -> bool {
        let Ok(path) = self.path_for(key) else {
            return false;
        };
        matches!(fs::metadata(&path).await, Ok(meta) if meta.is_file())
    }

    pub async fn read(&self, key: &CacheKey) -> Result<Bytes, CacheError> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CacheError::NotFound(path)),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Atomically replace the blob stored under `key`.
    pub async fn write(&self, key: &CacheKey, data: &[u8]) -> Result<(), CacheError> {
        let path = self.path_for(key)?;
        let dir = self.ensure_directory(&key.subfolder).await?;

        let tmp = dir.join(format!(
            ".{}.{}-{}.tmp",
            key.filename,
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(e) = fs::write(&tmp, data).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(CacheError::io(&tmp, e));
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(CacheError::io(&path, e));
        }

        debug!("cached {} bytes at {}", data.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_layout() {
        let store = CacheStore::new("/var/cache/pl");
        let key = CacheKey::for_class(ResourceClass::Thumbnail, "42.jpg");
        assert_eq!(
            store.path_for(&key).unwrap(),
            PathBuf::from("/var/cache/pl/thumbnails/42.jpg")
        );
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let store = CacheStore::new("/var/cache/pl");
        for key in [
            CacheKey::new("..", "a.jpg"),
            CacheKey::new("thumbnails", "../a.jpg"),
            CacheKey::new("thumbnails", ""),
            CacheKey::new("a/b", "c.jpg"),
        ] {
            assert!(matches!(
                store.path_for(&key),
                Err(CacheError::InvalidKey(_))
            ));
        }
    }

    #[test]
    fn test_class_subfolders() {
        assert_eq!(ResourceClass::Thumbnail.subfolder(), "thumbnails");
        assert_eq!(ResourceClass::Original.subfolder(), "originals");
    }
}
