// Favourite flags per photo id, injected wherever they are needed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::warn;

pub trait FavouritesStore: Send + Sync {
    fn is_favourite(&self, id: u64) -> bool;
    fn set_favourite(&self, id: u64, favourite: bool) -> Result<()>;
}

fn flag_key(id: u64) -> String {
    format!("image-{id}")
}

#[derive(Default)]
pub struct MemoryFavourites {
    flags: Mutex<HashMap<String, bool>>,
}

impl FavouritesStore for MemoryFavourites {
    fn is_favourite(&self, id: u64) -> bool {
        self.flags.lock().get(&flag_key(id)).copied().unwrap_or(false)
    }

    fn set_favourite(&self, id: u64, favourite: bool) -> Result<()> {
        self.flags.lock().insert(flag_key(id), favourite);
        Ok(())
    }
}

/// JSON map of `image-<id>` → bool, rewritten on every change.
pub struct FileFavourites {
    path: PathBuf,
    flags: Mutex<HashMap<String, bool>>,
}

impl FileFavourites {
    /// Open `path`, starting empty if it does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let flags = match std::fs::read(&path) {
            Ok(data) => serde_json::from_slice(&data)
                .with_context(|| format!("parsing favourites {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("reading favourites {}", path.display()))
            }
        };
        Ok(Self {
            path,
            flags: Mutex::new(flags),
        })
    }

    fn persist(&self, flags: &HashMap<String, bool>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(flags)?;
        std::fs::write(&self.path, data)
            .with_context(|| format!("writing favourites {}", self.path.display()))
    }
}

impl FavouritesStore for FileFavourites {
    fn is_favourite(&self, id: u64) -> bool {
        self.flags.lock().get(&flag_key(id)).copied().unwrap_or(false)
    }

    fn set_favourite(&self, id: u64, favourite: bool) -> Result<()> {
        let mut flags = self.flags.lock();
        let mut updated = flags.clone();
        updated.insert(flag_key(id), favourite);
        if let Err(e) = self.persist(&updated) {
            warn!("favourites not saved: {:#}", e);
            return Err(e);
        }
        *flags = updated;
        Ok(())
    }
}
