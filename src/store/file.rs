//! FileBackend - one file per record under `<root>/<app>/data`

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{StorageBackend, StoreError};
use crate::core::paths;

#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }

    /// Backend for `app` under `root`, falling back to `$BEECONNECT_ROOT`
    /// and then the platform data directory.
    pub fn for_app(app: &str, root: Option<&Path>) -> Self {
        let root = root.map(Path::to_path_buf).unwrap_or_else(default_root);
        Self::new(root.join(app).join(paths::store::DATA_DIR))
    }

    pub fn dir(&self) -> &Path { &self.dir }

    pub fn item_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{}", paths::store::EXTENSION))
    }
}

pub(crate) fn default_root() -> PathBuf {
    std::env::var(paths::env::ROOT)
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
}

impl StorageBackend for FileBackend {
    fn get_item(&self, name: &str) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(self.item_path(name)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, name: &str, value: &str) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.item_path(name);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove_item(&self, name: &str) -> Result<(), StoreError> {
        match std::fs::remove_file(self.item_path(name)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
