use std::path::{Path, PathBuf};

use threatwatch_types::{EngineError, Result};

use crate::traits::PreferenceStore;

/// File-based preference store with atomic writes. Each key lives in its
/// own JSON document inside the state directory.
pub struct FilePreferenceStore {
    dir: PathBuf,
}

impl FilePreferenceStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.to_path_buf(),
        }
    }

    /// Default state directory: `~/.threatwatch/` or `$THREATWATCH_STATE_DIR`.
    pub fn default_state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("THREATWATCH_STATE_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".threatwatch")
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| EngineError::Storage(format!("failed to read {}: {e}", path.display())))
    }

    /// Write via `.tmp` → rename so a crash never leaves a torn document.
    fn put_raw(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| EngineError::Storage(format!("failed to create state dir: {e}")))?;
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, value)
            .map_err(|e| EngineError::Storage(format!("failed to write temp file: {e}")))?;
        std::fs::rename(&tmp_path, &path)
            .map_err(|e| EngineError::Storage(format!("failed to rename temp file: {e}")))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| EngineError::Storage(format!("failed to remove {}: {e}", path.display())))?;
        }
        Ok(())
    }
}
