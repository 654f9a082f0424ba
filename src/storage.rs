use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::FlagStoreError;

/// Key of the flag that makes the form open straight on the thank-you view.
pub const SHOW_THANKS_KEY: &str = "show_thx";

/// Durable boolean flags that outlive a form session.
pub trait FlagStore: Send + Sync {
    fn get(&self, key: &str) -> Result<bool, FlagStoreError>;
    fn set(&self, key: &str, value: bool) -> Result<(), FlagStoreError>;
}

/// Flags kept as one JSON object in a file. A missing file reads as all
/// flags unset.
#[derive(Debug)]
pub struct FileFlagStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileFlagStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, bool>, FlagStoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl FlagStore for FileFlagStore {
    fn get(&self, key: &str) -> Result<bool, FlagStoreError> {
        Ok(self.load()?.get(key).copied().unwrap_or(false))
    }

    fn set(&self, key: &str, value: bool) -> Result<(), FlagStoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut flags = self.load()?;
        flags.insert(key.to_string(), value);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&flags)?)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryFlagStore {
    flags: Mutex<BTreeMap<String, bool>>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlagStore for MemoryFlagStore {
    fn get(&self, key: &str) -> Result<bool, FlagStoreError> {
        let flags = self.flags.lock().unwrap_or_else(|e| e.into_inner());
        Ok(flags.get(key).copied().unwrap_or(false))
    }

    fn set(&self, key: &str, value: bool) -> Result<(), FlagStoreError> {
        let mut flags = self.flags.lock().unwrap_or_else(|e| e.into_inner());
        flags.insert(key.to_string(), value);
        Ok(())
    }
}
