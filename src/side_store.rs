use anyhow::{Context, Result};
use ini::Ini;
use std::{
    path::PathBuf,
    sync::Mutex,
};

const SECTION: &str = "state";

/// String-keyed persistent store for bits of UI state that must survive
/// restarts, currently just the DNS-override toggle. Writes go straight
/// through to disk.
pub struct SideStore {
    path: PathBuf,
    ini: Mutex<Ini>,
}

impl SideStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let ini = if path.exists() {
            Ini::load_from_file(&path)
                .with_context(|| format!("failed to load side store {}", path.display()))?
        } else {
            Ini::new()
        };

        Ok(Self {
            path,
            ini: Mutex::new(ini),
        })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.ini
            .lock()
            .unwrap()
            .get_from(Some(SECTION), key)
            .map(str::to_string)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut ini = self.ini.lock().unwrap();
        ini.with_section(Some(SECTION)).set(key, value);
        ini.write_to_file(&self.path)
            .with_context(|| format!("failed to write side store {}", self.path.display()))
    }
}
