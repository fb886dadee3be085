//! The on-disk component-library catalogue.
//!
//! A JSON registry of known libraries: where to download them, whether they
//! are installed, and where they live locally. The numerics core only ever
//! reads `library_path` to find component data; everything else is
//! bookkeeping for the catalogue manager.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use const_format::concatcp;
use log::info;
use serde::{Deserialize, Serialize};

use crate::basic::error::SimError;

pub const DEFAULT_LIBRARY: &str = "ebeam";
pub const DEFAULT_LIBRARY_VERSION: &str = "0.3.34";
pub const DEFAULT_LIBRARY_URL: &str = concatcp!(
    "https://github.com/jaspreetj/opics_ebeam/archive/refs/tags/",
    DEFAULT_LIBRARY_VERSION,
    ".zip"
);

/// One registered component library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    pub dl_link: String,
    pub installed: bool,
    pub library_path: Option<PathBuf>,
    pub version: String,
}

/// The library registry, keyed by library name.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Catalogue {
    entries: BTreeMap<String, LibraryEntry>,
}

impl Catalogue {
    /// A catalogue seeded with the stock `ebeam` entry.
    pub fn with_defaults() -> Self {
        let mut cat = Self::default();
        cat.entries.insert(
            DEFAULT_LIBRARY.to_owned(),
            LibraryEntry {
                name: DEFAULT_LIBRARY.to_owned(),
                dl_link: DEFAULT_LIBRARY_URL.to_owned(),
                installed: false,
                library_path: None,
                version: DEFAULT_LIBRARY_VERSION.to_owned(),
            },
        );
        cat
    }

    /// Load a registry file; a missing file yields the seeded default.
    pub fn load_or_default(path: &Path) -> Result<Self, SimError> {
        if !path.exists() {
            info!("no catalogue at '{}', using defaults", path.display());
            return Ok(Self::with_defaults());
        }
        let text = fs::read_to_string(path)
            .map_err(|e| SimError::DataError(format!("cannot read '{}': {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| SimError::DataError(format!("bad catalogue '{}': {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<(), SimError> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| SimError::DataError(e.to_string()))?;
        fs::write(path, text)
            .map_err(|e| SimError::DataError(format!("cannot write '{}': {}", path.display(), e)))
    }

    pub fn add(&mut self, entry: LibraryEntry) -> Result<(), SimError> {
        if self.entries.contains_key(&entry.name) {
            return Err(SimError::DuplicateId(entry.name));
        }
        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<LibraryEntry, SimError> {
        self.entries
            .remove(name)
            .ok_or_else(|| SimError::DataError(format!("library '{}' not in catalogue", name)))
    }

    pub fn get(&self, name: &str) -> Option<&LibraryEntry> {
        self.entries.get(name)
    }

    /// Flag a library as present at `path`.
    pub fn mark_installed(&mut self, name: &str, path: PathBuf) -> Result<(), SimError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| SimError::DataError(format!("library '{}' not in catalogue", name)))?;
        entry.installed = true;
        entry.library_path = Some(path);
        Ok(())
    }

    /// Local data folder of an installed library.
    pub fn library_path(&self, name: &str) -> Option<&Path> {
        self.entries
            .get(name)
            .filter(|e| e.installed)
            .and_then(|e| e.library_path.as_deref())
    }

    pub fn installed(&self) -> impl Iterator<Item = &LibraryEntry> {
        self.entries.values().filter(|e| e.installed)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LibraryEntry> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_the_stock_library() {
        let cat = Catalogue::with_defaults();
        let ebeam = cat.get(DEFAULT_LIBRARY).unwrap();
        assert!(!ebeam.installed);
        assert!(ebeam.dl_link.ends_with("0.3.34.zip"));
        assert_eq!(cat.installed().count(), 0);
        assert!(cat.library_path(DEFAULT_LIBRARY).is_none());
    }

    #[test]
    fn add_remove_and_install() {
        let mut cat = Catalogue::with_defaults();
        cat.add(LibraryEntry {
            name: "custom".into(),
            dl_link: "https://example.com/custom.zip".into(),
            installed: false,
            library_path: None,
            version: "0.1.0".into(),
        })
        .unwrap();
        assert!(matches!(
            cat.add(LibraryEntry {
                name: "custom".into(),
                dl_link: String::new(),
                installed: false,
                library_path: None,
                version: String::new(),
            }),
            Err(SimError::DuplicateId(_))
        ));

        cat.mark_installed("custom", PathBuf::from("/opt/libs/custom"))
            .unwrap();
        assert_eq!(
            cat.library_path("custom"),
            Some(Path::new("/opt/libs/custom"))
        );
        assert_eq!(cat.installed().count(), 1);

        let removed = cat.remove("custom").unwrap();
        assert_eq!(removed.version, "0.1.0");
        assert!(cat.remove("custom").is_err());
    }

    #[test]
    fn registry_round_trips_through_disk() {
        let mut cat = Catalogue::with_defaults();
        cat.mark_installed(DEFAULT_LIBRARY, PathBuf::from("/tmp/ebeam"))
            .unwrap();
        let path = std::env::temp_dir()
            .join(format!("photonflow_cat_{}.json", std::process::id()));
        cat.save(&path).unwrap();
        let loaded = Catalogue::load_or_default(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(
            loaded.library_path(DEFAULT_LIBRARY),
            Some(Path::new("/tmp/ebeam"))
        );

        let missing = std::env::temp_dir().join("photonflow_cat_missing.json");
        let fresh = Catalogue::load_or_default(&missing).unwrap();
        assert!(fresh.get(DEFAULT_LIBRARY).is_some());
    }
}
