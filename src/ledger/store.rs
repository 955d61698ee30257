use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use super::LedgerSnapshot;

/// Where ledger snapshots live between runs.
pub trait LedgerStore: Send + Sync {
    fn load(&self) -> anyhow::Result<Option<LedgerSnapshot>>;
    fn save(&self, snapshot: &LedgerSnapshot) -> anyhow::Result<()>;
}

/// JSON file store. Writes go to a temp file that is renamed into place, and
/// the previous snapshot is kept next to it with a `.backup` suffix.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.sibling(".backup")
    }
}

impl LedgerStore for JsonFileStore {
    fn load(&self) -> anyhow::Result<Option<LedgerSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("reading ledger snapshot {}", self.path.display()))?;
        let snapshot = serde_json::from_str(&raw)
            .with_context(|| format!("parsing ledger snapshot {}", self.path.display()))?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &LedgerSnapshot) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating state directory {}", dir.display()))?;
        }
        if self.path.exists() {
            fs::copy(&self.path, self.backup_path()).context("backing up previous snapshot")?;
        }

        let tmp = self.sibling(".tmp");
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("moving snapshot into {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::models::{Token, TradingMode};

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("ledger.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_load_and_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state").join("ledger.json"));
        let ledger = Ledger::new(TradingMode::Paper, &Token::new("USDC", "0xq", 6), 1_000_000, 1_000);

        let first = ledger.snapshot();
        store.save(&first).unwrap();
        assert!(!store.backup_path().exists());

        let second = ledger.snapshot();
        store.save(&second).unwrap();
        assert!(store.backup_path().exists());

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, second);
        let restored = Ledger::restore(loaded).unwrap();
        assert_eq!(restored.mode(), TradingMode::Paper);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, "{not json").unwrap();
        assert!(JsonFileStore::new(path).load().is_err());
    }
}
