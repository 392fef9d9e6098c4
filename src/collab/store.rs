use std::{
    collections::HashMap,
    fs::{self, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, warn};

use crate::{common::error::HelperError, trade::TradeEntry};

/// Trade history persistence. Called from the persister thread, never from
/// async tasks.
pub trait TradeStore: Send + Sync {
    fn save(&self, entry: &TradeEntry) -> Result<(), HelperError>;
    fn load(&self) -> Result<Vec<TradeEntry>, HelperError>;
}

/// JSON lines file. Every save appends the entry's current state. Loading
/// keeps the last record per trade ID and rewrites the file down to those
/// records when it holds superseded or unreadable lines.
pub struct JsonLinesTradeStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesTradeStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TradeStore for JsonLinesTradeStore {
    fn save(&self, entry: &TradeEntry) -> Result<(), HelperError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self
            .write_lock
            .lock()
            .map_err(|error| {
                HelperError::Simple(format!("Trade store lock poisoned - {}", error))
            })?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn load(&self) -> Result<Vec<TradeEntry>, HelperError> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No trade history yet");
                return Ok(Vec::new());
            }
            Err(error) => return Err(error.into()),
        };

        let mut latest: HashMap<_, TradeEntry> = HashMap::new();
        let mut records = 0;
        for (line_number, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records += 1;
            match serde_json::from_str::<TradeEntry>(&line) {
                Ok(entry) => {
                    latest.insert(entry.id, entry);
                }
                Err(error) => warn!(
                    path = %self.path.display(),
                    line = line_number + 1,
                    "Skipping unreadable trade history record - {}",
                    error
                ),
            }
        }

        let mut entries: Vec<TradeEntry> = latest.into_values().collect();
        entries.sort_by_key(|entry| entry.received_at);
        if records > entries.len() {
            self.compact(&entries)?;
        }
        Ok(entries)
    }
}

impl JsonLinesTradeStore {
    // Written beside the history file then renamed over it
    fn compact(&self, entries: &[TradeEntry]) -> Result<(), HelperError> {
        let mut text = String::new();
        for entry in entries {
            text.push_str(&serde_json::to_string(entry)?);
            text.push('\n');
        }

        let _guard = self
            .write_lock
            .lock()
            .map_err(|error| {
                HelperError::Simple(format!("Trade store lock poisoned - {}", error))
            })?;

        let mut staging = self.path.clone().into_os_string();
        staging.push(".compact");
        let staging = PathBuf::from(staging);
        fs::write(&staging, text.as_bytes())?;
        fs::rename(&staging, &self.path)?;
        debug!(
            path = %self.path.display(),
            records = entries.len(),
            "Trade history compacted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SomeTestParams;
    use crate::trade::TradeState;

    #[test]
    fn test_load_keeps_last_record_per_trade() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLinesTradeStore::new(dir.path().join("history").join("trades.jsonl"));
        assert!(store.load().unwrap().is_empty());

        let mut entry = SomeTestParams::trade_entry("Buyer", "Tabula Rasa");
        store.save(&entry).unwrap();
        entry.state = TradeState::Active;
        store.save(&entry).unwrap();
        let other = SomeTestParams::trade_entry("Other", "Goldrim");
        store.save(&other).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        let reloaded = loaded.iter().find(|e| e.id == entry.id).unwrap();
        assert_eq!(reloaded.state, TradeState::Active);
    }

    #[test]
    fn test_load_skips_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.jsonl");
        let store = JsonLinesTradeStore::new(&path);
        store
            .save(&SomeTestParams::trade_entry("Buyer", "Goldrim"))
            .unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{not json\n").unwrap();

        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn test_load_rewrites_history_to_latest_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.jsonl");
        let store = JsonLinesTradeStore::new(&path);

        let mut entry = SomeTestParams::trade_entry("Buyer", "Tabula Rasa");
        store.save(&entry).unwrap();
        entry.state = TradeState::Active;
        store.save(&entry).unwrap();
        entry.state = TradeState::Completed;
        store.save(&entry).unwrap();
        let other = SomeTestParams::trade_entry("Other", "Goldrim");
        store.save(&other).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 4);

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
        assert!(!dir.path().join("trades.jsonl.compact").exists());

        // Compacted file loads the same records
        assert_eq!(store.load().unwrap().len(), 2);
        let reloaded = loaded.iter().find(|e| e.id == entry.id).unwrap();
        assert_eq!(reloaded.state, TradeState::Completed);

        store.save(&other).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 3);
    }
}
