use std::path::{Path, PathBuf};

use sled::IVec;

use crate::quest::errors::QuestError;
use crate::quest::types::{PlayerRecord, PLAYER_SCHEMA_VERSION};

const TREE_PLAYERS: &str = "questline_players";

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct QuestStoreBuilder {
    path: PathBuf,
}

impl QuestStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open(self) -> Result<QuestStore, QuestError> {
        QuestStore::open(self.path)
    }
}

/// Sled-backed persistence for player quest state. Safe to clone across
/// worker tasks; workers only ever touch serialized records, never live
/// engine objects.
#[derive(Clone)]
pub struct QuestStore {
    _db: sled::Db,
    players: sled::Tree,
}

impl QuestStore {
    /// Open (or create) the quest store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, QuestError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let players = db.open_tree(TREE_PLAYERS)?;
        Ok(Self { _db: db, players })
    }

    fn player_key(id: &str) -> Vec<u8> {
        format!("players:{}", id.to_ascii_lowercase()).into_bytes()
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, QuestError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: IVec) -> Result<T, QuestError> {
        Ok(bincode::deserialize::<T>(&bytes)?)
    }

    /// Insert or update a player record.
    pub fn put_player(&self, mut player: PlayerRecord) -> Result<(), QuestError> {
        player.schema_version = PLAYER_SCHEMA_VERSION;
        player.touch();
        let key = Self::player_key(&player.id);
        let bytes = Self::serialize(&player)?;
        self.players.insert(key, bytes)?;
        self.players.flush()?;
        Ok(())
    }

    /// Fetch a player record by id.
    pub fn get_player(&self, id: &str) -> Result<PlayerRecord, QuestError> {
        let key = Self::player_key(id);
        let Some(bytes) = self.players.get(&key)? else {
            return Err(QuestError::NotFound(format!("player: {}", id)));
        };
        let record: PlayerRecord = Self::deserialize(bytes)?;
        if record.schema_version != PLAYER_SCHEMA_VERSION {
            return Err(QuestError::SchemaMismatch {
                entity: "player",
                expected: PLAYER_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    /// Fetch a player record, creating a fresh one when none is stored yet.
    pub fn get_or_create_player(&self, id: &str) -> Result<PlayerRecord, QuestError> {
        match self.get_player(id) {
            Ok(record) => Ok(record),
            Err(QuestError::NotFound(_)) => Ok(PlayerRecord::new(id)),
            Err(e) => Err(e),
        }
    }

    /// List all player ids currently stored.
    pub fn list_player_ids(&self) -> Result<Vec<String>, QuestError> {
        let mut ids = Vec::new();
        for entry in self.players.scan_prefix(b"players:") {
            let (key, _) = entry?;
            let text = String::from_utf8_lossy(&key);
            if let Some(id) = text.strip_prefix("players:") {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn roundtrip_player_record() {
        let dir = TempDir::new().expect("tempdir");
        let store = QuestStoreBuilder::new(dir.path()).open().expect("store");

        let mut record = PlayerRecord::new("alice");
        record.add_tag("started");
        record.add_points("reputation", 12);
        store.put_player(record).expect("put");

        let loaded = store.get_player("alice").expect("get");
        assert!(loaded.has_tag("started"));
        assert_eq!(loaded.points("reputation"), 12);
        assert_eq!(store.list_player_ids().unwrap(), vec!["alice"]);
    }

    #[test]
    fn missing_player_is_not_found() {
        let dir = TempDir::new().expect("tempdir");
        let store = QuestStoreBuilder::new(dir.path()).open().expect("store");
        assert!(matches!(
            store.get_player("ghost"),
            Err(QuestError::NotFound(_))
        ));
        let fresh = store.get_or_create_player("ghost").expect("fresh");
        assert!(fresh.tags.is_empty());
    }
}
