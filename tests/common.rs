//! Shared fixtures for integration tests: an in-memory recording game
//! server and helpers for writing package directories to disk.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use questline::quest::{GameServer, Location, QuestEngine, QuestStoreBuilder};
use tempfile::TempDir;

/// A game server stub that records actions and tracks a simple inventory,
/// so `give`/`take` events and `item` conditions behave end to end.
#[derive(Default)]
pub struct RecordingServer {
    pub log: Arc<Mutex<Vec<String>>>,
    pub offline: Arc<Mutex<HashSet<String>>>,
    items: Mutex<HashMap<(String, String), i64>>,
}

impl GameServer for RecordingServer {
    fn is_online(&self, player: &str) -> bool {
        !self.offline.lock().unwrap().contains(player)
    }

    fn location(&self, _player: &str) -> Option<Location> {
        Some(Location {
            x: 0.0,
            y: 64.0,
            z: 0.0,
            world: "world".to_string(),
        })
    }

    fn health(&self, _player: &str) -> Option<f64> {
        Some(20.0)
    }

    fn level(&self, _player: &str) -> Option<i64> {
        Some(1)
    }

    fn empty_slots(&self, _player: &str) -> Option<i64> {
        Some(36)
    }

    fn item_count(&self, player: &str, item: &str) -> i64 {
        *self
            .items
            .lock()
            .unwrap()
            .get(&(player.to_string(), item.to_string()))
            .unwrap_or(&0)
    }

    fn send_message(&self, player: &str, message: &str) {
        self.log
            .lock()
            .unwrap()
            .push(format!("msg|{}|{}", player, message));
    }

    fn give_item(&self, player: &str, item: &str, amount: i64) {
        *self
            .items
            .lock()
            .unwrap()
            .entry((player.to_string(), item.to_string()))
            .or_insert(0) += amount;
        self.log
            .lock()
            .unwrap()
            .push(format!("give|{}|{}x{}", player, item, amount));
    }

    fn take_item(&self, player: &str, item: &str, amount: i64) -> i64 {
        let mut items = self.items.lock().unwrap();
        let held = items
            .entry((player.to_string(), item.to_string()))
            .or_insert(0);
        let taken = amount.min(*held);
        *held -= taken;
        drop(items);
        self.log
            .lock()
            .unwrap()
            .push(format!("take|{}|{}x{}", player, item, taken));
        taken
    }

    fn teleport(&self, player: &str, location: &Location) {
        self.log
            .lock()
            .unwrap()
            .push(format!("tp|{}|{}", player, location.serialize()));
    }

    fn dispatch_command(&self, command: &str) {
        self.log.lock().unwrap().push(format!("cmd|{}", command));
    }
}

pub struct Harness {
    pub engine: QuestEngine,
    pub log: Arc<Mutex<Vec<String>>>,
    pub offline: Arc<Mutex<HashSet<String>>>,
    pub dir: TempDir,
}

impl Harness {
    /// Build an engine over a fresh store and load packages from `dir/packages`.
    pub fn load(dir: TempDir) -> Self {
        let server = RecordingServer::default();
        let log = server.log.clone();
        let offline = server.offline.clone();
        let store = QuestStoreBuilder::new(dir.path().join("data"))
            .open()
            .expect("store");
        let mut engine = QuestEngine::new(Box::new(server), store);
        engine
            .load_packs(&dir.path().join("packages"))
            .expect("load packs");
        Harness {
            engine,
            log,
            offline,
            dir,
        }
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn set_offline(&self, player: &str, offline: bool) {
        let mut set = self.offline.lock().unwrap();
        if offline {
            set.insert(player.to_string());
        } else {
            set.remove(player);
        }
    }
}

/// Write one file inside a package directory, creating parents.
pub fn write_pack_file(root: &Path, pack: &str, file: &str, content: &str) {
    let path = root.join("packages").join(pack).join(file);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}
