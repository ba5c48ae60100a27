//! Quest package discovery and raw definition loading.
//!
//! A package is one directory under the packages root:
//!
//! ```text
//! packages/
//!   default/
//!     conditions.toml      # name = "instruction"
//!     events.toml          # name = "instruction"
//!     main.toml            # [objectives], global_locations, [static_events]
//!     conversations/
//!       innkeeper.json
//! ```
//!
//! This module reads definitions as raw strings; turning them into live
//! condition/event/objective instances (and deciding what survives a parse
//! failure) is the engine's job. Loading is deliberately forgiving at the
//! file level: a package whose file fails to parse is reported and skipped,
//! the remaining packages still load.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::Deserialize;

use crate::quest::conversation::Conversation;
use crate::quest::errors::QuestError;
use crate::quest::instruction::qualify;

#[derive(Debug, Default, Deserialize)]
struct MainFile {
    #[serde(default)]
    objectives: HashMap<String, String>,
    #[serde(default)]
    global_locations: Option<String>,
    #[serde(default)]
    static_events: HashMap<String, String>,
}

/// Raw definitions of one package, keyed by local name.
#[derive(Debug, Default)]
pub struct QuestPackage {
    pub name: String,
    pub conditions: HashMap<String, String>,
    pub events: HashMap<String, String>,
    pub objectives: HashMap<String, String>,
    /// Objective names (local to this package) started automatically for
    /// every player on join.
    pub global_locations: Vec<String>,
    /// Hour of day (0-23) mapped to qualified event references fired when
    /// the scheduler crosses that hour.
    pub static_events: HashMap<u8, Vec<String>>,
    pub conversations: HashMap<String, Conversation>,
}

impl QuestPackage {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    fn load(dir: &Path, name: &str) -> Result<Self, QuestError> {
        let mut pack = Self::new(name);
        pack.conditions = read_definitions(&dir.join("conditions.toml"))?;
        pack.events = read_definitions(&dir.join("events.toml"))?;

        let main_path = dir.join("main.toml");
        if main_path.exists() {
            let main: MainFile = toml::from_str(&fs::read_to_string(&main_path)?)?;
            pack.objectives = main.objectives;
            if let Some(list) = main.global_locations {
                pack.global_locations = list
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            for (hour, events) in main.static_events {
                match hour.parse::<u8>() {
                    Ok(h) if h < 24 => {
                        let refs = events
                            .split(',')
                            .map(|e| qualify(name, e.trim()))
                            .collect();
                        pack.static_events.insert(h, refs);
                    }
                    _ => warn!("Package {}: invalid static event hour \"{}\"", name, hour),
                }
            }
        }

        pack.conversations = load_conversations(&dir.join("conversations"), name);
        Ok(pack)
    }
}

/// Flat `name = "instruction"` table, absent file yields an empty map.
fn read_definitions(path: &Path) -> Result<HashMap<String, String>, QuestError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    Ok(toml::from_str(&fs::read_to_string(path)?)?)
}

fn load_conversations(dir: &Path, pack: &str) -> HashMap<String, Conversation> {
    let mut out = HashMap::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return out,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(err) => {
                warn!("Package {}: cannot read {}: {}", pack, path.display(), err);
                continue;
            }
        };
        match Conversation::parse(pack, &name, &json) {
            Ok(conversation) => {
                out.insert(name, conversation);
            }
            Err(err) => warn!("Package {}: conversation {}: {}", pack, name, err),
        }
    }
    out
}

/// All loaded packages, keyed by package name.
#[derive(Debug, Default)]
pub struct PackageRegistry {
    packages: HashMap<String, QuestPackage>,
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every package directory under `root`. A package whose files
    /// cannot be parsed is skipped with a warning; a missing or unreadable
    /// root is an error.
    pub fn load_dir(root: &Path) -> Result<Self, QuestError> {
        let mut registry = Self::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string)
            else {
                continue;
            };
            match QuestPackage::load(&path, &name) {
                Ok(pack) => {
                    info!(
                        "Package {}: {} conditions, {} events, {} objectives, {} conversations",
                        name,
                        pack.conditions.len(),
                        pack.events.len(),
                        pack.objectives.len(),
                        pack.conversations.len()
                    );
                    registry.insert(pack);
                }
                Err(err) => warn!("Skipping package {}: {}", name, err),
            }
        }
        Ok(registry)
    }

    pub fn insert(&mut self, pack: QuestPackage) {
        self.packages.insert(pack.name.clone(), pack);
    }

    pub fn get(&self, name: &str) -> Option<&QuestPackage> {
        self.packages.get(name)
    }

    pub fn packages(&self) -> impl Iterator<Item = &QuestPackage> {
        self.packages.values()
    }

    /// Look up a conversation by qualified `package.name` id.
    pub fn conversation(&self, qualified: &str) -> Option<&Conversation> {
        let (pack, name) = qualified.split_once('.')?;
        self.packages.get(pack)?.conversations.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn loads_a_full_package() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("default");
        write(
            &dir.join("conditions.toml"),
            "rich = 'money 100'\nhealthy = 'health 10'\n",
        );
        write(&dir.join("events.toml"), "reward = 'give gold:5'\n");
        write(
            &dir.join("main.toml"),
            concat!(
                "global_locations = \"spawn_marker\"\n",
                "[objectives]\n",
                "spawn_marker = 'location 0;64;0;world 5 label:spawn'\n",
                "[static_events]\n",
                "6 = \"reward\"\n",
                "99 = \"reward\"\n",
            ),
        );
        write(
            &dir.join("conversations").join("innkeeper.json"),
            r#"{"quester":"Innkeeper","first":"hi","npc_options":{"hi":{"text":"Hello"}}}"#,
        );

        let registry = PackageRegistry::load_dir(root.path()).unwrap();
        let pack = registry.get("default").unwrap();
        assert_eq!(pack.conditions.len(), 2);
        assert_eq!(pack.events["reward"], "give gold:5");
        assert_eq!(pack.global_locations, vec!["spawn_marker".to_string()]);
        assert_eq!(pack.static_events[&6], vec!["default.reward".to_string()]);
        assert!(!pack.static_events.contains_key(&99));
        assert!(registry.conversation("default.innkeeper").is_some());
    }

    #[test]
    fn broken_package_does_not_sink_the_rest() {
        let root = tempfile::tempdir().unwrap();
        write(
            &root.path().join("good").join("events.toml"),
            "notify = 'message hi'\n",
        );
        write(
            &root.path().join("bad").join("events.toml"),
            "this is not toml at all [",
        );

        let registry = PackageRegistry::load_dir(root.path()).unwrap();
        assert!(registry.get("good").is_some());
        assert!(registry.get("bad").is_none());
    }

    #[test]
    fn missing_root_is_an_error() {
        let missing = Path::new("/nonexistent/questline/packages");
        assert!(PackageRegistry::load_dir(missing).is_err());
    }
}
