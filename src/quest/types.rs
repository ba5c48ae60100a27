use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::quest::errors::QuestError;
use crate::quest::instruction::Instruction;

pub const PLAYER_SCHEMA_VERSION: u8 = 1;

/// An objective instruction string persisted together with its owning
/// package, so unqualified references can be resolved again on reload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredObjective {
    pub package: String,
    pub instruction: String,
}

impl StoredObjective {
    pub fn new(package: &str, instruction: &str) -> Self {
        Self {
            package: package.to_string(),
            instruction: instruction.to_string(),
        }
    }
}

/// A timestamped pointer linking a player to an unlocked journal entry.
/// Append-only; duplicates of the same id are never re-added.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JournalEntry {
    pub id: String,
    pub date: DateTime<Utc>,
}

/// A player's persisted quest state. Objectives are stored as instruction
/// strings (with live progress encoded back in) and re-parsed on login;
/// in-memory listener state does not survive a logout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: String,
    #[serde(default)]
    pub objectives: Vec<StoredObjective>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub points: HashMap<String, i64>,
    #[serde(default)]
    pub journal: Vec<JournalEntry>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl PlayerRecord {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            objectives: Vec::new(),
            tags: Vec::new(),
            points: HashMap::new(),
            journal: Vec::new(),
            updated_at: Utc::now(),
            schema_version: PLAYER_SCHEMA_VERSION,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Add a tag; already-present tags are left alone.
    pub fn add_tag(&mut self, tag: &str) {
        if !self.has_tag(tag) {
            self.tags.push(tag.to_string());
        }
    }

    pub fn remove_tag(&mut self, tag: &str) {
        self.tags.retain(|t| t != tag);
    }

    pub fn points(&self, category: &str) -> i64 {
        self.points.get(category).copied().unwrap_or(0)
    }

    pub fn add_points(&mut self, category: &str, count: i64) {
        *self.points.entry(category.to_string()).or_insert(0) += count;
    }

    pub fn has_journal_entry(&self, id: &str) -> bool {
        self.journal.iter().any(|e| e.id == id)
    }

    /// Append a journal pointer unless one with the same id already exists.
    pub fn add_journal_entry(&mut self, id: &str) {
        if !self.has_journal_entry(id) {
            self.journal.push(JournalEntry {
                id: id.to_string(),
                date: Utc::now(),
            });
        }
    }

    pub fn remove_journal_entry(&mut self, id: &str) {
        self.journal.retain(|e| e.id != id);
    }
}

/// A world position in `x;y;z;world` instruction format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub world: String,
}

impl Location {
    /// Parse the `x;y;z;world` form used by location arguments.
    pub fn parse(field: &str, value: &str) -> Result<Self, QuestError> {
        let parts: Vec<&str> = value.split(';').collect();
        if parts.len() != 4 {
            return Err(QuestError::field(field, value));
        }
        Ok(Self {
            x: Instruction::float(field, parts[0])?,
            y: Instruction::float(field, parts[1])?,
            z: Instruction::float(field, parts[2])?,
            world: parts[3].to_string(),
        })
    }

    pub fn serialize(&self) -> String {
        format!("{};{};{};{}", self.x, self.y, self.z, self.world)
    }

    /// Whether `other` lies within `radius` of this location, in the same world.
    pub fn within(&self, other: &Location, radius: f64) -> bool {
        if self.world != other.world {
            return false;
        }
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz <= radius * radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_entries_deduplicate() {
        let mut record = PlayerRecord::new("alice");
        record.add_journal_entry("default.wood_started");
        record.add_journal_entry("default.wood_started");
        assert_eq!(record.journal.len(), 1);
    }

    #[test]
    fn tags_and_points() {
        let mut record = PlayerRecord::new("alice");
        record.add_tag("started");
        record.add_tag("started");
        assert_eq!(record.tags.len(), 1);
        record.add_points("reputation", 10);
        record.add_points("reputation", -4);
        assert_eq!(record.points("reputation"), 6);
        assert_eq!(record.points("unknown"), 0);
    }

    #[test]
    fn location_parse_and_radius() {
        let loc = Location::parse("location", "100;64;-20;world").unwrap();
        assert_eq!(loc.world, "world");
        let near = Location::parse("location", "102;64;-20;world").unwrap();
        let far = Location::parse("location", "200;64;-20;world").unwrap();
        let other = Location::parse("location", "100;64;-20;nether").unwrap();
        assert!(loc.within(&near, 5.0));
        assert!(!loc.within(&far, 5.0));
        assert!(!loc.within(&other, 5.0));
        assert!(Location::parse("location", "100;64;world").is_err());
    }
}
