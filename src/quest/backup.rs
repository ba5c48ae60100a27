//! Snapshot backups of the player database.
//!
//! A backup is a gzipped tar of the sled data directory plus a SHA-256
//! checksum recorded in `backups.json` next to the archives. Automatic
//! snapshots are pruned to a configured count; manual snapshots are kept
//! until deleted explicitly.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{error, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tar::{Archive, Builder};

use crate::quest::errors::QuestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotKind {
    Manual,
    Automatic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub kind: SnapshotKind,
    pub checksum: String,
    /// Archive filename relative to the backup directory.
    pub path: PathBuf,
}

/// Creates, verifies, restores and prunes database snapshots.
pub struct BackupManager {
    data_dir: PathBuf,
    backup_dir: PathBuf,
    /// How many automatic snapshots to keep.
    keep_automatic: usize,
    snapshots: HashMap<String, Snapshot>,
}

impl BackupManager {
    pub fn new(
        data_dir: PathBuf,
        backup_dir: PathBuf,
        keep_automatic: usize,
    ) -> Result<Self, QuestError> {
        fs::create_dir_all(&backup_dir)?;
        let mut manager = Self {
            data_dir,
            backup_dir,
            keep_automatic,
            snapshots: HashMap::new(),
        };
        manager.load_index()?;
        Ok(manager)
    }

    fn index_path(&self) -> PathBuf {
        self.backup_dir.join("backups.json")
    }

    fn load_index(&mut self) -> Result<(), QuestError> {
        let path = self.index_path();
        if path.exists() {
            self.snapshots = serde_json::from_str(&fs::read_to_string(&path)?)?;
        }
        Ok(())
    }

    fn save_index(&self) -> Result<(), QuestError> {
        let contents = serde_json::to_string_pretty(&self.snapshots)?;
        fs::write(self.index_path(), contents)?;
        Ok(())
    }

    /// Archive the data directory into a new snapshot.
    pub fn create(&mut self, kind: SnapshotKind) -> Result<Snapshot, QuestError> {
        let created_at = Utc::now();
        let id = format!("snapshot_{}", created_at.format("%Y%m%d_%H%M%S_%3f"));
        let filename = format!("{}.tar.gz", id);
        let archive_path = self.backup_dir.join(&filename);

        info!("Creating {:?} snapshot {}", kind, id);
        let file = File::create(&archive_path)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut tar = Builder::new(encoder);
        tar.append_dir_all("data", &self.data_dir)?;
        // The archive must be fully flushed before the checksum is taken.
        let encoder = tar.into_inner()?;
        encoder.finish()?;

        let snapshot = Snapshot {
            id: id.clone(),
            created_at,
            size_bytes: fs::metadata(&archive_path)?.len(),
            kind,
            checksum: checksum(&archive_path)?,
            path: PathBuf::from(filename),
        };
        self.snapshots.insert(id.clone(), snapshot.clone());
        self.save_index()?;
        info!("Snapshot {} written ({} bytes)", id, snapshot.size_bytes);
        Ok(snapshot)
    }

    /// Recompute a snapshot's checksum against its archive.
    pub fn verify(&self, id: &str) -> Result<bool, QuestError> {
        let snapshot = self.get(id)?;
        let archive = self.backup_dir.join(&snapshot.path);
        let valid = checksum(&archive)? == snapshot.checksum;
        if !valid {
            error!("Snapshot {} failed verification", id);
        }
        Ok(valid)
    }

    /// Unpack a snapshot into `target`. Refuses if the checksum no longer
    /// matches.
    pub fn restore(&self, id: &str, target: &Path) -> Result<(), QuestError> {
        let snapshot = self.get(id)?;
        let archive_path = self.backup_dir.join(&snapshot.path);
        if checksum(&archive_path)? != snapshot.checksum {
            return Err(QuestError::StateViolation(format!(
                "snapshot {} is corrupt",
                id
            )));
        }
        fs::create_dir_all(target)?;
        let archive = File::open(&archive_path)?;
        Archive::new(GzDecoder::new(archive)).unpack(target)?;
        info!("Snapshot {} restored to {}", id, target.display());
        Ok(())
    }

    /// Drop automatic snapshots beyond the retention count, oldest first.
    /// Manual snapshots are never pruned.
    pub fn prune(&mut self) -> Result<Vec<String>, QuestError> {
        let mut automatic: Vec<&Snapshot> = self
            .snapshots
            .values()
            .filter(|s| s.kind == SnapshotKind::Automatic)
            .collect();
        automatic.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let doomed: Vec<String> = automatic
            .iter()
            .skip(self.keep_automatic)
            .map(|s| s.id.clone())
            .collect();

        for id in &doomed {
            if let Some(snapshot) = self.snapshots.remove(id) {
                let archive = self.backup_dir.join(&snapshot.path);
                if archive.exists() {
                    fs::remove_file(&archive)?;
                }
                info!("Pruned old snapshot {}", id);
            }
        }
        if !doomed.is_empty() {
            self.save_index()?;
        }
        Ok(doomed)
    }

    /// All snapshots, newest first.
    pub fn list(&self) -> Vec<Snapshot> {
        let mut all: Vec<Snapshot> = self.snapshots.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    fn get(&self, id: &str) -> Result<&Snapshot, QuestError> {
        self.snapshots
            .get(id)
            .ok_or_else(|| QuestError::NotFound(format!("snapshot: {}", id)))
    }
}

fn checksum(path: &Path) -> Result<String, QuestError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seed_data(path: &Path) {
        fs::create_dir_all(path).unwrap();
        fs::write(path.join("db"), b"player data").unwrap();
    }

    fn manager(temp: &TempDir, keep: usize) -> BackupManager {
        let data = temp.path().join("data");
        seed_data(&data);
        BackupManager::new(data, temp.path().join("backups"), keep).unwrap()
    }

    #[test]
    fn create_verify_restore() {
        let temp = TempDir::new().unwrap();
        let mut manager = manager(&temp, 3);
        let snapshot = manager.create(SnapshotKind::Manual).unwrap();
        assert!(snapshot.size_bytes > 0);
        assert!(manager.verify(&snapshot.id).unwrap());

        let target = temp.path().join("restore");
        manager.restore(&snapshot.id, &target).unwrap();
        assert_eq!(fs::read(target.join("data/db")).unwrap(), b"player data");
    }

    #[test]
    fn prune_keeps_manual_and_recent() {
        let temp = TempDir::new().unwrap();
        let mut manager = manager(&temp, 2);
        manager.create(SnapshotKind::Manual).unwrap();
        for _ in 0..4 {
            manager.create(SnapshotKind::Automatic).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let pruned = manager.prune().unwrap();
        assert_eq!(pruned.len(), 2);
        let left = manager.list();
        assert_eq!(left.len(), 3);
        assert_eq!(
            left.iter()
                .filter(|s| s.kind == SnapshotKind::Manual)
                .count(),
            1
        );
    }

    #[test]
    fn corrupt_archive_refuses_restore() {
        let temp = TempDir::new().unwrap();
        let mut manager = manager(&temp, 3);
        let snapshot = manager.create(SnapshotKind::Manual).unwrap();
        let archive = temp.path().join("backups").join(&snapshot.path);
        fs::write(&archive, b"garbage").unwrap();
        assert!(!manager.verify(&snapshot.id).unwrap());
        let err = manager
            .restore(&snapshot.id, &temp.path().join("restore"))
            .unwrap_err();
        assert!(matches!(err, QuestError::StateViolation(_)));
    }
}
