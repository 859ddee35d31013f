//! Mission file storage.
//!
//! One `.mission` file per mission under a root directory. Listing reads
//! each file's superblock so the UI can show when a mission was flown.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use borealis_core::format::{SuperBlock, BLOCK_SIZE};
use borealis_core::state::MissionEntry;

/// File extension for mission files
pub const MISSION_EXTENSION: &str = "mission";

/// How many deduplicated names to try before giving up
pub const FILE_CREATION_ATTEMPT_LIMIT: u32 = 50;

/// Manager for the missions directory
pub struct MissionStore {
    base_dir: PathBuf,
}

impl MissionStore {
    pub fn new(base_dir: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&base_dir)?;
        debug!("Missions directory: {}", base_dir.display());
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Full path for a mission name
    pub fn mission_path(&self, name: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.{}", name, MISSION_EXTENSION))
    }

    /// Resolve a proposed mission name to one that does not collide with
    /// an existing file, appending ` (1)`, ` (2)`, ... as needed.
    pub fn unique_name(&self, proposed: &str) -> io::Result<String> {
        if !self.mission_path(proposed).exists() {
            return Ok(proposed.to_string());
        }
        for i in 1..FILE_CREATION_ATTEMPT_LIMIT {
            let candidate = format!("{} ({})", proposed, i);
            if !self.mission_path(&candidate).exists() {
                return Ok(candidate);
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!(
                "no free name for {:?} after {} attempts",
                proposed, FILE_CREATION_ATTEMPT_LIMIT
            ),
        ))
    }

    /// All missions in the store with their start epoch, sorted by name.
    /// Files whose superblock cannot be read are skipped with a warning.
    pub fn list_missions(&self) -> Vec<MissionEntry> {
        let mut missions = Vec::new();

        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read missions directory: {}", e);
                return missions;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(MISSION_EXTENSION)
            {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|n| n.to_str()) else {
                continue;
            };
            match read_superblock(&path) {
                Ok(sb) => missions.push(MissionEntry {
                    name: name.to_string(),
                    epoch: sb.epoch(),
                }),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }

        missions.sort_by(|a, b| a.name.cmp(&b.name));
        missions
    }
}

fn read_superblock(path: &Path) -> io::Result<SuperBlock> {
    let mut file = fs::File::open(path)?;
    let mut buf = [0u8; BLOCK_SIZE];
    file.read_exact(&mut buf)?;
    SuperBlock::from_bytes(&buf)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use borealis_core::format::Flight;
    use tempfile::TempDir;

    fn store() -> (MissionStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = MissionStore::new(temp.path().to_path_buf()).unwrap();
        (store, temp)
    }

    fn write_mission(store: &MissionStore, name: &str, timestamp: Option<u32>) {
        let mut sb = SuperBlock::default();
        sb.add_flight(Flight {
            first_block: 1,
            num_blocks: 0,
            timestamp,
        })
        .unwrap();
        let mut bytes = sb.to_bytes().to_vec();
        if timestamp.is_none() {
            bytes[4] = 0; // rewrite as legacy version
            // legacy entries are 8 bytes; the zeroed tail already matches
        }
        fs::write(store.mission_path(name), bytes).unwrap();
    }

    #[test]
    fn test_unique_name_dedup() {
        let (store, _temp) = store();

        assert_eq!(store.unique_name("flight").unwrap(), "flight");
        fs::write(store.mission_path("flight"), b"x").unwrap();
        assert_eq!(store.unique_name("flight").unwrap(), "flight (1)");
        fs::write(store.mission_path("flight (1)"), b"x").unwrap();
        assert_eq!(store.unique_name("flight").unwrap(), "flight (2)");
    }

    #[test]
    fn test_unique_name_exhaustion() {
        let (store, _temp) = store();

        fs::write(store.mission_path("m"), b"x").unwrap();
        for i in 1..FILE_CREATION_ATTEMPT_LIMIT {
            fs::write(store.mission_path(&format!("m ({})", i)), b"x").unwrap();
        }
        assert!(store.unique_name("m").is_err());
    }

    #[test]
    fn test_list_missions_epochs() {
        let (store, _temp) = store();

        write_mission(&store, "alpha", Some(1_700_000_000));
        write_mission(&store, "legacy", None);
        // not a mission file, must be ignored
        fs::write(store.base_dir().join("notes.txt"), b"hello").unwrap();
        // unreadable superblock, must be skipped
        fs::write(store.mission_path("broken"), b"short").unwrap();

        let missions = store.list_missions();
        assert_eq!(missions.len(), 2);
        assert_eq!(missions[0].name, "alpha");
        assert_eq!(missions[0].epoch, 1_700_000_000);
        assert_eq!(missions[1].name, "legacy");
        assert_eq!(missions[1].epoch, -1);
    }
}
