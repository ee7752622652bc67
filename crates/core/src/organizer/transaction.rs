//! The dry-run match pass.
//!
//! Nothing here mutates the library: [`plan`] only reads the cache and turns
//! what it finds into a [`PendingTransaction`] for the commit pass.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::database::PathUpdate;
use crate::library::{MediaItem, PathMapper};

/// One transcoded file and where it goes in the library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMove {
    pub rating_key: String,
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Everything one organizer run intends to change.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PendingTransaction {
    pub moves: Vec<FileMove>,
    /// Original files replaced by an output with a different name.
    pub deletions: Vec<PathBuf>,
    pub updates: Vec<PathUpdate>,
    /// Library sections to rescan afterwards.
    pub sections: BTreeSet<String>,
    /// Rating keys whose output is moved by this transaction.
    pub committed: Vec<String>,
    /// Per-item cache directories removed once the transaction is done.
    pub cache_dirs: Vec<PathBuf>,
    /// Cache directories that belong to no succeeded item.
    pub orphans: Vec<PathBuf>,
    /// Succeeded items with no usable output in the cache.
    pub stale: Vec<String>,
}

impl PendingTransaction {
    /// True when committing would not touch the library.
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty() && self.deletions.is_empty() && self.updates.is_empty()
    }
}

/// Matches cache subdirectories against the succeeded items.
///
/// A subdirectory named after a succeeded rating key holds that item's output,
/// which moves next to the original file. When the name changes, the database
/// row is repointed and the original file is deleted.
pub async fn plan(
    cache_dir: &Path,
    items: &[MediaItem],
    mapper: &PathMapper,
) -> io::Result<PendingTransaction> {
    let by_key: HashMap<&str, &MediaItem> =
        items.iter().map(|i| (i.rating_key.as_str(), i)).collect();
    let mut tx = PendingTransaction::default();
    let mut matched: HashSet<String> = HashSet::new();

    for dir in subdirectories(cache_dir).await? {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let Some(item) = by_key.get(name.as_str()) else {
            debug!(path = %dir.display(), "Orphan cache directory");
            tx.orphans.push(dir);
            continue;
        };
        matched.insert(name);

        match first_file(&dir).await? {
            Some(output) => plan_item(&mut tx, item, output, mapper),
            None => {
                warn!(rating_key = %item.rating_key, "Cache directory holds no output");
                tx.stale.push(item.rating_key.clone());
            }
        }
        tx.cache_dirs.push(dir);
    }

    for item in items {
        if !matched.contains(&item.rating_key) {
            debug!(rating_key = %item.rating_key, "No cache directory for succeeded item");
            tx.stale.push(item.rating_key.clone());
        }
    }

    Ok(tx)
}

fn plan_item(tx: &mut PendingTransaction, item: &MediaItem, output: PathBuf, mapper: &PathMapper) {
    let key = &item.rating_key;
    let [remote] = item.locations.as_slice() else {
        warn!(rating_key = %key, files = item.locations.len(), "Item no longer has exactly one file");
        tx.stale.push(key.clone());
        return;
    };

    let original = mapper.to_local(remote);
    let (Some(library_dir), Some(file_name)) = (original.parent(), output.file_name()) else {
        warn!(rating_key = %key, path = %original.display(), "Cannot place output");
        tx.stale.push(key.clone());
        return;
    };
    let destination = library_dir.join(file_name);

    if destination != original {
        tx.updates.push(PathUpdate {
            rating_key: key.clone(),
            old_path: remote.clone(),
            new_path: mapper.to_remote(&destination),
        });
        tx.deletions.push(original);
    }
    tx.moves.push(FileMove {
        rating_key: key.clone(),
        source: output,
        destination,
    });
    tx.sections.insert(item.section.clone());
    tx.committed.push(key.clone());
}

async fn subdirectories(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

async fn first_file(dir: &Path) -> io::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::PathMapping;
    use tempfile::TempDir;

    struct Dirs {
        cache: TempDir,
        library: TempDir,
    }

    impl Dirs {
        fn new() -> Self {
            Self {
                cache: TempDir::new().unwrap(),
                library: TempDir::new().unwrap(),
            }
        }

        fn mapper(&self) -> PathMapper {
            PathMapper::new(vec![PathMapping {
                remote: "/data".to_string(),
                local: self.library.path().to_path_buf(),
            }])
        }

        fn output(&self, key: &str, name: &str) -> PathBuf {
            let dir = self.cache.path().join(key);
            std::fs::create_dir_all(&dir).unwrap();
            let path = dir.join(name);
            std::fs::write(&path, b"transcoded").unwrap();
            path
        }
    }

    fn item(key: &str, section: &str, remote: &str) -> MediaItem {
        MediaItem::new(key, key, section, vec![remote.to_string()])
    }

    #[tokio::test]
    async fn test_renamed_output_queues_update_and_deletion() {
        let dirs = Dirs::new();
        let output = dirs.output("1", "Film.mkv");
        let items = vec![item("1", "2", "/data/Movies/Film.avi")];

        let tx = plan(dirs.cache.path(), &items, &dirs.mapper()).await.unwrap();

        assert_eq!(tx.committed, vec!["1"]);
        assert_eq!(tx.moves.len(), 1);
        assert_eq!(tx.moves[0].source, output);
        assert_eq!(
            tx.moves[0].destination,
            dirs.library.path().join("Movies/Film.mkv")
        );
        assert_eq!(
            tx.updates,
            vec![PathUpdate {
                rating_key: "1".to_string(),
                old_path: "/data/Movies/Film.avi".to_string(),
                new_path: "/data/Movies/Film.mkv".to_string(),
            }]
        );
        assert_eq!(tx.deletions, vec![dirs.library.path().join("Movies/Film.avi")]);
        assert!(tx.sections.contains("2"));
        assert!(!tx.is_empty());
    }

    #[tokio::test]
    async fn test_same_name_output_only_moves() {
        let dirs = Dirs::new();
        dirs.output("1", "Film.mkv");
        let items = vec![item("1", "1", "/data/Film.mkv")];

        let tx = plan(dirs.cache.path(), &items, &dirs.mapper()).await.unwrap();
        assert_eq!(tx.moves.len(), 1);
        assert!(tx.updates.is_empty());
        assert!(tx.deletions.is_empty());
    }

    #[tokio::test]
    async fn test_orphans_and_stale_items() {
        let dirs = Dirs::new();
        dirs.output("99", "Old.mkv");
        std::fs::create_dir_all(dirs.cache.path().join("2")).unwrap();
        let items = vec![
            item("1", "1", "/data/A.avi"),
            item("2", "1", "/data/B.avi"),
        ];

        let tx = plan(dirs.cache.path(), &items, &dirs.mapper()).await.unwrap();

        assert_eq!(tx.orphans, vec![dirs.cache.path().join("99")]);
        assert_eq!(tx.stale, vec!["2", "1"]);
        assert_eq!(tx.cache_dirs, vec![dirs.cache.path().join("2")]);
        assert!(tx.committed.is_empty());
        assert!(tx.is_empty());
    }

    #[tokio::test]
    async fn test_missing_cache_dir_is_empty() {
        let dirs = Dirs::new();
        let missing = dirs.cache.path().join("nope");
        let tx = plan(&missing, &[item("1", "1", "/data/A.avi")], &dirs.mapper())
            .await
            .unwrap();
        assert!(tx.is_empty());
        assert_eq!(tx.stale, vec!["1"]);
    }
}
