use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, OpenFlags};

use crate::config::DatabaseConfig;

use super::{DatabaseError, DatabaseSession, LibraryDatabase, PathUpdate};

const UPDATE_PART_FILE: &str = "UPDATE media_parts SET file = ?1 \
     WHERE file = ?2 \
     AND media_item_id IN (SELECT id FROM media_items WHERE metadata_item_id = ?3)";

/// The Plex library database (`com.plexapp.plugins.library.db`).
pub struct SqliteLibraryDatabase {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteLibraryDatabase {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            path: config.path.clone(),
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LibraryDatabase for SqliteLibraryDatabase {
    fn begin(&self) -> Result<Box<dyn DatabaseSession>, DatabaseError> {
        // Never create the file: a missing database is a configuration error.
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| DatabaseError::Open(format!("{}: {}", self.path.display(), e)))?;

        conn.busy_timeout(self.busy_timeout)
            .map_err(|e| DatabaseError::Open(e.to_string()))?;
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| DatabaseError::Open(e.to_string()))?;

        Ok(Box::new(SqliteSession { conn }))
    }
}

struct SqliteSession {
    conn: Connection,
}

impl DatabaseSession for SqliteSession {
    fn execute_update(&mut self, update: &PathUpdate) -> Result<usize, DatabaseError> {
        self.conn
            .execute(
                UPDATE_PART_FILE,
                params![update.new_path, update.old_path, update.rating_key],
            )
            .map_err(|e| DatabaseError::Statement(e.to_string()))
    }

    fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| DatabaseError::Commit(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("library.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE metadata_items (id INTEGER PRIMARY KEY, title TEXT);
            CREATE TABLE media_items (id INTEGER PRIMARY KEY, metadata_item_id INTEGER);
            CREATE TABLE media_parts (id INTEGER PRIMARY KEY, media_item_id INTEGER, file TEXT);

            INSERT INTO metadata_items VALUES (101, 'Heat');
            INSERT INTO media_items VALUES (1, 101);
            INSERT INTO media_parts VALUES (1, 1, '/data/movies/Heat/Heat.avi');

            INSERT INTO metadata_items VALUES (102, 'Other');
            INSERT INTO media_items VALUES (2, 102);
            INSERT INTO media_parts VALUES (2, 2, '/data/movies/Heat/Heat.avi');
            "#,
        )
        .unwrap();
        path
    }

    fn database(path: PathBuf) -> SqliteLibraryDatabase {
        SqliteLibraryDatabase::new(&DatabaseConfig {
            path,
            busy_timeout_ms: 100,
        })
    }

    fn part_file(path: &Path, id: i64) -> String {
        Connection::open(path)
            .unwrap()
            .query_row("SELECT file FROM media_parts WHERE id = ?1", [id], |r| r.get(0))
            .unwrap()
    }

    fn heat_update() -> PathUpdate {
        PathUpdate {
            rating_key: "101".to_string(),
            old_path: "/data/movies/Heat/Heat.avi".to_string(),
            new_path: "/data/movies/Heat/Heat.mkv".to_string(),
        }
    }

    #[test]
    fn test_update_is_scoped_to_item() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir);
        let db = database(path.clone());

        let mut session = db.begin().unwrap();
        assert_eq!(session.execute_update(&heat_update()).unwrap(), 1);
        session.commit().unwrap();

        assert_eq!(part_file(&path, 1), "/data/movies/Heat/Heat.mkv");
        assert_eq!(part_file(&path, 2), "/data/movies/Heat/Heat.avi");
    }

    #[test]
    fn test_unmatched_update_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let db = database(fixture(&dir));

        let mut session = db.begin().unwrap();
        let rows = session
            .execute_update(&PathUpdate {
                rating_key: "999".to_string(),
                ..heat_update()
            })
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn test_drop_without_commit_discards() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir);
        let db = database(path.clone());

        {
            let mut session = db.begin().unwrap();
            session.execute_update(&heat_update()).unwrap();
        }

        assert_eq!(part_file(&path, 1), "/data/movies/Heat/Heat.avi");
    }

    #[test]
    fn test_missing_database_is_not_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.db");
        assert!(matches!(
            database(path.clone()).begin(),
            Err(DatabaseError::Open(_))
        ));
        assert!(!path.exists());
    }
}
