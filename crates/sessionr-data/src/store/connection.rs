use super::error::{Result, StoreError};
use super::schema::initialize_schema;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Persistent store for historical bars and the trading-calendar
/// table. The connection sits behind a mutex so the store can be
/// shared across the runtime's workers.
pub struct BarStore {
    conn: Mutex<Connection>,
}

impl BarStore {
    pub fn new_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Initialization(e.to_string()))?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn new_file(path: &Path) -> Result<Self> {
        let conn =
            Connection::open(path).map_err(|e| StoreError::Initialization(e.to_string()))?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_store() -> Result<()> {
        let store = BarStore::new_memory()?;
        assert!(store.connection().is_autocommit());
        Ok(())
    }

    #[test]
    fn test_file_store() -> Result<()> {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("bars.sqlite");

        let store = BarStore::new_file(&db_path)?;
        assert!(store.connection().is_autocommit());
        assert!(db_path.exists());

        Ok(())
    }
}
