//! Pooled `DuckDB` connections, split by access mode.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ::duckdb::Connection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Default)]
struct IdleConnections {
    read_only: Vec<Connection>,
    read_write: Vec<Connection>,
}

impl IdleConnections {
    fn for_mode(&mut self, mode: AccessMode) -> &mut Vec<Connection> {
        match mode {
            AccessMode::ReadOnly => &mut self.read_only,
            AccessMode::ReadWrite => &mut self.read_write,
        }
    }
}

struct Shared {
    db_path: PathBuf,
    max_idle: usize,
    idle: Mutex<IdleConnections>,
}

impl Shared {
    fn idle(&self) -> std::sync::MutexGuard<'_, IdleConnections> {
        self.idle
            .lock()
            .expect("duckdb connection pool mutex should not be poisoned")
    }
}

/// Hands out connections to a single database file and keeps up to
/// `max_idle` of each mode around for reuse.
#[derive(Clone)]
pub struct DuckDbConnectionManager {
    shared: Arc<Shared>,
}

impl DuckDbConnectionManager {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, max_idle: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                db_path: path.into(),
                max_idle: max_idle.max(1),
                idle: Mutex::new(IdleConnections::default()),
            }),
        }
    }

    /// Reuses an idle connection of the requested mode or opens a new one.
    ///
    /// # Errors
    /// Returns an error when the database file cannot be opened or configured.
    pub fn acquire(&self, mode: AccessMode) -> Result<PooledConnection, ::duckdb::Error> {
        let reused = self.shared.idle().for_mode(mode).pop();
        let connection = match reused {
            Some(connection) => connection,
            None => open_connection(self.shared.db_path.as_path(), mode)?,
        };

        Ok(PooledConnection {
            mode,
            shared: Arc::clone(&self.shared),
            connection: Some(connection),
        })
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.shared.db_path.as_path()
    }

    /// Number of idle connections currently parked for `mode`.
    #[must_use]
    pub fn idle_count(&self, mode: AccessMode) -> usize {
        self.shared.idle().for_mode(mode).len()
    }
}

/// Connection checked out of the pool; returned on drop.
pub struct PooledConnection {
    mode: AccessMode,
    shared: Arc<Shared>,
    connection: Option<Connection>,
}

impl PooledConnection {
    pub fn mode(&self) -> AccessMode {
        self.mode
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_ref()
            .expect("pooled connection is present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
            .as_mut()
            .expect("pooled connection is present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        let mut idle = self.shared.idle();
        let parked = idle.for_mode(self.mode);
        if parked.len() < self.shared.max_idle {
            parked.push(connection);
        }
    }
}

fn open_connection(path: &Path, mode: AccessMode) -> Result<Connection, ::duckdb::Error> {
    let connection = Connection::open(path)?;
    connection.execute_batch("PRAGMA disable_progress_bar;")?;
    if mode == AccessMode::ReadOnly {
        // Not every embedded build accepts this; the query layer rejects writes regardless.
        let _ = connection.execute_batch("SET access_mode = 'READ_ONLY';");
    }
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn released_connections_are_parked_up_to_the_limit() {
        let temp = tempdir().expect("tempdir");
        let manager = DuckDbConnectionManager::new(temp.path().join("pool.duckdb"), 1);

        let first = manager.acquire(AccessMode::ReadWrite).expect("first");
        let second = manager.acquire(AccessMode::ReadWrite).expect("second");
        assert_eq!(first.mode(), AccessMode::ReadWrite);
        drop(first);
        drop(second);

        assert_eq!(manager.idle_count(AccessMode::ReadWrite), 1);
        assert_eq!(manager.idle_count(AccessMode::ReadOnly), 0);
    }
}
