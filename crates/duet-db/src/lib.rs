pub mod migrations;
pub mod models;
pub mod queries;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use duet_types::{Error, Result};

/// Account and message storage over a single SQLite connection.
///
/// Constructed explicitly and handed to whoever needs it; there is no global
/// handle. Cross-request coordination is left to SQLite transactions.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).storage()?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL").storage()?;

        let db = Self::init(conn)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// Private in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().storage()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON").storage()?;
        migrations::run(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("DB lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Like [`Database::with_conn`] but hands out `&mut`, which
    /// `Connection::transaction` needs.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("DB lock poisoned: {}", e)))?;
        f(&mut conn)
    }
}

/// Maps rusqlite results into the core error taxonomy.
pub(crate) trait StorageExt<T> {
    /// Any SQLite failure becomes `Error::Internal`.
    fn storage(self) -> Result<T>;

    /// `QueryReturnedNoRows` becomes `Ok(None)`.
    fn optional(self) -> Result<Option<T>>;
}

impl<T> StorageExt<T> for std::result::Result<T, rusqlite::Error> {
    fn storage(self) -> Result<T> {
        self.map_err(|e| Error::Internal(format!("storage: {}", e)))
    }

    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::Internal(format!("storage: {}", e))),
        }
    }
}
