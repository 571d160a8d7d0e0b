//! Database connection management

use crate::error::Result;
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;
use std::time::Duration;

use super::migrations;

/// How long a writer waits for another connection's transaction to finish
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database wrapper for libSQL connections
pub struct Database {
    db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open a local database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = Builder::new_local(&path_str).build().await?;
        let conn = db.connect()?;

        let database = Self { db, conn };
        database.configure(&database.conn).await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        let conn = db.connect()?;

        let database = Self { db, conn };
        database.configure(&database.conn).await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Open an additional connection to the same database file.
    ///
    /// Feature code writing concurrently with a sync run should use its own
    /// connection so each side's transactions stay isolated. In-memory
    /// databases are private to their first connection; use
    /// [`Database::connection`] there instead.
    pub async fn connect(&self) -> Result<Connection> {
        let conn = self.db.connect()?;
        self.configure(&conn).await?;
        Ok(conn)
    }

    /// Configure `SQLite` for concurrent readers and a single writer
    async fn configure(&self, conn: &Connection) -> Result<()> {
        // journal_mode returns a row, and is a no-op for in-memory databases
        conn.query("PRAGMA journal_mode = WAL;", ()).await.ok();
        conn.execute("PRAGMA synchronous = NORMAL;", ()).await.ok();
        conn.execute("PRAGMA foreign_keys = ON;", ()).await?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(())
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn).await
    }

    /// Get a reference to the primary connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
