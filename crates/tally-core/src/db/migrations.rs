//! Database migrations

use crate::error::Result;
use crate::models::EntityTable;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Execute statements inside one transaction, rolling back on the first failure
async fn apply_statements<S: AsRef<str>>(conn: &Connection, statements: &[S]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt.as_ref(), ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    Ok(())
}

/// Migration to version 1: settings and the change log
async fn migrate_v1(conn: &Connection) -> Result<()> {
    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Session, checkpoint and other local key/value state
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        // Local mutations awaiting upload
        "CREATE TABLE IF NOT EXISTS change_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_name TEXT NOT NULL,
            row_id TEXT NOT NULL,
            operation TEXT NOT NULL,
            payload TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            sync_status TEXT NOT NULL DEFAULT 'PENDING'
        )",
        "CREATE INDEX IF NOT EXISTS idx_change_log_status ON change_log(sync_status, id)",
        "CREATE INDEX IF NOT EXISTS idx_change_log_row ON change_log(table_name, row_id)",
        // Record migration version
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    apply_statements(conn, &statements).await?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: one table per synchronized entity type
async fn migrate_v2(conn: &Connection) -> Result<()> {
    let mut statements = Vec::with_capacity(EntityTable::ALL.len() * 2 + 1);
    for table in EntityTable::ALL {
        let name = table.name();
        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {name} (
                id TEXT PRIMARY KEY,
                recency INTEGER NOT NULL,
                sync_status TEXT NOT NULL,
                data TEXT NOT NULL
            )"
        ));
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS idx_{name}_recency ON {name}(recency DESC)"
        ));
    }
    statements.push("INSERT INTO schema_version (version) VALUES (2)".to_string());

    apply_statements(conn, &statements).await?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn table_exists(conn: &Connection, name: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT EXISTS(
                    SELECT 1 FROM sqlite_master
                    WHERE type = 'table' AND name = ?
                )",
                [name],
            )
            .await
            .unwrap();

        rows.next()
            .await
            .unwrap()
            .is_some_and(|row| row.get::<i32>(0).unwrap() != 0)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap(); // Should not fail

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migration_v2_creates_every_entity_table() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        assert!(table_exists(&conn, "change_log").await);
        for table in EntityTable::ALL {
            assert!(table_exists(&conn, table.name()).await, "missing {table}");
        }
    }
}
