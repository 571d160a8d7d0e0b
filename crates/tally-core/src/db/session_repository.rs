//! Session and checkpoint repository implementation

use crate::error::{Error, Result};
use crate::models::{Checkpoint, User};
use libsql::Connection;

const KEY_USER_ID: &str = "session.user_id";
const KEY_USER_EMAIL: &str = "session.user_email";
const KEY_LAST_SYNC_TIME: &str = "sync.last_sync_time";
const KEY_SERVER_TIME: &str = "sync.server_time";

/// Current user and sync checkpoint persistence (async)
#[allow(async_fn_in_trait)]
pub trait SessionProvider {
    /// Signed-in user, if any
    async fn current_user(&self) -> Result<Option<User>>;

    async fn set_current_user(&self, user: &User) -> Result<()>;

    /// Sign out. The checkpoint is reset so the next user starts from scratch.
    async fn clear_current_user(&self) -> Result<()>;

    /// Download cursor, `0` before the first successful sync
    async fn last_sync_time(&self) -> Result<i64>;

    async fn update_last_sync_time(&self, timestamp: i64) -> Result<()>;

    async fn server_time(&self) -> Result<Option<i64>>;

    async fn update_server_time(&self, timestamp: i64) -> Result<()>;

    /// Both markers in one read
    async fn checkpoint(&self) -> Result<Checkpoint> {
        Ok(Checkpoint {
            last_sync_time: self.last_sync_time().await?,
            server_time: self.server_time().await?,
        })
    }
}

/// libSQL implementation of `SessionProvider` backed by the settings table
pub struct LibSqlSessionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSessionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM settings WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }

    async fn delete_setting(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?", [key])
            .await?;
        Ok(())
    }

    async fn get_timestamp(&self, key: &str) -> Result<Option<i64>> {
        self.get_setting(key)
            .await?
            .map(|value| {
                value
                    .parse::<i64>()
                    .map_err(|_| Error::Database(format!("corrupt timestamp for '{key}': {value}")))
            })
            .transpose()
    }
}

impl SessionProvider for LibSqlSessionRepository<'_> {
    async fn current_user(&self) -> Result<Option<User>> {
        let Some(id) = self.get_setting(KEY_USER_ID).await? else {
            return Ok(None);
        };
        let email = self.get_setting(KEY_USER_EMAIL).await?;
        Ok(Some(User { id, email }))
    }

    async fn set_current_user(&self, user: &User) -> Result<()> {
        let id = user.id.trim();
        if id.is_empty() {
            return Err(Error::InvalidInput("user id must not be empty".into()));
        }

        self.set_setting(KEY_USER_ID, id).await?;
        match user.email.as_deref() {
            Some(email) => self.set_setting(KEY_USER_EMAIL, email).await,
            None => self.delete_setting(KEY_USER_EMAIL).await,
        }
    }

    async fn clear_current_user(&self) -> Result<()> {
        for key in [KEY_USER_ID, KEY_USER_EMAIL, KEY_LAST_SYNC_TIME, KEY_SERVER_TIME] {
            self.delete_setting(key).await?;
        }
        Ok(())
    }

    async fn last_sync_time(&self) -> Result<i64> {
        Ok(self.get_timestamp(KEY_LAST_SYNC_TIME).await?.unwrap_or(0))
    }

    async fn update_last_sync_time(&self, timestamp: i64) -> Result<()> {
        self.set_setting(KEY_LAST_SYNC_TIME, &timestamp.to_string())
            .await
    }

    async fn server_time(&self) -> Result<Option<i64>> {
        self.get_timestamp(KEY_SERVER_TIME).await
    }

    async fn update_server_time(&self, timestamp: i64) -> Result<()> {
        self.set_setting(KEY_SERVER_TIME, &timestamp.to_string())
            .await
    }
}
