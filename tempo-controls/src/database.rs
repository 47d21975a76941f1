use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite, SqlitePool, sqlite::SqliteConnectOptions};
use tracing::debug;

use crate::{
    Error, Result,
    persistence::Store,
    player::{DEFAULT_REWIND_THRESHOLD_MS, PlayerSettings},
    session::{SecondaryActionMode, SessionSettings},
};

pub struct Database {
    pool: Pool<Sqlite>,
}

/// Stored defaults, overridable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configuration {
    pub rewind_threshold_ms: u64,
    pub shuffle_by_default: bool,
    pub secondary_action: SecondaryActionMode,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            rewind_threshold_ms: DEFAULT_REWIND_THRESHOLD_MS,
            shuffle_by_default: false,
            secondary_action: SecondaryActionMode::default(),
        }
    }
}

impl Configuration {
    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            rewind_threshold_ms: self.rewind_threshold_ms,
            shuffle_by_default: self.shuffle_by_default,
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            secondary_action: self.secondary_action,
        }
    }
}

impl Database {
    pub async fn new() -> Result<Self> {
        let database_url = if let Ok(url) = std::env::var("DATABASE_URL") {
            PathBuf::from(url.replace("sqlite://", ""))
        } else {
            let Some(mut url) = dirs::data_local_dir() else {
                return Err(Error::DatabaseLocationError);
            };
            url.push("tempo");

            if !url.exists() {
                let Ok(_) = std::fs::create_dir_all(&url) else {
                    return Err(Error::DatabaseLocationError);
                };
            }

            url.push("data.db");

            url
        };

        debug!(path = %database_url.display(), "opening database");
        let options = SqliteConnectOptions::new()
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .filename(database_url)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options).await?;

        Database::init(pool).await
    }

    pub async fn init(pool: Pool<Sqlite>) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;

        create_configuration(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn get_configuration(&self) -> Result<Configuration> {
        let row = sqlx::query(
            r#"
            SELECT rewind_threshold_ms, shuffle_by_default, secondary_action
            FROM configuration
            WHERE ROWID = 1;
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let rewind_threshold_ms: i64 = row.try_get("rewind_threshold_ms")?;
        let secondary_action: String = row.try_get("secondary_action")?;

        Ok(Configuration {
            rewind_threshold_ms: rewind_threshold_ms.max(0) as u64,
            shuffle_by_default: row.try_get("shuffle_by_default")?,
            secondary_action: SecondaryActionMode::parse(&secondary_action).unwrap_or_default(),
        })
    }

    pub async fn set_rewind_threshold(&self, rewind_threshold_ms: u64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE configuration
            SET rewind_threshold_ms=?1
            WHERE ROWID = 1
            "#,
        )
        .bind(rewind_threshold_ms as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn set_shuffle_by_default(&self, shuffle_by_default: bool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE configuration
            SET shuffle_by_default=?1
            WHERE ROWID = 1
            "#,
        )
        .bind(shuffle_by_default)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn set_secondary_action(&self, secondary_action: SecondaryActionMode) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE configuration
            SET secondary_action=?1
            WHERE ROWID = 1
            "#,
        )
        .bind(secondary_action.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Store for Database {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT value FROM blobs WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => Some(row.try_get("value")?),
            None => None,
        })
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO blobs (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

async fn create_configuration(pool: &Pool<Sqlite>) -> Result<()> {
    let rowid = 1;
    sqlx::query(
        r#"
            INSERT OR IGNORE INTO configuration (ROWID) VALUES (?1);
            "#,
    )
    .bind(rowid)
    .execute(pool)
    .await?;
    Ok(())
}
