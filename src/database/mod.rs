use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tokio::sync::OnceCell;

use crate::bot_state::{BotStateError, SessionRepository};
use crate::models::Session;

static DATABASE: OnceCell<Database> = OnceCell::const_new();

#[derive(Clone, Debug)]
pub struct Database {
    pub pool: PgPool,
}

/// Process-wide handle, connected on first use and reused afterwards.
///
/// A failed attempt leaves the cell empty, so the next call reconnects.
pub async fn connect(database_url: &str) -> Result<Database, sqlx::Error> {
    DATABASE
        .get_or_try_init(|| async {
            let db = Database::new(database_url).await;
            if let Err(e) = &db {
                log::error!("Failed to connect to database: {}", e);
            }
            db
        })
        .await
        .cloned()
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(1800))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        Ok(Database { pool })
    }

    pub async fn init(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_sessions (
                user_id TEXT PRIMARY KEY,
                session JSONB NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SessionRepository for Database {
    async fn load(&self, user_id: &str) -> Result<Option<Session>, BotStateError> {
        let row = sqlx::query("SELECT session FROM user_sessions WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let session: serde_json::Value = row.try_get("session")?;
                Ok(Some(serde_json::from_value(session)?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, session: &Session) -> Result<(), BotStateError> {
        let session_json = serde_json::to_value(session)?;

        sqlx::query(
            r#"
            INSERT INTO user_sessions (user_id, session, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id)
            DO UPDATE SET
                session = EXCLUDED.session,
                updated_at = NOW()
            "#,
        )
        .bind(&session.user_id)
        .bind(session_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
