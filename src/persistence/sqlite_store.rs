//! `SQLite`-backed [`KeyValueStore`].

use std::sync::Arc;

use chrono::Utc;

use super::db::Database;
use super::{KeyValueStore, StoreFuture};

/// Key-value store persisted in the `kv_store` table.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    /// Create a new store over an already-bootstrapped database.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl KeyValueStore for SqliteStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let value: Option<String> =
                sqlx::query_scalar("SELECT value FROM kv_store WHERE key = ?1")
                    .bind(key)
                    .fetch_optional(self.db.as_ref())
                    .await?;
            Ok(value)
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let updated_at = Utc::now().to_rfc3339();
            sqlx::query(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(key)
            .bind(value)
            .bind(&updated_at)
            .execute(self.db.as_ref())
            .await?;
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query("DELETE FROM kv_store WHERE key = ?1")
                .bind(key)
                .execute(self.db.as_ref())
                .await?;
            Ok(())
        })
    }
}
