//! Usage: Token cache (key -> token) with in-memory and SQLite-backed stores.

use crate::infra::db::Db;
use crate::shared::error::{db_err, AppResult};
use crate::shared::mutex_ext::MutexExt;
use crate::shared::time::now_unix_seconds;
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::sync::Mutex;

/// Fixed cache key of the front-door id token.
pub const ID_TOKEN_CACHE_KEY: &str = "id_token";

/// `clientId + JSON(scopes)`, e.g. `abc["https://graph.microsoft.com/.default"]`.
pub fn cache_key(client_id: &str, scopes: &[String]) -> String {
    let serialized = serde_json::to_string(scopes).unwrap_or_else(|_| "[]".to_string());
    format!("{client_id}{serialized}")
}

pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<String>>;

    fn set(&self, key: &str, token: &str) -> AppResult<()>;

    fn remove(&self, key: &str) -> AppResult<()>;

    /// Removes every entry whose key starts with `prefix`; returns the number removed.
    fn remove_by_prefix(&self, prefix: &str) -> AppResult<usize>;
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock_or_recover().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries.lock_or_recover().get(key).cloned())
    }

    fn set(&self, key: &str, token: &str) -> AppResult<()> {
        self.entries
            .lock_or_recover()
            .insert(key.to_string(), token.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        self.entries.lock_or_recover().remove(key);
        Ok(())
    }

    fn remove_by_prefix(&self, prefix: &str) -> AppResult<usize> {
        let mut entries = self.entries.lock_or_recover();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before - entries.len())
    }
}

#[derive(Clone)]
pub struct SqliteTokenStore {
    db: Db,
}

impl SqliteTokenStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

impl TokenStore for SqliteTokenStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let conn = self.db.open_connection()?;
        conn.query_row(
            "SELECT token FROM token_cache WHERE cache_key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|e| db_err!("failed to read token cache: {e}"))
    }

    fn set(&self, key: &str, token: &str) -> AppResult<()> {
        let conn = self.db.open_connection()?;
        conn.execute(
            r#"
INSERT INTO token_cache (cache_key, token, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(cache_key) DO UPDATE SET token = excluded.token, updated_at = excluded.updated_at
"#,
            params![key, token, now_unix_seconds()],
        )
        .map_err(|e| db_err!("failed to write token cache: {e}"))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let conn = self.db.open_connection()?;
        conn.execute("DELETE FROM token_cache WHERE cache_key = ?1", params![key])
            .map_err(|e| db_err!("failed to delete token cache entry: {e}"))?;
        Ok(())
    }

    fn remove_by_prefix(&self, prefix: &str) -> AppResult<usize> {
        let conn = self.db.open_connection()?;
        let pattern = format!("{}%", escape_like(prefix));
        conn.execute(
            "DELETE FROM token_cache WHERE cache_key LIKE ?1 ESCAPE '\\'",
            params![pattern],
        )
        .map_err(|e| db_err!("failed to delete token cache entries: {e}"))
    }
}
