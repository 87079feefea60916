//! Usage: SQLite schema migrations (user_version + incremental upgrades).

use crate::shared::error::{db_err, AppResult};
use rusqlite::Connection;

const LATEST_SCHEMA_VERSION: i64 = 1;

pub(super) fn apply_migrations(conn: &mut Connection) -> AppResult<()> {
    let mut user_version = read_user_version(conn)?;

    if user_version < 0 || user_version > LATEST_SCHEMA_VERSION {
        return Err(format!(
            "DB_ERROR: unsupported sqlite schema version: user_version={user_version} (expected 0..={LATEST_SCHEMA_VERSION})"
        )
        .into());
    }

    let start_version = user_version;
    while user_version < LATEST_SCHEMA_VERSION {
        match user_version {
            0 => migrate_v0_to_v1(conn)?,
            v => {
                return Err(format!(
                    "DB_ERROR: no migration path from sqlite schema version {v}"
                )
                .into());
            }
        }
        user_version = read_user_version(conn)?;
    }

    if start_version != user_version {
        tracing::info!(
            from_version = start_version,
            to_version = user_version,
            "sqlite schema migrated"
        );
    }
    Ok(())
}

fn read_user_version(conn: &Connection) -> AppResult<i64> {
    conn.query_row("PRAGMA user_version", [], |row| row.get::<_, i64>(0))
        .map_err(|e| db_err!("failed to read sqlite user_version: {e}"))
}

fn migrate_v0_to_v1(conn: &mut Connection) -> AppResult<()> {
    let tx = conn
        .transaction()
        .map_err(|e| db_err!("failed to start sqlite transaction: {e}"))?;

    tx.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS token_cache (
  cache_key TEXT PRIMARY KEY,
  token TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);

PRAGMA user_version = 1;
"#,
    )
    .map_err(|e| db_err!("failed to migrate sqlite schema v0->v1: {e}"))?;

    tx.commit()
        .map_err(|e| db_err!("failed to commit sqlite migration v0->v1: {e}"))
}
