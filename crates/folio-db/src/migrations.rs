use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS kv (
            key         TEXT PRIMARY KEY,
            value       TEXT NOT NULL,
            -- unix millis; NULL never expires
            expires_at  INTEGER,
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_kv_expires
            ON kv(expires_at) WHERE expires_at IS NOT NULL;
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
