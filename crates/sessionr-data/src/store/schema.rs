use super::error::{Result, StoreError};
use rusqlite::Connection;

pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS bars (
            symbol      TEXT NOT NULL,
            interval    TEXT NOT NULL,
            timestamp   INTEGER NOT NULL,
            open        REAL NOT NULL,
            high        REAL NOT NULL,
            low         REAL NOT NULL,
            close       REAL NOT NULL,
            volume      INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (symbol, interval, timestamp)
        );
        CREATE INDEX IF NOT EXISTS idx_bars_symbol_interval
            ON bars (symbol, interval, timestamp);

        CREATE TABLE IF NOT EXISTS calendar_days (
            date            TEXT NOT NULL PRIMARY KEY,
            is_holiday      INTEGER NOT NULL DEFAULT 0,
            regular_open    TEXT NOT NULL,
            regular_close   TEXT NOT NULL,
            early_close     TEXT,
            exchange_group  TEXT NOT NULL
        );",
    )
    .map_err(|e| StoreError::Initialization(e.to_string()))?;

    Ok(())
}
