//! v001 -- Initial schema creation.
//!
//! Creates `messages` (the per-thread log) and `device_flags`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages: threads/{thread_id}/{seq}
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    seq       INTEGER PRIMARY KEY AUTOINCREMENT,  -- store-assigned, arrival order
    thread_id TEXT NOT NULL,                      -- normalized thread name
    name      TEXT NOT NULL,                      -- sender display name
    text      TEXT NOT NULL,
    time      INTEGER NOT NULL                    -- sender clock, epoch millis
);

CREATE INDEX IF NOT EXISTS idx_messages_thread_seq
    ON messages(thread_id, seq);

CREATE INDEX IF NOT EXISTS idx_messages_thread_time
    ON messages(thread_id, time);

-- ----------------------------------------------------------------
-- Per-device flags (survive logout)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS device_flags (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL                           -- JSON
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
