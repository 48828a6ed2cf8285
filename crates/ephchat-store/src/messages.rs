//! CRUD operations on the `messages` log.

use rusqlite::{params, Row};
use tracing::debug;

use ephchat_shared::{MessageId, MessageRecord, StoredMessage, ThreadId};

use crate::database::Database;
use crate::error::Result;

/// Rows read by [`Database::messages_after`].
#[derive(Debug, Default)]
pub struct MessageBatch {
    pub messages: Vec<StoredMessage>,
    /// Highest sequence number read, skipped rows included. Never below
    /// the `after_seq` the batch was read with.
    pub last_seq: u64,
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRecord> {
    Ok(MessageRecord {
        name: row.get(1)?,
        text: row.get(2)?,
        time: row.get(3)?,
    })
}

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Append a record to a thread and return its store-assigned id.
    pub fn insert_message(&self, thread: &ThreadId, record: &MessageRecord) -> Result<MessageId> {
        self.conn().execute(
            "INSERT INTO messages (thread_id, name, text, time)
             VALUES (?1, ?2, ?3, ?4)",
            params![thread.as_str(), record.name, record.text, record.time],
        )?;
        let seq = self.conn().last_insert_rowid();
        Ok(MessageId::from_seq(seq as u64))
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Records of `thread` with a sequence number above `after_seq`, in
    /// arrival order.
    ///
    /// Rows that do not decode (e.g. a non-integer `time`) are skipped but
    /// still count towards `last_seq`, so the next poll starts past them.
    pub fn messages_after(&self, thread: &ThreadId, after_seq: u64) -> Result<MessageBatch> {
        let mut stmt = self.conn().prepare(
            "SELECT seq, name, text, time
             FROM messages
             WHERE thread_id = ?1 AND seq > ?2
             ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map(params![thread.as_str(), after_seq as i64], |row| {
            let seq: i64 = row.get(0)?;
            Ok((seq as u64, record_from_row(row)))
        })?;

        let mut batch = MessageBatch {
            messages: Vec::new(),
            last_seq: after_seq,
        };
        for row in rows {
            let (seq, record): (u64, rusqlite::Result<MessageRecord>) = row?;
            batch.last_seq = batch.last_seq.max(seq);
            match record {
                Ok(record) => batch.messages.push(StoredMessage {
                    id: MessageId::from_seq(seq),
                    record,
                }),
                Err(e) => debug!(thread = %thread, seq, error = %e, "skipping malformed record"),
            }
        }
        Ok(batch)
    }

    /// Distinct thread ids, ordered by their oldest surviving record.
    pub fn list_thread_ids(&self) -> Result<Vec<ThreadId>> {
        let mut stmt = self.conn().prepare(
            "SELECT thread_id
             FROM messages
             GROUP BY thread_id
             ORDER BY MIN(seq) ASC",
        )?;

        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut threads = Vec::new();
        for row in rows {
            threads.push(ThreadId::from_raw(row?));
        }
        Ok(threads)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete every record of `thread` with `time <= cutoff_millis`.
    pub fn delete_messages_up_to(&self, thread: &ThreadId, cutoff_millis: i64) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM messages WHERE thread_id = ?1 AND time <= ?2",
            params![thread.as_str(), cutoff_millis],
        )?;
        Ok(affected)
    }

    pub fn delete_message(&self, thread: &ThreadId, id: &MessageId) -> Result<bool> {
        let Some(seq) = id.seq() else {
            return Ok(false);
        };
        let affected = self.conn().execute(
            "DELETE FROM messages WHERE thread_id = ?1 AND seq = ?2",
            params![thread.as_str(), seq as i64],
        )?;
        Ok(affected > 0)
    }

    pub fn delete_thread(&self, thread: &ThreadId) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM messages WHERE thread_id = ?1",
            params![thread.as_str()],
        )?;
        Ok(affected)
    }
}
