use crate::models::{MessageRow, UserRow};
use crate::Database;
use anyhow::{Result, anyhow};
use rusqlite::Connection;

impl Database {
    // -- Users --

    /// Insert or replace a profile. Profiles are owned by user administration;
    /// this exists for seeding and tests.
    pub fn put_user(&self, id: &str, display_name: Option<&str>, email: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, display_name, email) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name, email = excluded.email",
                rusqlite::params![id, display_name, email],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    // -- Messages --

    /// Append a message with an unresolved timestamp.
    pub fn insert_message(
        &self,
        id: &str,
        sender_id: &str,
        sender_name: &str,
        receiver_id: &str,
        participants_json: &str,
        message: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, sender_name, receiver_id, participants, message, created_at, is_read)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, 0)",
                rusqlite::params![id, sender_id, sender_name, receiver_id, participants_json, message],
            )?;
            Ok(())
        })
    }

    /// Stamp a pending message with the server time. The stamp never goes
    /// backwards relative to already-stamped messages, so `created_at` is
    /// non-decreasing in stamp order. Returns the stored value.
    ///
    /// Only RFC 3339 stamps count towards the floor; a corrupt value would
    /// otherwise be copied onto every later message.
    pub fn stamp_created_at(&self, id: &str, now: &str) -> Result<String> {
        self.with_conn(|conn| {
            let latest: Option<String> = conn.query_row(
                "SELECT MAX(created_at) FROM messages
                 WHERE created_at GLOB '[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]T[0-9][0-9]:[0-9][0-9]:[0-9][0-9]*'",
                [],
                |row| row.get(0),
            )?;
            let stamp = match latest {
                Some(latest) if latest.as_str() > now => latest,
                _ => now.to_string(),
            };

            let updated = conn.execute(
                "UPDATE messages SET created_at = ?2 WHERE id = ?1 AND created_at IS NULL",
                rusqlite::params![id, stamp],
            )?;
            if updated == 0 {
                return Err(anyhow!("No pending message with id {}", id));
            }
            Ok(stamp)
        })
    }

    /// Remove a message that was never stamped. Used to roll back a write
    /// the store could not acknowledge; stamped messages are never touched.
    pub fn discard_pending(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM messages WHERE id = ?1 AND created_at IS NULL", [id])?;
            if deleted == 0 {
                return Err(anyhow!("No pending message with id {}", id));
            }
            Ok(())
        })
    }

    /// All messages whose participants array contains `participant`, oldest
    /// first. Unstamped rows come last; ties keep insertion order.
    pub fn get_messages_with_participant(&self, participant: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages_with_participant(conn, participant))
    }
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare("SELECT display_name, email FROM users WHERE id = ?1")?;

    let row = stmt
        .query_row([id], |row| {
            Ok(UserRow {
                display_name: row.get(0)?,
                email: row.get(1)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_messages_with_participant(conn: &Connection, participant: &str) -> Result<Vec<MessageRow>> {
    // A malformed participants column must not fail the whole feed.
    let mut stmt = conn.prepare(
        "SELECT m.id, m.sender_id, m.sender_name, m.receiver_id, m.participants, m.message, m.created_at, m.is_read
         FROM messages m
         WHERE EXISTS (
             SELECT 1 FROM json_each(CASE WHEN json_valid(m.participants) THEN m.participants ELSE '[]' END) p
             WHERE p.value = ?1
         )
         ORDER BY m.created_at IS NULL, m.created_at ASC, m.rowid ASC",
    )?;

    let rows = stmt
        .query_map([participant], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                sender_name: row.get(2)?,
                receiver_id: row.get(3)?,
                participants: row.get(4)?,
                message: row.get(5)?,
                created_at: row.get(6)?,
                is_read: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
