use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error, warn};
use uuid::Uuid;

use storefront_db::Database;
use storefront_db::models::MessageRow;
use storefront_types::models::{CreatedAt, Message, NewMessage, Participants, Profile};

use crate::error::Result;
use crate::store::{ChangeNotice, MessageFilter, MessageStore, ProfileLookup};

/// SQLite-backed message store. Cloning shares the database and the change
/// channel, so every clone sees every other clone's writes.
#[derive(Clone)]
pub struct DbStore {
    inner: Arc<DbStoreInner>,
}

struct DbStoreInner {
    db: Database,

    /// Change notices; all live queries re-fetch on every notice
    changes_tx: broadcast::Sender<ChangeNotice>,
}

impl DbStore {
    pub fn new(db: Database) -> Self {
        let (changes_tx, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(DbStoreInner { db, changes_tx }),
        }
    }

    pub fn database(&self) -> &Database {
        &self.inner.db
    }

    fn notify(&self, message_id: &str) {
        let _ = self.inner.changes_tx.send(ChangeNotice {
            message_id: message_id.to_string(),
        });
    }
}

#[async_trait]
impl MessageStore for DbStore {
    async fn fetch(&self, filter: &MessageFilter) -> Result<Vec<Message>> {
        // Run blocking DB query off the async runtime
        let inner = self.inner.clone();
        let participant = filter.participant.clone();
        let rows = tokio::task::spawn_blocking(move || inner.db.get_messages_with_participant(&participant))
            .await??;

        Ok(rows.into_iter().map(message_from_row).collect())
    }

    async fn append(&self, message: NewMessage) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let participants_json = serde_json::to_string(&message.participants)?;

        let inner = self.inner.clone();
        let mid = id.clone();
        tokio::task::spawn_blocking(move || {
            inner.db.insert_message(
                &mid,
                &message.sender_id,
                &message.sender_name,
                &message.receiver_id,
                &participants_json,
                &message.text,
            )
        })
        .await??;

        // Local echo: listeners see the message before it has a timestamp.
        self.notify(&id);

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let inner = self.inner.clone();
        let mid = id.clone();
        let stamped = tokio::task::spawn_blocking(move || {
            inner.db.stamp_created_at(&mid, &now).map_err(|e| {
                // Roll back so a manual resend does not duplicate the message.
                // If the rollback fails too, the message stays and counts as sent.
                let rollback = inner.db.discard_pending(&mid);
                (e, rollback)
            })
        })
        .await?;

        let result: Result<String> = match stamped {
            Ok(stamp) => {
                debug!("Message {} stamped at {}", id, stamp);
                Ok(id.clone())
            }
            Err((e, Ok(()))) => {
                error!("Failed to stamp message {}, write rolled back: {}", id, e);
                Err(e.into())
            }
            Err((e, Err(rollback))) => {
                error!("Failed to stamp message {} and to roll it back ({}); keeping it pending: {}", id, rollback, e);
                Ok(id.clone())
            }
        };

        self.notify(&id);
        result
    }

    fn changes(&self) -> broadcast::Receiver<ChangeNotice> {
        self.inner.changes_tx.subscribe()
    }
}

#[async_trait]
impl ProfileLookup for DbStore {
    async fn profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let inner = self.inner.clone();
        let uid = user_id.to_string();
        let row = tokio::task::spawn_blocking(move || inner.db.get_user_by_id(&uid)).await??;

        Ok(row.map(|row| Profile {
            display_name: row.display_name,
            email: row.email,
        }))
    }
}

/// Corrupt columns degrade instead of failing the feed: a bad timestamp
/// reads as unresolved, a bad participants array as empty.
fn message_from_row(row: MessageRow) -> Message {
    let participants = serde_json::from_str::<Vec<String>>(&row.participants)
        .map(Participants::from_raw)
        .unwrap_or_else(|e| {
            warn!("Corrupt participants '{}' on message '{}': {}", row.participants, row.id, e);
            Participants::default()
        });

    let created_at = match row.created_at.as_deref() {
        None => CreatedAt::Pending,
        Some(raw) => parse_timestamp(raw).map_or_else(
            || {
                warn!("Corrupt created_at '{}' on message '{}'", raw, row.id);
                CreatedAt::Pending
            },
            CreatedAt::Resolved,
        ),
    };

    Message {
        id: row.id,
        sender_id: row.sender_id,
        sender_name: row.sender_name,
        receiver_id: row.receiver_id,
        participants,
        text: row.message,
        created_at,
        is_read: row.is_read,
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by SQLite's datetime('now') carry no timezone.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_types::SUPPORT_ID;

    fn store() -> DbStore {
        DbStore::new(Database::open_in_memory().unwrap())
    }

    fn from_customer(uid: &str, text: &str) -> NewMessage {
        NewMessage {
            sender_id: uid.into(),
            sender_name: "Customer".into(),
            receiver_id: SUPPORT_ID.into(),
            participants: Participants::with_support(uid),
            text: text.into(),
        }
    }

    #[tokio::test]
    async fn appended_messages_come_back_resolved() {
        let store = store();
        let id = store.append(from_customer("u1", "Hello")).await.unwrap();

        let messages = store.fetch(&MessageFilter::participant_contains(SUPPORT_ID)).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, id);
        assert_eq!(messages[0].text, "Hello");
        assert_eq!(messages[0].receiver_id, SUPPORT_ID);
        assert!(messages[0].created_at.is_resolved());
        assert!(!messages[0].is_read);
    }

    #[tokio::test]
    async fn append_publishes_pending_then_resolved_notices() {
        let store = store();
        let mut changes = store.changes();
        let id = store.append(from_customer("u1", "Hello")).await.unwrap();

        assert_eq!(changes.recv().await.unwrap().message_id, id);
        assert_eq!(changes.recv().await.unwrap().message_id, id);
    }

    #[tokio::test]
    async fn fetch_filters_by_participant() {
        let store = store();
        store.append(from_customer("u1", "from u1")).await.unwrap();
        store.append(from_customer("u2", "from u2")).await.unwrap();

        let u2 = store.fetch(&MessageFilter::participant_contains("u2")).await.unwrap();
        assert_eq!(u2.len(), 1);
        assert_eq!(u2[0].text, "from u2");
    }

    #[tokio::test]
    async fn corrupt_rows_degrade() {
        let store = store();
        store
            .database()
            .insert_message("m1", "u1", "x", SUPPORT_ID, r#"["u1","admin"]"#, "hi")
            .unwrap();
        store.database().with_conn(|conn| {
            conn.execute("UPDATE messages SET created_at = 'yesterday' WHERE id = 'm1'", [])?;
            Ok(())
        })
        .unwrap();

        let messages = store.fetch(&MessageFilter::participant_contains("u1")).await.unwrap();
        assert_eq!(messages[0].created_at, CreatedAt::Pending);
    }

    #[tokio::test]
    async fn profile_lookup() {
        let store = store();
        store.database().put_user("u1", Some("Ana"), Some("ana@example.com")).unwrap();

        let profile = store.profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Ana"));
        assert!(store.profile("ghost").await.unwrap().is_none());
    }

    /// Make every stamp (UPDATE) fail, and optionally every rollback (DELETE).
    fn break_writes(store: &DbStore, also_rollback: bool) {
        store
            .database()
            .with_conn(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER reject_stamp BEFORE UPDATE ON messages
                     BEGIN SELECT RAISE(ABORT, 'stamp rejected'); END;",
                )?;
                if also_rollback {
                    conn.execute_batch(
                        "CREATE TRIGGER reject_delete BEFORE DELETE ON messages
                         BEGIN SELECT RAISE(ABORT, 'delete rejected'); END;",
                    )?;
                }
                Ok(())
            })
            .unwrap();
    }

    #[tokio::test]
    async fn failed_stamp_rolls_back_the_pending_row() {
        let store = store();
        break_writes(&store, false);
        let mut changes = store.changes();

        assert!(store.append(from_customer("u1", "Hello")).await.is_err());

        let messages = store.fetch(&MessageFilter::participant_contains("u1")).await.unwrap();
        assert!(messages.is_empty());
        // Listeners that saw the pending echo are told it went away.
        assert!(changes.recv().await.is_ok());
        assert!(changes.recv().await.is_ok());
    }

    #[tokio::test]
    async fn unrecoverable_stamp_failure_counts_as_sent() {
        let store = store();
        break_writes(&store, true);

        let id = store.append(from_customer("u1", "Hello")).await.unwrap();

        let messages = store.fetch(&MessageFilter::participant_contains("u1")).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, id);
        assert_eq!(messages[0].created_at, CreatedAt::Pending);
    }

    #[tokio::test]
    async fn corrupt_neighbour_does_not_poison_new_stamps() {
        let store = store();
        store
            .database()
            .insert_message("old", "u1", "x", SUPPORT_ID, r#"["u1","admin"]"#, "imported")
            .unwrap();
        store
            .database()
            .with_conn(|conn| {
                conn.execute("UPDATE messages SET created_at = 'yesterday' WHERE id = 'old'", [])?;
                Ok(())
            })
            .unwrap();

        let id = store.append(from_customer("u1", "fresh")).await.unwrap();

        let messages = store.fetch(&MessageFilter::participant_contains("u1")).await.unwrap();
        let fresh = messages.iter().find(|m| m.id == id).unwrap();
        assert!(fresh.created_at.is_resolved());
    }

    #[test]
    fn parses_both_timestamp_formats() {
        assert!(parse_timestamp("2025-01-01T10:00:00.500Z").is_some());
        assert!(parse_timestamp("2025-01-01 10:00:00").is_some());
        assert!(parse_timestamp("soon").is_none());
    }
}
