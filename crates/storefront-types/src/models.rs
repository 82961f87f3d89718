use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::SUPPORT_ID;

/// Store-assigned creation time of a message.
///
/// A write is `Pending` between local submission and the store stamping it.
/// Pending values are not comparable with resolved ones; callers pick the
/// ordering policy that fits their view (see `inbox_key` / `transcript_cmp`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<DateTime<Utc>>", into = "Option<DateTime<Utc>>")]
pub enum CreatedAt {
    Pending,
    Resolved(DateTime<Utc>),
}

impl CreatedAt {
    pub fn resolved(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Pending => None,
            Self::Resolved(ts) => Some(*ts),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// Recency key for ranking: pending sorts as age zero, below every
    /// resolved timestamp.
    pub fn inbox_key(&self) -> Option<DateTime<Utc>> {
        self.resolved()
    }

    /// Ascending transcript order: resolved by time, pending after all
    /// resolved. Equal keys compare `Equal` so a stable sort keeps arrival order.
    pub fn transcript_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Resolved(a), Self::Resolved(b)) => a.cmp(b),
            (Self::Resolved(_), Self::Pending) => Ordering::Less,
            (Self::Pending, Self::Resolved(_)) => Ordering::Greater,
            (Self::Pending, Self::Pending) => Ordering::Equal,
        }
    }
}

impl From<Option<DateTime<Utc>>> for CreatedAt {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(Self::Pending, Self::Resolved)
    }
}

impl From<CreatedAt> for Option<DateTime<Utc>> {
    fn from(value: CreatedAt) -> Self {
        value.resolved()
    }
}

/// The two members of a conversation: one customer id and `SUPPORT_ID`.
///
/// Stored records are not trusted to hold the invariant, so the accessors
/// below answer conservatively for malformed sets.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Participants(Vec<String>);

impl Participants {
    pub fn with_support(customer_id: &str) -> Self {
        Self(vec![customer_id.to_string(), SUPPORT_ID.to_string()])
    }

    pub fn from_raw(members: Vec<String>) -> Self {
        Self(members)
    }

    pub fn members(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|p| p == id)
    }

    /// The non-support member, which keys the conversation.
    pub fn other_party(&self) -> Option<&str> {
        self.0.iter().map(String::as_str).find(|p| *p != SUPPORT_ID)
    }

    /// True iff the member set is exactly `{customer_id, SUPPORT_ID}`.
    pub fn is_pair(&self, customer_id: &str) -> bool {
        customer_id != SUPPORT_ID
            && self.contains(customer_id)
            && self.contains(SUPPORT_ID)
            && self.0.iter().all(|p| p == customer_id || p == SUPPORT_ID)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub receiver_id: String,
    pub participants: Participants,
    #[serde(rename = "message")]
    pub text: String,
    pub created_at: CreatedAt,
    pub is_read: bool,
}

/// A message as submitted by the composer, before the store assigns an id
/// and a timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub sender_id: String,
    pub sender_name: String,
    pub receiver_id: String,
    pub participants: Participants,
    pub text: String,
}

/// One row of the support inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub other_party_id: String,
    pub display_name: String,
    pub email: String,
    pub last_message: Message,
    // Always 0: nothing marks messages read yet.
    pub unread_count: u32,
}

/// Display identity from the `users` collection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl Profile {
    pub const PLACEHOLDER_NAME: &'static str = "User";

    /// Display name, else email, else the placeholder.
    pub fn display_label(&self) -> String {
        self.display_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.email.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or(Self::PLACEHOLDER_NAME)
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "admin")]
    Support,
    #[serde(rename = "user")]
    Customer,
}

/// The acting identity behind a messaging surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub uid: String,
    pub role: Role,
    /// Snapshotted into `sender_name` on every send.
    pub display_name: String,
}

impl Viewer {
    pub fn is_support(&self) -> bool {
        self.role == Role::Support
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn pair_requires_exact_member_set() {
        assert!(Participants::with_support("u1").is_pair("u1"));
        assert!(!Participants::with_support("u1").is_pair("u2"));
        assert!(!Participants::from_raw(vec!["u1".into(), "u2".into()]).is_pair("u1"));
        assert!(!Participants::from_raw(vec!["u1".into(), "admin".into(), "u2".into()]).is_pair("u1"));
        assert!(!Participants::from_raw(vec!["admin".into(), "admin".into()]).is_pair("admin"));
    }

    #[test]
    fn other_party_skips_support() {
        let p = Participants::from_raw(vec!["admin".into(), "u7".into()]);
        assert_eq!(p.other_party(), Some("u7"));
        assert_eq!(Participants::from_raw(vec!["admin".into()]).other_party(), None);
    }

    #[test]
    fn created_at_serializes_as_nullable_timestamp() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(serde_json::to_value(CreatedAt::Pending).unwrap(), serde_json::Value::Null);
        let back: CreatedAt = serde_json::from_value(serde_json::to_value(CreatedAt::Resolved(ts)).unwrap()).unwrap();
        assert_eq!(back, CreatedAt::Resolved(ts));
    }

    #[test]
    fn pending_sorts_after_resolved_in_transcripts() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(CreatedAt::Pending.transcript_cmp(&CreatedAt::Resolved(ts)), Ordering::Greater);
        assert_eq!(CreatedAt::Pending.transcript_cmp(&CreatedAt::Pending), Ordering::Equal);
        assert!(CreatedAt::Pending.inbox_key() < CreatedAt::Resolved(ts).inbox_key());
    }

    #[test]
    fn display_label_falls_back_to_email_then_placeholder() {
        let full = Profile { display_name: Some("Ana".into()), email: Some("ana@x.io".into()) };
        let email_only = Profile { display_name: None, email: Some("bo@x.io".into()) };
        assert_eq!(full.display_label(), "Ana");
        assert_eq!(email_only.display_label(), "bo@x.io");
        assert_eq!(Profile::default().display_label(), "User");
    }

    #[test]
    fn message_uses_store_field_names() {
        let msg = Message {
            id: "m1".into(),
            sender_id: "u1".into(),
            sender_name: "Ana".into(),
            receiver_id: SUPPORT_ID.into(),
            participants: Participants::with_support("u1"),
            text: "Hello".into(),
            created_at: CreatedAt::Pending,
            is_read: false,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["message"], "Hello");
        assert_eq!(json["senderId"], "u1");
        assert_eq!(json["participants"], serde_json::json!(["u1", "admin"]));
        assert!(json["createdAt"].is_null());
        assert_eq!(json["isRead"], false);
    }
}
