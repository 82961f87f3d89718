use async_trait::async_trait;
use tokio::sync::broadcast;

use storefront_types::models::{Message, NewMessage, Profile};

use crate::error::Result;

/// "participants array contains" filter, the only query shape the views need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFilter {
    pub participant: String,
}

impl MessageFilter {
    pub fn participant_contains(id: &str) -> Self {
        Self {
            participant: id.to_string(),
        }
    }
}

/// Published after every write that changes the `messages` collection.
#[derive(Debug, Clone)]
pub struct ChangeNotice {
    pub message_id: String,
}

/// Append-only message store with change notification.
#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    /// Full current result set for `filter`, oldest first.
    async fn fetch(&self, filter: &MessageFilter) -> Result<Vec<Message>>;

    /// Create a message. The store assigns the id and the timestamp.
    async fn append(&self, message: NewMessage) -> Result<String>;

    /// Subscribe to change notices. Live queries re-fetch on each one.
    fn changes(&self) -> broadcast::Receiver<ChangeNotice>;
}

/// Display identity lookup for a participant id.
#[async_trait]
pub trait ProfileLookup: Send + Sync + 'static {
    async fn profile(&self, user_id: &str) -> Result<Option<Profile>>;
}
