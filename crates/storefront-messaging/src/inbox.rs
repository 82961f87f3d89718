use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures_util::future::join_all;
use tracing::{debug, warn};

use storefront_types::models::{ConversationSummary, CreatedAt, Message, Profile};

use crate::store::ProfileLookup;

/// Latest message of one conversation, before identity resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationGroup {
    pub other_party_id: String,
    pub last_message: Message,
}

/// Fold a support-side batch into one group per customer, in first-seen
/// order. Messages without a non-support participant are skipped.
pub fn group_latest(messages: &[Message]) -> Vec<ConversationGroup> {
    let mut groups: Vec<ConversationGroup> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for message in messages {
        let Some(other) = message.participants.other_party() else {
            debug!("Skipping message {} with no customer participant", message.id);
            continue;
        };

        match index.get(other) {
            Some(&i) => {
                if supersedes(message, &groups[i].last_message) {
                    groups[i].last_message = message.clone();
                }
            }
            None => {
                index.insert(other, groups.len());
                groups.push(ConversationGroup {
                    other_party_id: other.to_string(),
                    last_message: message.clone(),
                });
            }
        }
    }

    groups
}

/// Whether `candidate` should replace `current` as a group's last message.
///
/// A resolved timestamp always beats a pending one and is never displaced by
/// one. Between two pending messages the later arrival wins. Equal resolved
/// timestamps keep the first seen.
fn supersedes(candidate: &Message, current: &Message) -> bool {
    match (candidate.created_at, current.created_at) {
        (CreatedAt::Resolved(a), CreatedAt::Resolved(b)) => a > b,
        (CreatedAt::Resolved(_), CreatedAt::Pending) => true,
        (CreatedAt::Pending, CreatedAt::Resolved(_)) => false,
        (CreatedAt::Pending, CreatedAt::Pending) => true,
    }
}

/// Most recent first; pending conversations at the bottom. Stable.
pub fn rank(mut summaries: Vec<ConversationSummary>) -> Vec<ConversationSummary> {
    summaries.sort_by(|a, b| {
        b.last_message
            .created_at
            .inbox_key()
            .cmp(&a.last_message.created_at.inbox_key())
    });
    summaries
}

/// Profiles resolved on earlier batches, keyed by participant id. Only
/// successful lookups are cached so failures are retried next batch.
#[derive(Clone, Default)]
pub struct ProfileCache {
    inner: Arc<RwLock<HashMap<String, Profile>>>,
}

impl ProfileCache {
    pub fn get(&self, user_id: &str) -> Option<Profile> {
        self.inner.read().ok()?.get(user_id).cloned()
    }

    fn insert(&self, user_id: &str, profile: Profile) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(user_id.to_string(), profile);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|map| map.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolve `(display_name, email)` for a participant. Never fails: a missing
/// profile or a lookup error yields the placeholder identity.
async fn resolve_identity(lookup: &dyn ProfileLookup, cache: &ProfileCache, user_id: &str) -> (String, String) {
    let profile = match cache.get(user_id) {
        Some(profile) => Some(profile),
        None => match lookup.profile(user_id).await {
            Ok(Some(profile)) => {
                cache.insert(user_id, profile.clone());
                Some(profile)
            }
            Ok(None) => {
                debug!("No profile for {}, using placeholder", user_id);
                None
            }
            Err(e) => {
                warn!("Profile lookup failed for {}: {}", user_id, e);
                None
            }
        },
    };

    match profile {
        Some(profile) => {
            let name = profile.display_label();
            (name, profile.email.unwrap_or_default())
        }
        None => (Profile::PLACEHOLDER_NAME.to_string(), String::new()),
    }
}

/// Build the ranked inbox for one batch. Lookups fan out concurrently.
pub async fn build_inbox(messages: &[Message], lookup: &dyn ProfileLookup, cache: &ProfileCache) -> Vec<ConversationSummary> {
    let groups = group_latest(messages);

    let summaries = join_all(groups.into_iter().map(|group| async move {
        let (display_name, email) = resolve_identity(lookup, cache, &group.other_party_id).await;
        ConversationSummary {
            other_party_id: group.other_party_id,
            display_name,
            email,
            last_message: group.last_message,
            unread_count: 0,
        }
    }))
    .await;

    rank(summaries)
}
