use tracing::{error, info};

use storefront_types::SUPPORT_ID;
use storefront_types::events::SendRejection;
use storefront_types::models::{NewMessage, Participants, Viewer};

use crate::store::MessageStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { id: String },
    /// Nothing was written and the buffer is unchanged
    Skipped(SendRejection),
    /// The store rejected the write; the buffer is kept for a manual retry
    Failed,
}

/// Address `text` from `viewer`. Customers always write to support; support
/// writes to the selected conversation and cannot send without one.
pub fn address(text: &str, viewer: &Viewer, selected: Option<&str>) -> Result<NewMessage, SendRejection> {
    if text.trim().is_empty() {
        return Err(SendRejection::EmptyText);
    }

    let (receiver_id, participants) = if viewer.is_support() {
        let customer = selected.ok_or(SendRejection::NoConversationSelected)?;
        (customer.to_string(), Participants::with_support(customer))
    } else {
        (SUPPORT_ID.to_string(), Participants::with_support(&viewer.uid))
    };

    Ok(NewMessage {
        sender_id: viewer.uid.clone(),
        sender_name: viewer.display_name.clone(),
        receiver_id,
        participants,
        text: text.to_string(),
    })
}

/// Input buffer plus submission.
#[derive(Debug, Default)]
pub struct Composer {
    input: String,
}

impl Composer {
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Submit the buffer. Views pick the message up through their live
    /// subscriptions, so no refresh is triggered here.
    pub async fn send(&mut self, store: &dyn MessageStore, viewer: &Viewer, selected: Option<&str>) -> SendOutcome {
        let draft = match address(&self.input, viewer, selected) {
            Ok(draft) => draft,
            Err(reason) => return SendOutcome::Skipped(reason),
        };

        match store.append(draft).await {
            Ok(id) => {
                info!("{} sent message {}", viewer.uid, id);
                self.input.clear();
                SendOutcome::Sent { id }
            }
            Err(e) => {
                error!("Error sending message from {}: {}", viewer.uid, e);
                SendOutcome::Failed
            }
        }
    }
}
