use serde::{Deserialize, Serialize};

use crate::models::{ConversationSummary, Message, Role};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the session and opened the messaging surface
    Ready { uid: String, role: Role },

    /// Support inbox was rebuilt; replaces the previous list wholesale
    InboxUpdate { conversations: Vec<ConversationSummary> },

    /// Transcript of the active conversation changed
    TranscriptUpdate {
        other_party_id: Option<String>,
        loading: bool,
        messages: Vec<Message>,
        error: Option<String>,
    },

    /// A send was ignored because there was nothing to send
    SendRejected { reason: SendRejection },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendRejection {
    EmptyText,
    NoConversationSelected,
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Support only: switch the transcript to another customer
    SelectConversation { other_party_id: String },

    /// Submit the given text through the composer
    SendMessage { text: String },
}
