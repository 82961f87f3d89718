use storefront_types::models::Message;

use crate::error::MessagingError;

/// What the consumer of a transcript renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptState {
    /// True from subscribe until the first batch or error
    pub loading: bool,
    pub messages: Vec<Message>,
    /// Last subscription failure. Does not clear `messages`.
    pub error: Option<String>,
}

impl TranscriptState {
    pub fn loading() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }
}

/// Messages of the conversation between `customer_id` and support, oldest
/// first. Ties and pending timestamps keep batch order; pending ones go last.
pub fn select_conversation(batch: Vec<Message>, customer_id: &str) -> Vec<Message> {
    let mut messages: Vec<Message> = batch
        .into_iter()
        .filter(|m| m.participants.is_pair(customer_id))
        .collect();
    messages.sort_by(|a, b| a.created_at.transcript_cmp(&b.created_at));
    messages
}

/// Replace the transcript with a fresh batch.
pub fn apply_batch(_state: TranscriptState, batch: Vec<Message>, customer_id: &str) -> TranscriptState {
    TranscriptState {
        loading: false,
        messages: select_conversation(batch, customer_id),
        error: None,
    }
}

pub fn apply_error(state: TranscriptState, error: &MessagingError) -> TranscriptState {
    TranscriptState {
        loading: false,
        error: Some(error.to_string()),
        ..state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_types::SUPPORT_ID;
    use storefront_types::models::Participants;

    use crate::inbox::tests::msg;

    fn texts(state: &TranscriptState) -> Vec<&str> {
        state.messages.iter().map(|m| m.text.as_str()).collect()
    }

    #[test]
    fn only_the_exact_pair_is_kept() {
        let mut three_way = msg("x", "u1", "group chat", Some(4));
        three_way.participants = Participants::from_raw(vec!["u1".into(), SUPPORT_ID.into(), "u2".into()]);
        let batch = vec![
            msg("a", "u1", "mine", Some(1)),
            msg("b", "u2", "someone else", Some(2)),
            three_way,
        ];

        let state = apply_batch(TranscriptState::loading(), batch, "u1");
        assert_eq!(texts(&state), vec!["mine"]);
        assert!(!state.loading);
    }

    #[test]
    fn ordered_by_time_with_stable_ties_and_pending_last() {
        let batch = vec![
            msg("p", "u1", "sending", None),
            msg("c", "u1", "third", Some(30)),
            msg("a", "u1", "first", Some(10)),
            msg("b1", "u1", "tie one", Some(20)),
            msg("b2", "u1", "tie two", Some(20)),
        ];

        let state = apply_batch(TranscriptState::default(), batch, "u1");
        assert_eq!(texts(&state), vec!["first", "tie one", "tie two", "third", "sending"]);
    }

    #[test]
    fn error_keeps_messages_and_next_batch_clears_it() {
        let state = apply_batch(TranscriptState::loading(), vec![msg("a", "u1", "kept", Some(1))], "u1");
        let failed = apply_error(state, &MessagingError::Store(anyhow::anyhow!("offline")));

        assert_eq!(texts(&failed), vec!["kept"]);
        assert_eq!(failed.error.as_deref(), Some("Store error: offline"));
        assert!(!failed.loading);

        let recovered = apply_batch(failed, vec![msg("a", "u1", "kept", Some(1))], "u1");
        assert!(recovered.error.is_none());
    }
}
