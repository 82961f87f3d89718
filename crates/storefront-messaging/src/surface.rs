use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use storefront_types::SUPPORT_ID;
use storefront_types::models::{ConversationSummary, Viewer};

use crate::composer::{Composer, SendOutcome};
use crate::inbox::{ProfileCache, build_inbox};
use crate::store::{MessageFilter, MessageStore, ProfileLookup};
use crate::subscription::{Delivery, Feed, SubscriptionHandle, SubscriptionManager, View};
use crate::transcript::{self, TranscriptState};

/// Everything that can land in a surface's event channel.
#[derive(Debug)]
pub enum SurfaceEvent {
    Feed(Delivery),

    /// A profile fan-out finished for the inbox batch numbered `build`
    InboxBuilt {
        generation: u64,
        build: u64,
        conversations: Vec<ConversationSummary>,
    },
}

impl From<Delivery> for SurfaceEvent {
    fn from(delivery: Delivery) -> Self {
        Self::Feed(delivery)
    }
}

/// Which derived view changed after applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
    Inbox,
    Transcript,
}

/// The messaging view of one viewer: support inbox (support only), the
/// active transcript, and the composer.
///
/// All derived state is mutated only through `&mut self`, from the task that
/// drives the surface. Live queries and profile fan-outs run as separate
/// tasks and report back through the event channel; anything they report for
/// a generation that is no longer current is dropped.
pub struct MessagingSurface {
    viewer: Viewer,
    store: Arc<dyn MessageStore>,
    profiles: Arc<dyn ProfileLookup>,
    profile_cache: ProfileCache,
    subscriptions: SubscriptionManager,

    events_tx: mpsc::UnboundedSender<SurfaceEvent>,
    events_rx: mpsc::UnboundedReceiver<SurfaceEvent>,

    inbox: Vec<ConversationSummary>,
    /// Inbox builds started / last applied, so a slow fan-out cannot
    /// overwrite a newer one
    inbox_builds_started: u64,
    inbox_build_applied: u64,

    transcript: TranscriptState,
    transcript_handle: Option<SubscriptionHandle>,
    selected: Option<String>,

    composer: Composer,
    is_open: bool,
}

impl MessagingSurface {
    pub fn new(viewer: Viewer, store: Arc<dyn MessageStore>, profiles: Arc<dyn ProfileLookup>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let subscriptions = SubscriptionManager::new(store.clone());
        Self {
            viewer,
            store,
            profiles,
            profile_cache: ProfileCache::default(),
            subscriptions,
            events_tx,
            events_rx,
            inbox: Vec::new(),
            inbox_builds_started: 0,
            inbox_build_applied: 0,
            transcript: TranscriptState::default(),
            transcript_handle: None,
            selected: None,
            composer: Composer::default(),
            is_open: false,
        }
    }

    /// Support opens the inbox; a customer opens their own conversation.
    pub fn open(&mut self) {
        if self.is_open {
            return;
        }
        self.is_open = true;
        info!("Messaging surface opened for {} ({:?})", self.viewer.uid, self.viewer.role);

        if self.viewer.is_support() {
            self.subscriptions.open(
                View::Inbox,
                MessageFilter::participant_contains(SUPPORT_ID),
                self.events_tx.clone(),
            );
        } else {
            self.open_transcript();
        }
    }

    /// Switch the transcript to `other_party_id`. Support only; the previous
    /// transcript subscription is closed before the new one opens.
    pub fn select_conversation(&mut self, other_party_id: &str) -> bool {
        if !self.viewer.is_support() {
            warn!("{} tried to select a conversation without support role", self.viewer.uid);
            return false;
        }
        if !self.is_open || other_party_id.trim().is_empty() || other_party_id == SUPPORT_ID {
            return false;
        }

        self.selected = Some(other_party_id.to_string());
        self.open_transcript();
        true
    }

    fn open_transcript(&mut self) {
        if let Some(handle) = self.transcript_handle.take() {
            self.subscriptions.close(handle);
        }

        // Support queries the customer's side of the feed, customers query
        // the support side; the exact-pair filter applies either way.
        let query_participant = if self.viewer.is_support() {
            match self.selected.as_deref() {
                Some(id) => id.to_string(),
                None => return,
            }
        } else {
            SUPPORT_ID.to_string()
        };

        self.transcript = TranscriptState::loading();
        self.transcript_handle = Some(self.subscriptions.open(
            View::Transcript,
            MessageFilter::participant_contains(&query_participant),
            self.events_tx.clone(),
        ));
    }

    /// Tear down every subscription and discard derived state. In-flight
    /// fan-outs resolve into stale events and are dropped.
    pub fn close(&mut self) {
        if !self.is_open {
            return;
        }
        self.subscriptions.close_all();
        self.transcript_handle = None;
        self.selected = None;
        self.inbox.clear();
        self.transcript = TranscriptState::default();
        self.is_open = false;
        info!("Messaging surface closed for {}", self.viewer.uid);
    }

    /// Wait for the next event and apply it. Returns the view that changed,
    /// or `None` if the event was stale or produced no visible change.
    /// Cancel-safe: nothing is lost if the future is dropped before it resolves.
    pub async fn next_update(&mut self) -> Option<Update> {
        // The surface holds a sender, so the channel never closes.
        let event = self.events_rx.recv().await?;
        self.apply(event)
    }

    pub fn apply(&mut self, event: SurfaceEvent) -> Option<Update> {
        match event {
            SurfaceEvent::Feed(delivery) => {
                if !self.subscriptions.is_current(delivery.view, delivery.generation) {
                    debug!("Dropping stale {:?} delivery (generation {})", delivery.view, delivery.generation);
                    return None;
                }
                match delivery.view {
                    View::Inbox => self.apply_inbox_feed(delivery.generation, delivery.feed),
                    View::Transcript => self.apply_transcript_feed(delivery.feed),
                }
            }
            SurfaceEvent::InboxBuilt {
                generation,
                build,
                conversations,
            } => {
                if !self.subscriptions.is_current(View::Inbox, generation) || build <= self.inbox_build_applied {
                    debug!("Dropping stale inbox build {} (generation {})", build, generation);
                    return None;
                }
                self.inbox_build_applied = build;
                self.inbox = conversations;
                Some(Update::Inbox)
            }
        }
    }

    fn apply_inbox_feed(&mut self, generation: u64, feed: Feed) -> Option<Update> {
        match feed {
            Feed::Data(messages) => {
                self.inbox_builds_started += 1;
                let build = self.inbox_builds_started;
                let profiles = self.profiles.clone();
                let cache = self.profile_cache.clone();
                let events_tx = self.events_tx.clone();

                tokio::spawn(async move {
                    let conversations = build_inbox(&messages, profiles.as_ref(), &cache).await;
                    let _ = events_tx.send(SurfaceEvent::InboxBuilt {
                        generation,
                        build,
                        conversations,
                    });
                });
                None
            }
            Feed::Error(e) => {
                error!("Error in inbox listener: {}", e);
                // Supersede any fan-out still running for an older batch.
                self.inbox_builds_started += 1;
                self.inbox_build_applied = self.inbox_builds_started;
                self.inbox.clear();
                Some(Update::Inbox)
            }
        }
    }

    fn apply_transcript_feed(&mut self, feed: Feed) -> Option<Update> {
        let customer_id = self.conversation_party()?.to_string();
        let state = std::mem::take(&mut self.transcript);
        self.transcript = match feed {
            Feed::Data(messages) => transcript::apply_batch(state, messages, &customer_id),
            Feed::Error(e) => {
                error!("Error in messages listener: {}", e);
                transcript::apply_error(state, &e)
            }
        };
        Some(Update::Transcript)
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.composer.set_input(text);
    }

    /// Submit the input buffer.
    pub async fn send(&mut self) -> SendOutcome {
        let selected = self.selected.as_deref();
        self.composer.send(self.store.as_ref(), &self.viewer, selected).await
    }

    /// Customer id of the active transcript: the selection for support, the
    /// viewer itself for a customer.
    pub fn conversation_party(&self) -> Option<&str> {
        if self.viewer.is_support() {
            self.selected.as_deref()
        } else if self.is_open {
            Some(self.viewer.uid.as_str())
        } else {
            None
        }
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn inbox(&self) -> &[ConversationSummary] {
        &self.inbox
    }

    pub fn transcript(&self) -> &TranscriptState {
        &self.transcript
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn input(&self) -> &str {
        self.composer.input()
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }
}
