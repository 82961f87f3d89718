use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use storefront_types::models::Message;

use crate::error::MessagingError;
use crate::store::{MessageFilter, MessageStore};

/// Logical views of a messaging surface. Each has at most one live query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Inbox,
    Transcript,
}

#[derive(Debug)]
pub enum Feed {
    /// Full current result set, never a diff
    Data(Vec<Message>),
    Error(MessagingError),
}

/// One batch from a live query, tagged with the generation that produced it.
#[derive(Debug)]
pub struct Delivery {
    pub view: View,
    pub generation: u64,
    pub feed: Feed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle {
    view: View,
    generation: u64,
}

impl SubscriptionHandle {
    pub fn view(&self) -> View {
        self.view
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

struct ActiveSubscription {
    generation: u64,
    task: JoinHandle<()>,
}

/// Owns the live queries of one surface.
///
/// Generations increase on every open. A delivery is current only while the
/// subscription that produced it is still the open one for its view.
pub struct SubscriptionManager {
    store: Arc<dyn MessageStore>,
    next_generation: u64,
    active: HashMap<View, ActiveSubscription>,
}

impl SubscriptionManager {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self {
            store,
            next_generation: 1,
            active: HashMap::new(),
        }
    }

    /// Start a live query for `view`, closing any query already open for it.
    /// Deliveries go to `sink` until the handle is closed.
    pub fn open<E>(&mut self, view: View, filter: MessageFilter, sink: mpsc::UnboundedSender<E>) -> SubscriptionHandle
    where
        E: From<Delivery> + Send + 'static,
    {
        self.close_view(view);

        let generation = self.next_generation;
        self.next_generation += 1;

        info!("Opening {:?} subscription (generation {}) on {}", view, generation, filter.participant);
        let task = tokio::spawn(run_live_query(self.store.clone(), view, generation, filter, sink));
        self.active.insert(view, ActiveSubscription { generation, task });

        SubscriptionHandle { view, generation }
    }

    /// Close `handle` if it is still the open one for its view. Safe to call
    /// on closed or superseded handles.
    pub fn close(&mut self, handle: SubscriptionHandle) {
        if self.is_current(handle.view, handle.generation) {
            self.close_view(handle.view);
        }
    }

    pub fn close_view(&mut self, view: View) {
        if let Some(sub) = self.active.remove(&view) {
            sub.task.abort();
            debug!("Closed {:?} subscription (generation {})", view, sub.generation);
        }
    }

    pub fn close_all(&mut self) {
        for (view, sub) in self.active.drain() {
            sub.task.abort();
            debug!("Closed {:?} subscription (generation {})", view, sub.generation);
        }
    }

    pub fn is_current(&self, view: View, generation: u64) -> bool {
        self.active.get(&view).is_some_and(|sub| sub.generation == generation)
    }

    pub fn is_open(&self, view: View) -> bool {
        self.active.contains_key(&view)
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.close_all();
    }
}

/// Fetch once, then re-fetch on every change notice until the sink closes or
/// the task is aborted. Notices that pile up while fetching are coalesced
/// into one re-fetch.
async fn run_live_query<E>(
    store: Arc<dyn MessageStore>,
    view: View,
    generation: u64,
    filter: MessageFilter,
    sink: mpsc::UnboundedSender<E>,
) where
    E: From<Delivery> + Send + 'static,
{
    // Subscribe before the first fetch so no write slips between them
    let mut changes = store.changes();

    loop {
        let feed = match store.fetch(&filter).await {
            Ok(messages) => {
                debug!("{:?} generation {} fetched {} messages", view, generation, messages.len());
                Feed::Data(messages)
            }
            Err(e) => {
                error!("{:?} subscription query failed: {}", view, e);
                Feed::Error(e)
            }
        };

        if sink.send(Delivery { view, generation, feed }.into()).is_err() {
            break;
        }

        match changes.recv().await {
            Ok(notice) => debug!("{:?} generation {} re-fetching after change to {}", view, generation, notice.message_id),
            Err(RecvError::Lagged(n)) => debug!("{:?} change feed lagged by {} notices", view, n),
            Err(RecvError::Closed) => break,
        }

        loop {
            match changes.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    }
}
