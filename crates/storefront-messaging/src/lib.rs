//! Live conversation aggregation for customer↔support messaging.
//!
//! A [`surface::MessagingSurface`] owns the derived views for one viewer and
//! is fed by generation-tagged live queries from the
//! [`subscription::SubscriptionManager`]. The reducers in [`inbox`] and
//! [`transcript`] are pure and can be tested without a store.

pub mod composer;
pub mod db_store;
pub mod error;
pub mod inbox;
pub mod store;
pub mod subscription;
pub mod surface;
pub mod transcript;

pub use error::{MessagingError, Result};
