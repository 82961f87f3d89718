pub mod api;
pub mod events;
pub mod models;

/// The single participant token shared by every support agent. There is one
/// support inbox in the system, not one per agent.
pub const SUPPORT_ID: &str = "admin";
