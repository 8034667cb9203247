// sitecraft-collab library
// Real-time collaboration client: connection lifecycle, typed event
// fan-out, presence and advisory lock tracking.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod presence;

pub use client::CollabClient;
pub use config::CollabConfig;
pub use dispatch::SubscriptionId;
pub use error::CollabError;
pub use presence::{Participant, PresenceTracker};
