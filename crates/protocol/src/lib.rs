//! Shared protocol types for sitecraft
//!
//! Defines the JSON frame structures exchanged with the collaboration
//! server. One `SyncMessage` per WebSocket text frame.

pub mod messages;
pub mod presence;

pub use messages::*;
pub use presence::*;
