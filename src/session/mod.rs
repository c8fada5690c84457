//! Participant identity to live connection bindings

pub mod hub;

pub use hub::{Channel, ConnectionId, Outbound, SessionError, SessionHub};
