//! WebSocket protocol and connection handling

pub mod dispatcher;
pub mod handler;
pub mod protocol;
