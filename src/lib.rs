//! signal-relay — relays messages from a signal-cli receive stream into a
//! trigger-based responder and back.

pub mod config;
pub mod error;
pub mod relay;
pub mod responder;
