//! The message-relay core: subprocess supervision, event parsing, dedup,
//! and outbound send.

pub mod dedup;
pub mod envelope;
pub mod sender;
pub mod supervisor;

pub use dedup::DedupCache;
pub use envelope::{MessageBody, MessageKind, ReceivedEvent};
pub use sender::OutboundSender;
pub use supervisor::RelaySupervisor;
