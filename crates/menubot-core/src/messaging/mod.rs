//! Messenger-facing model: inbound updates, outbound reply actions and the
//! port the outbound transport implements.

pub mod port;
pub mod types;
