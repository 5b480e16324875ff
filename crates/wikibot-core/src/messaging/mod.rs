//! Chat-platform abstractions: inbound updates, outbound replies and the ports
//! the Telegram adapter implements.

pub mod port;
pub mod types;
