//! Core of the Wikipedia Telegram bot.
//!
//! This crate is framework-agnostic: Telegram and Wikipedia live behind ports
//! (traits) implemented in adapter crates. It owns the ingestion loop, the
//! dispatcher, the lookup cache, the title registry and per-user state.

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod ingest;
pub mod logging;
pub mod lookup;
pub mod messaging;
pub mod registry;
pub mod store;
pub mod user_state;

pub use errors::{Error, Result};
