//! Core domain + application logic for the Telegram menu bot.
//!
//! This crate is intentionally framework-agnostic. The HTTP server and the
//! Telegram Bot API transport live behind ports (traits) implemented in the
//! adapter crate.

pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod executor;
pub mod formatting;
pub mod logging;
pub mod menu;
pub mod messaging;
pub mod processor;
pub mod security;
pub mod session;
pub mod update;

pub use errors::{Error, Result};
