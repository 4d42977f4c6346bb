//! Inbox relay library: bridges a messaging channel to a support inbox.
//!
//! Phone numbers are normalized, resolved to one open conversation (cached),
//! and inbound messages and bot replies are posted into it.

pub mod cache;
pub mod config;
pub mod gateway;
pub mod inbox;
pub mod phone;
pub mod resolver;
