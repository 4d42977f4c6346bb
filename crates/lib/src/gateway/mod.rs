//! Gateway: HTTP surface the bot/messaging layer calls to relay messages.
//!
//! Single port. JSON in, JSON out; optional bearer-token auth.

mod protocol;
mod server;

pub use protocol::{DeliveryResult, IncomingParams, OutgoingParams};
pub use server::{router, run_gateway, run_gateway_with, GatewayState};
