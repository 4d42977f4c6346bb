//! Gateway request and response bodies.

use serde::{Deserialize, Serialize};

/// `POST /messages/incoming` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingParams {
    pub phone_number: String,
    pub message: String,
    /// Display name for a newly created contact.
    #[serde(default)]
    pub user_name: Option<String>,
}

/// `POST /messages/outgoing` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingParams {
    pub phone_number: String,
    pub response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub delivered: bool,
}
