//! Inbox service contract and the entities it exchanges.

use crate::phone::PhoneIdentifier;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

pub type ContactId = u64;
pub type ConversationId = u64;

/// Errors surfaced by an inbox service call.
#[derive(Debug, thiserror::Error)]
pub enum InboxError {
    #[error("inbox setting not configured: {0}")]
    NotConfigured(&'static str),
    #[error("inbox request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("inbox api error: {status} {body}")]
    Api { status: u16, body: String },
    #[error("inbox response malformed: {0}")]
    Decode(String),
}

impl InboxError {
    /// True when the service rejected a create because the entity already exists
    /// (409 Conflict or 422 Unprocessable Entity).
    pub fn is_conflict(&self) -> bool {
        matches!(self, InboxError::Api { status: 409 | 422, .. })
    }

    /// HTTP status of an API error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            InboxError::Api { status, .. } => Some(*status),
            InboxError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Direction of a message posted into a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    /// Sent by the end user (phone number side).
    Incoming,
    /// Sent on behalf of the bot.
    Outgoing,
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboxRef {
    pub id: u64,
}

/// Binding of a contact to one inbox channel ("contact_inbox").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactInbox {
    pub source_id: String,
    #[serde(default)]
    pub inbox: Option<InboxRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub contact_inboxes: Vec<ContactInbox>,
}

impl Contact {
    /// Source id of this contact's binding to the given inbox, if the service returned one.
    pub fn source_id_for(&self, inbox_id: u64) -> Option<&str> {
        self.contact_inboxes
            .iter()
            .find(|ci| ci.inbox.as_ref().map(|i| i.id) == Some(inbox_id))
            .map(|ci| ci.source_id.as_str())
    }
}

/// Result of a successful contact creation: the contact and, when present, its new inbox binding.
#[derive(Debug, Clone)]
pub struct CreatedContact {
    pub contact: Contact,
    pub source_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationSender {
    #[serde(default)]
    pub id: Option<ContactId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationMeta {
    #[serde(default)]
    pub sender: Option<ConversationSender>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub inbox_id: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: ConversationMeta,
}

impl Conversation {
    /// Phone number of the contact on the other side, as the service stores it.
    pub fn sender_phone(&self) -> Option<&str> {
        self.meta
            .sender
            .as_ref()
            .and_then(|s| s.phone_number.as_deref())
            .filter(|p| !p.trim().is_empty())
    }

    /// Open unless the service says otherwise.
    pub fn is_open(&self) -> bool {
        self.status
            .as_deref()
            .map_or(true, |s| s.eq_ignore_ascii_case("open"))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    #[serde(default)]
    pub content: Option<String>,
}

/// Profile of the account owning the access token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Operations the resolver needs from the remote inbox service.
#[async_trait]
pub trait InboxApi: Send + Sync {
    /// Create a contact bound to `inbox_id`, using `phone` as both phone number and external identifier.
    async fn create_contact(
        &self,
        inbox_id: u64,
        name: &str,
        phone: &PhoneIdentifier,
    ) -> Result<CreatedContact, InboxError>;

    /// Free-text contact search. Results may include partial matches.
    async fn search_contacts(&self, query: &str) -> Result<Vec<Contact>, InboxError>;

    async fn create_conversation(
        &self,
        inbox_id: u64,
        contact_id: ContactId,
        source_id: &str,
    ) -> Result<Conversation, InboxError>;

    async fn list_open_conversations(&self, inbox_id: u64) -> Result<Vec<Conversation>, InboxError>;

    async fn post_message(
        &self,
        conversation_id: ConversationId,
        content: &str,
        direction: MessageDirection,
    ) -> Result<Message, InboxError>;

    async fn get_account_profile(&self) -> Result<Profile, InboxError>;
}
