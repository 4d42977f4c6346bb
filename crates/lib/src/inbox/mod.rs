//! Remote support-inbox service.
//!
//! [`InboxApi`] is the seam the resolver talks to; [`ChatwootClient`] is the REST
//! implementation. Tests plug in their own `InboxApi` to observe remote calls.

mod api;
mod chatwoot;

pub use api::{
    Contact, ContactId, ContactInbox, Conversation, ConversationId, ConversationMeta,
    ConversationSender, CreatedContact, InboxApi, InboxError, InboxRef, Message,
    MessageDirection, Profile,
};
pub use chatwoot::ChatwootClient;
