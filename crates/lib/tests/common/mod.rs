//! In-memory inbox service for resolver and gateway tests. Records every call.

#![allow(dead_code)]

use async_trait::async_trait;
use relay::inbox::{
    Contact, ContactId, ContactInbox, Conversation, ConversationId, ConversationMeta,
    ConversationSender, CreatedContact, InboxApi, InboxError, InboxRef, Message,
    MessageDirection, Profile,
};
use relay::phone::PhoneIdentifier;
use std::sync::Mutex;
use std::time::Duration;

pub const INBOX_ID: u64 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    pub conversation_id: ConversationId,
    pub content: String,
    pub direction: MessageDirection,
}

#[derive(Default)]
struct State {
    contacts: Vec<Contact>,
    conversations: Vec<Conversation>,
    messages: Vec<PostedMessage>,
    calls: Vec<String>,
    conversation_source_ids: Vec<String>,
    next_id: u64,
    search_misses: usize,
    fail_create_contact: Option<u16>,
    fail_create_conversation: Option<u16>,
    fail_profile: bool,
}

#[derive(Default)]
pub struct FakeInbox {
    state: Mutex<State>,
    list_delay: Option<Duration>,
}

impl FakeInbox {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().next_id = 100;
        fake
    }

    /// Delay every conversation listing, so concurrent resolutions overlap.
    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    /// Add a contact bound to [`INBOX_ID`] (when `bound`). Returns its id.
    pub fn add_contact(&self, phone: &str, bound: bool) -> ContactId {
        let mut s = self.state.lock().unwrap();
        s.next_id += 1;
        let id = s.next_id;
        let contact_inboxes = if bound {
            vec![ContactInbox {
                source_id: format!("src-{}", id),
                inbox: Some(InboxRef { id: INBOX_ID }),
            }]
        } else {
            Vec::new()
        };
        s.contacts.push(Contact {
            id,
            name: Some(format!("contact {}", id)),
            phone_number: Some(phone.to_string()),
            identifier: None,
            contact_inboxes,
        });
        id
    }

    pub fn add_conversation(&self, sender_phone: &str, status: &str) -> ConversationId {
        let mut s = self.state.lock().unwrap();
        s.next_id += 1;
        let id = s.next_id;
        s.conversations.push(conversation(id, sender_phone, status));
        id
    }

    /// Next `n` contact searches return nothing, whatever exists.
    pub fn miss_searches(&self, n: usize) {
        self.state.lock().unwrap().search_misses = n;
    }

    pub fn fail_create_contact(&self, status: u16) {
        self.state.lock().unwrap().fail_create_contact = Some(status);
    }

    pub fn fail_create_conversation(&self, status: u16) {
        self.state.lock().unwrap().fail_create_conversation = Some(status);
    }

    pub fn fail_profile(&self) {
        self.state.lock().unwrap().fail_profile = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn messages(&self) -> Vec<PostedMessage> {
        self.state.lock().unwrap().messages.clone()
    }

    pub fn contacts(&self) -> Vec<Contact> {
        self.state.lock().unwrap().contacts.clone()
    }

    pub fn conversation_source_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().conversation_source_ids.clone()
    }

    fn record(&self, call: &str) {
        self.state.lock().unwrap().calls.push(call.to_string());
    }
}

fn conversation(id: ConversationId, sender_phone: &str, status: &str) -> Conversation {
    Conversation {
        id,
        status: Some(status.to_string()),
        inbox_id: Some(INBOX_ID),
        meta: ConversationMeta {
            sender: Some(ConversationSender {
                id: None,
                name: None,
                phone_number: Some(sender_phone.to_string()),
            }),
        },
    }
}

fn api_error(status: u16) -> InboxError {
    InboxError::Api {
        status,
        body: format!("{{\"error\":\"status {}\"}}", status),
    }
}

#[async_trait]
impl InboxApi for FakeInbox {
    async fn create_contact(
        &self,
        inbox_id: u64,
        name: &str,
        phone: &PhoneIdentifier,
    ) -> Result<CreatedContact, InboxError> {
        self.record("create_contact");
        let mut s = self.state.lock().unwrap();
        if let Some(status) = s.fail_create_contact {
            return Err(api_error(status));
        }
        if s
            .contacts
            .iter()
            .any(|c| c.phone_number.as_deref() == Some(phone.as_str()))
        {
            return Err(api_error(422));
        }
        s.next_id += 1;
        let id = s.next_id;
        let binding = ContactInbox {
            source_id: format!("src-{}", id),
            inbox: Some(InboxRef { id: inbox_id }),
        };
        let contact = Contact {
            id,
            name: Some(name.to_string()),
            phone_number: Some(phone.to_string()),
            identifier: Some(phone.to_string()),
            contact_inboxes: vec![binding.clone()],
        };
        s.contacts.push(contact.clone());
        Ok(CreatedContact {
            contact,
            source_id: Some(binding.source_id),
        })
    }

    async fn search_contacts(&self, query: &str) -> Result<Vec<Contact>, InboxError> {
        self.record("search_contacts");
        let mut s = self.state.lock().unwrap();
        if s.search_misses > 0 {
            s.search_misses -= 1;
            return Ok(Vec::new());
        }
        let digits = query.trim_start_matches('+');
        Ok(s.contacts
            .iter()
            .filter(|c| {
                c.phone_number
                    .as_deref()
                    .is_some_and(|p| p.contains(digits))
            })
            .cloned()
            .collect())
    }

    async fn create_conversation(
        &self,
        inbox_id: u64,
        contact_id: ContactId,
        source_id: &str,
    ) -> Result<Conversation, InboxError> {
        self.record("create_conversation");
        let mut s = self.state.lock().unwrap();
        if let Some(status) = s.fail_create_conversation {
            return Err(api_error(status));
        }
        let phone = s
            .contacts
            .iter()
            .find(|c| c.id == contact_id)
            .and_then(|c| c.phone_number.clone())
            .ok_or_else(|| api_error(404))?;
        s.next_id += 1;
        let mut conv = conversation(s.next_id, &phone, "open");
        conv.inbox_id = Some(inbox_id);
        s.conversations.push(conv.clone());
        s.conversation_source_ids.push(source_id.to_string());
        Ok(conv)
    }

    async fn list_open_conversations(&self, _inbox_id: u64) -> Result<Vec<Conversation>, InboxError> {
        self.record("list_open_conversations");
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.state.lock().unwrap().conversations.clone())
    }

    async fn post_message(
        &self,
        conversation_id: ConversationId,
        content: &str,
        direction: MessageDirection,
    ) -> Result<Message, InboxError> {
        self.record("post_message");
        let mut s = self.state.lock().unwrap();
        s.next_id += 1;
        let id = s.next_id;
        s.messages.push(PostedMessage {
            conversation_id,
            content: content.to_string(),
            direction,
        });
        Ok(Message {
            id,
            content: Some(content.to_string()),
        })
    }

    async fn get_account_profile(&self) -> Result<Profile, InboxError> {
        self.record("get_account_profile");
        if self.state.lock().unwrap().fail_profile {
            return Err(api_error(401));
        }
        Ok(Profile {
            id: 1,
            name: Some("relay bot".to_string()),
            email: None,
        })
    }
}
