//! Chatwoot REST client (account-scoped API, `api_access_token` header auth).

use crate::config::InboxSettings;
use crate::inbox::api::{
    Contact, ContactId, ContactInbox, Conversation, ConversationId, CreatedContact, InboxApi,
    InboxError, Message, MessageDirection, Profile,
};
use crate::phone::PhoneIdentifier;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

const TOKEN_HEADER: &str = "api_access_token";
/// Upper bound on pages fetched for one conversation listing.
const MAX_CONVERSATION_PAGES: u32 = 200;

#[derive(Debug, Deserialize)]
struct CreateContactResponse {
    payload: CreateContactPayload,
}

#[derive(Debug, Deserialize)]
struct CreateContactPayload {
    contact: Contact,
    #[serde(default)]
    contact_inbox: Option<ContactInbox>,
}

#[derive(Debug, Deserialize)]
struct SearchContactsResponse {
    #[serde(default)]
    payload: Vec<Contact>,
}

#[derive(Debug, Deserialize)]
struct ListConversationsResponse {
    data: ConversationsData,
}

#[derive(Debug, Deserialize)]
struct ConversationsData {
    #[serde(default)]
    meta: ConversationsMeta,
    #[serde(default)]
    payload: Vec<Conversation>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationsMeta {
    #[serde(default)]
    all_count: Option<usize>,
}

/// Client for the Chatwoot application API.
#[derive(Clone)]
pub struct ChatwootClient {
    base_url: Option<String>,
    access_token: Option<String>,
    account_id: Option<u64>,
    client: reqwest::Client,
}

impl ChatwootClient {
    pub fn new(settings: &InboxSettings) -> Self {
        Self {
            base_url: settings
                .base_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            access_token: settings.access_token.clone(),
            account_id: settings.account_id,
            client: reqwest::Client::new(),
        }
    }

    fn base(&self) -> Result<&str, InboxError> {
        self.base_url
            .as_deref()
            .ok_or(InboxError::NotConfigured("baseUrl"))
    }

    fn token(&self) -> Result<&str, InboxError> {
        self.access_token
            .as_deref()
            .ok_or(InboxError::NotConfigured("accessToken"))
    }

    fn account_url(&self, path: &str) -> Result<String, InboxError> {
        let account = self
            .account_id
            .ok_or(InboxError::NotConfigured("accountId"))?;
        Ok(format!(
            "{}/api/v1/accounts/{}/{}",
            self.base()?,
            account,
            path
        ))
    }

    /// Attach the token, send, and decode a JSON body. Non-2xx becomes [`InboxError::Api`].
    async fn send<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, InboxError> {
        let res = req.header(TOKEN_HEADER, self.token()?).send().await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(InboxError::Api { status, body });
        }
        let text = res.text().await?;
        serde_json::from_str(&text).map_err(|e| InboxError::Decode(e.to_string()))
    }
}

#[async_trait]
impl InboxApi for ChatwootClient {
    /// POST contacts — the phone is used as both phone_number and identifier.
    async fn create_contact(
        &self,
        inbox_id: u64,
        name: &str,
        phone: &PhoneIdentifier,
    ) -> Result<CreatedContact, InboxError> {
        let url = self.account_url("contacts")?;
        let body = json!({
            "inbox_id": inbox_id,
            "name": name,
            "phone_number": phone.as_str(),
            "identifier": phone.as_str(),
        });
        let data: CreateContactResponse = self.send(self.client.post(&url).json(&body)).await?;
        let CreateContactPayload {
            contact,
            contact_inbox,
        } = data.payload;
        let source_id = contact_inbox
            .map(|ci| ci.source_id)
            .filter(|s| !s.is_empty())
            .or_else(|| contact.source_id_for(inbox_id).map(str::to_string));
        Ok(CreatedContact { contact, source_id })
    }

    /// GET contacts/search?q=
    async fn search_contacts(&self, query: &str) -> Result<Vec<Contact>, InboxError> {
        let url = self.account_url("contacts/search")?;
        let data: SearchContactsResponse = self
            .send(self.client.get(&url).query(&[("q", query)]))
            .await?;
        Ok(data.payload)
    }

    /// POST conversations — opened directly in "open" status.
    async fn create_conversation(
        &self,
        inbox_id: u64,
        contact_id: ContactId,
        source_id: &str,
    ) -> Result<Conversation, InboxError> {
        let url = self.account_url("conversations")?;
        let body = json!({
            "source_id": source_id,
            "inbox_id": inbox_id,
            "contact_id": contact_id,
            "status": "open",
        });
        self.send(self.client.post(&url).json(&body)).await
    }

    /// GET conversations?inbox_id=&status=open&assignee_type=all&page=N, following pages
    /// until one comes back empty or `meta.all_count` conversations have been read.
    async fn list_open_conversations(&self, inbox_id: u64) -> Result<Vec<Conversation>, InboxError> {
        let url = self.account_url("conversations")?;
        let inbox = inbox_id.to_string();
        let mut out = Vec::new();
        for page in 1..=MAX_CONVERSATION_PAGES {
            let page_param = page.to_string();
            let data: ListConversationsResponse = self
                .send(self.client.get(&url).query(&[
                    ("inbox_id", inbox.as_str()),
                    ("status", "open"),
                    ("assignee_type", "all"),
                    ("page", page_param.as_str()),
                ]))
                .await?;
            let ConversationsData { meta, payload } = data.data;
            if payload.is_empty() {
                break;
            }
            out.extend(payload);
            if meta.all_count.is_some_and(|total| out.len() >= total) {
                break;
            }
            if page == MAX_CONVERSATION_PAGES {
                log::warn!(
                    "conversation listing for inbox {} truncated at {} pages",
                    inbox_id,
                    MAX_CONVERSATION_PAGES
                );
            }
        }
        Ok(out)
    }

    /// POST conversations/{id}/messages
    async fn post_message(
        &self,
        conversation_id: ConversationId,
        content: &str,
        direction: MessageDirection,
    ) -> Result<Message, InboxError> {
        let url = self.account_url(&format!("conversations/{}/messages", conversation_id))?;
        let body = json!({
            "content": content,
            "message_type": direction,
            "private": false,
        });
        self.send(self.client.post(&url).json(&body)).await
    }

    /// GET /api/v1/profile — not account-scoped; used as the reachability/auth check.
    async fn get_account_profile(&self) -> Result<Profile, InboxError> {
        let url = format!("{}/api/v1/profile", self.base()?);
        self.send(self.client.get(&url)).await
    }
}
