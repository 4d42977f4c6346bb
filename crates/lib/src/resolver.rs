//! Contact/conversation resolution and message relay.
//!
//! Inbound messages are resolved to one open conversation per phone identifier:
//! cache, then open-conversation search, then contact search, then creation (contact
//! and/or conversation). Bot replies only ever use the cache and the search; they never
//! create remote state.
//!
//! Resolutions for the same identifier are serialized through a per-identifier lock, so
//! concurrent messages from one number end up in the same conversation.

use crate::cache::ConversationCache;
use crate::config::{self, Config};
use crate::inbox::{
    ChatwootClient, Contact, ContactId, ConversationId, InboxApi, InboxError, MessageDirection,
};
use crate::phone::{MxMobileNormalizer, PhoneIdentifier, PhoneNormalizer};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Why a resolution or delivery did not complete.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Inbox(#[from] InboxError),
    #[error("inbox setting not configured: {0}")]
    NotConfigured(&'static str),
    #[error("contact {0} was reported as existing but search did not return it")]
    ContactMissingAfterConflict(PhoneIdentifier),
    #[error("no open conversation for {0}")]
    NoConversation(PhoneIdentifier),
    #[error("message content is empty")]
    EmptyContent,
}

/// Where a resolved conversation id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationSource {
    Cache,
    Search,
    Created,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub identifier: PhoneIdentifier,
    pub conversation_id: ConversationId,
    pub source: ConversationSource,
}

/// A message that reached the remote conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub identifier: PhoneIdentifier,
    pub conversation_id: ConversationId,
    pub message_id: u64,
    pub source: ConversationSource,
}

/// Lock for one identifier plus the number of tasks currently holding or awaiting it.
struct Slot {
    lock: Arc<Mutex<()>>,
    holders: usize,
}

type InFlightMap = std::sync::Mutex<HashMap<PhoneIdentifier, Slot>>;

fn lock_map(map: &InFlightMap) -> std::sync::MutexGuard<'_, HashMap<PhoneIdentifier, Slot>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registration in the in-flight map. The entry is released on drop, so a resolution
/// future cancelled mid-flight does not leave it behind.
struct InFlight<'a> {
    map: &'a InFlightMap,
    identifier: PhoneIdentifier,
    lock: Arc<Mutex<()>>,
}

impl<'a> InFlight<'a> {
    fn enter(map: &'a InFlightMap, identifier: &PhoneIdentifier) -> Self {
        let mut slots = lock_map(map);
        let slot = slots.entry(identifier.clone()).or_insert_with(|| Slot {
            lock: Arc::new(Mutex::new(())),
            holders: 0,
        });
        slot.holders += 1;
        Self {
            map,
            identifier: identifier.clone(),
            lock: slot.lock.clone(),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut slots = lock_map(self.map);
        if let Some(slot) = slots.get_mut(&self.identifier) {
            slot.holders = slot.holders.saturating_sub(1);
            if slot.holders == 0 {
                slots.remove(&self.identifier);
            }
        }
    }
}

pub struct Resolver {
    api: Arc<dyn InboxApi>,
    normalizer: Arc<dyn PhoneNormalizer>,
    cache: ConversationCache,
    inbox_id: Option<u64>,
    in_flight: InFlightMap,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Resolver {
    pub fn new(api: Arc<dyn InboxApi>, inbox_id: Option<u64>, cache: ConversationCache) -> Self {
        Self {
            api,
            normalizer: Arc::new(MxMobileNormalizer),
            cache,
            inbox_id,
            in_flight: std::sync::Mutex::new(HashMap::new()),
            sweeper: Mutex::new(None),
        }
    }

    /// Build a resolver backed by [`ChatwootClient`]. Missing inbox settings are logged and
    /// left to fail at call time.
    pub fn from_config(config: &Config) -> Self {
        let settings = config::resolve_inbox_settings(config);
        settings.report_missing();
        let client = ChatwootClient::new(&settings);
        Self::new(
            Arc::new(client),
            settings.inbox_id,
            ConversationCache::new(config.cache.sweep_interval()),
        )
    }

    /// Replace the default phone normalization strategy.
    pub fn with_normalizer(mut self, normalizer: Arc<dyn PhoneNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn cache(&self) -> &ConversationCache {
        &self.cache
    }

    pub fn normalize(&self, raw: &str) -> PhoneIdentifier {
        self.normalizer.normalize(raw)
    }

    /// Number of identifiers with a resolution running or queued.
    pub fn in_flight(&self) -> usize {
        lock_map(&self.in_flight).len()
    }

    /// Start the cache sweep task. No-op when already running.
    pub async fn start(&self) {
        let mut g = self.sweeper.lock().await;
        if g.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        *g = Some(self.cache.spawn_sweeper());
    }

    /// Stop the cache sweep task, if running.
    pub async fn stop(&self) {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
            log::debug!("conversation cache sweeper stopped");
        }
    }

    /// Relay an inbound user message. Returns true when the message was posted.
    pub async fn process_incoming_message(
        &self,
        phone_number: &str,
        message: &str,
        user_name: Option<&str>,
    ) -> bool {
        match self
            .try_process_incoming_message(phone_number, message, user_name)
            .await
        {
            Ok(d) => {
                log::debug!(
                    "incoming message {} posted to conversation {} ({:?})",
                    d.message_id,
                    d.conversation_id,
                    d.source
                );
                true
            }
            Err(e) => {
                log::error!("incoming message from {} not delivered: {}", phone_number, e);
                false
            }
        }
    }

    /// Relay a bot reply into the number's existing conversation. Returns true when posted.
    pub async fn process_bot_response(&self, phone_number: &str, bot_response: &str) -> bool {
        match self.try_process_bot_response(phone_number, bot_response).await {
            Ok(d) => {
                log::debug!(
                    "bot reply {} posted to conversation {}",
                    d.message_id,
                    d.conversation_id
                );
                true
            }
            Err(ResolveError::NoConversation(id)) => {
                log::warn!("dropping bot reply for {}: no open conversation", id);
                false
            }
            Err(e) => {
                log::error!("bot reply for {} not delivered: {}", phone_number, e);
                false
            }
        }
    }

    /// Check that the inbox service is reachable and the token is accepted.
    pub async fn test_connection(&self) -> bool {
        match self.api.get_account_profile().await {
            Ok(profile) => {
                log::info!(
                    "inbox connection ok (profile {} {})",
                    profile.id,
                    profile.name.as_deref().unwrap_or("")
                );
                true
            }
            Err(e) => {
                log::error!("inbox connection failed: {}", e);
                false
            }
        }
    }

    pub async fn try_process_incoming_message(
        &self,
        phone_number: &str,
        message: &str,
        user_name: Option<&str>,
    ) -> Result<Delivery, ResolveError> {
        if message.trim().is_empty() {
            return Err(ResolveError::EmptyContent);
        }
        let identifier = self.normalize(phone_number);
        let resolution = self.resolve_for_incoming(&identifier, user_name).await?;
        let posted = self
            .api
            .post_message(resolution.conversation_id, message, MessageDirection::Incoming)
            .await?;
        Ok(Delivery {
            identifier: resolution.identifier,
            conversation_id: resolution.conversation_id,
            message_id: posted.id,
            source: resolution.source,
        })
    }

    pub async fn try_process_bot_response(
        &self,
        phone_number: &str,
        bot_response: &str,
    ) -> Result<Delivery, ResolveError> {
        if bot_response.trim().is_empty() {
            return Err(ResolveError::EmptyContent);
        }
        let identifier = self.normalize(phone_number);
        let resolution = self
            .resolve_for_outgoing(&identifier)
            .await?
            .ok_or_else(|| ResolveError::NoConversation(identifier.clone()))?;
        let posted = self
            .api
            .post_message(resolution.conversation_id, bot_response, MessageDirection::Outgoing)
            .await?;
        Ok(Delivery {
            identifier: resolution.identifier,
            conversation_id: resolution.conversation_id,
            message_id: posted.id,
            source: resolution.source,
        })
    }

    /// Resolve an open conversation for an inbound message, creating contact and conversation as needed.
    pub async fn resolve_for_incoming(
        &self,
        identifier: &PhoneIdentifier,
        display_name: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        let in_flight = InFlight::enter(&self.in_flight, identifier);
        let _guard = in_flight.lock.lock().await;
        self.resolve_or_create(identifier, display_name).await
    }

    /// Resolve an existing open conversation for a bot reply. Never creates remote state.
    pub async fn resolve_for_outgoing(
        &self,
        identifier: &PhoneIdentifier,
    ) -> Result<Option<Resolution>, ResolveError> {
        let in_flight = InFlight::enter(&self.in_flight, identifier);
        let _guard = in_flight.lock.lock().await;
        self.resolve_existing(identifier).await
    }

    fn inbox_id(&self) -> Result<u64, ResolveError> {
        self.inbox_id.ok_or(ResolveError::NotConfigured("inboxId"))
    }

    /// Cache, then open-conversation search. Caches a search hit.
    async fn resolve_existing(
        &self,
        identifier: &PhoneIdentifier,
    ) -> Result<Option<Resolution>, ResolveError> {
        if let Some(conversation_id) = self.cache.get(identifier).await {
            log::debug!("cache hit for {}: conversation {}", identifier, conversation_id);
            return Ok(Some(Resolution {
                identifier: identifier.clone(),
                conversation_id,
                source: ConversationSource::Cache,
            }));
        }
        let inbox_id = self.inbox_id()?;
        let Some(conversation_id) = self.search_conversation(inbox_id, identifier).await? else {
            return Ok(None);
        };
        log::debug!("found open conversation {} for {}", conversation_id, identifier);
        self.cache.put(identifier.clone(), conversation_id).await;
        Ok(Some(Resolution {
            identifier: identifier.clone(),
            conversation_id,
            source: ConversationSource::Search,
        }))
    }

    async fn resolve_or_create(
        &self,
        identifier: &PhoneIdentifier,
        display_name: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        if let Some(found) = self.resolve_existing(identifier).await? {
            return Ok(found);
        }
        let inbox_id = self.inbox_id()?;

        let (contact_id, source_id) = match self.search_contact(identifier).await? {
            Some(contact) => {
                log::debug!("found contact {} for {}", contact.id, identifier);
                binding(&contact, inbox_id)
            }
            None => self.create_contact(inbox_id, identifier, display_name).await?,
        };
        let source_id = source_id.unwrap_or_else(|| identifier.to_string());

        let conversation = self
            .api
            .create_conversation(inbox_id, contact_id, &source_id)
            .await?;
        log::info!(
            "created conversation {} for contact {} ({})",
            conversation.id,
            contact_id,
            identifier
        );
        self.cache.put(identifier.clone(), conversation.id).await;
        Ok(Resolution {
            identifier: identifier.clone(),
            conversation_id: conversation.id,
            source: ConversationSource::Created,
        })
    }

    /// Create the contact; on a duplicate conflict fall back to the existing one.
    async fn create_contact(
        &self,
        inbox_id: u64,
        identifier: &PhoneIdentifier,
        display_name: Option<&str>,
    ) -> Result<(ContactId, Option<String>), ResolveError> {
        let name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(identifier.as_str());
        match self.api.create_contact(inbox_id, name, identifier).await {
            Ok(created) => {
                log::info!("created contact {} for {}", created.contact.id, identifier);
                let source_id = created
                    .source_id
                    .or_else(|| created.contact.source_id_for(inbox_id).map(str::to_string));
                Ok((created.contact.id, source_id))
            }
            Err(e) if e.is_conflict() => {
                log::warn!(
                    "contact for {} already exists ({}); looking it up",
                    identifier,
                    e
                );
                let contact = self
                    .search_contact(identifier)
                    .await?
                    .ok_or_else(|| ResolveError::ContactMissingAfterConflict(identifier.clone()))?;
                Ok(binding(&contact, inbox_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// First contact whose phone number or identifier normalizes to `identifier`.
    async fn search_contact(
        &self,
        identifier: &PhoneIdentifier,
    ) -> Result<Option<Contact>, ResolveError> {
        let candidates = self.api.search_contacts(identifier.as_str()).await?;
        Ok(candidates.into_iter().find(|c| {
            [c.phone_number.as_deref(), c.identifier.as_deref()]
                .into_iter()
                .flatten()
                .filter(|v| !v.trim().is_empty())
                .any(|v| &self.normalize(v) == identifier)
        }))
    }

    /// First open conversation whose sender phone normalizes to `identifier`, in returned order.
    async fn search_conversation(
        &self,
        inbox_id: u64,
        identifier: &PhoneIdentifier,
    ) -> Result<Option<ConversationId>, ResolveError> {
        let conversations = self.api.list_open_conversations(inbox_id).await?;
        Ok(conversations
            .iter()
            .filter(|c| c.is_open())
            .find(|c| {
                c.sender_phone()
                    .is_some_and(|p| &self.normalize(p) == identifier)
            })
            .map(|c| c.id))
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

fn binding(contact: &Contact, inbox_id: u64) -> (ContactId, Option<String>) {
    (
        contact.id,
        contact.source_id_for(inbox_id).map(str::to_string),
    )
}
