//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.inbox-relay/config.json`) and environment.
//! Inbox settings are soft requirements: missing values are reported, not fatal.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Remote support-inbox connection.
    #[serde(default)]
    pub inbox: InboxConfig,

    /// Conversation cache tuning.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Remote inbox connection. Each field is overridden by its CHATWOOT_* env variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxConfig {
    /// Service base URL, e.g. "https://app.chatwoot.com".
    pub base_url: Option<String>,
    /// Static API access token.
    pub access_token: Option<String>,
    /// Inbox that contacts and conversations are bound to.
    pub inbox_id: Option<u64>,
    /// Account that owns the inbox.
    pub account_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Seconds between full cache sweeps (default 1800).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_sweep_interval_secs() -> u64 {
    30 * 60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl CacheConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Gateway bind, port, and auth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// HTTP port (default 15152).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    #[serde(default)]
    pub auth: GatewayAuthConfig,
}

/// Gateway auth: bearer token or none (loopback-only when none).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAuthConfig {
    #[serde(default)]
    pub mode: GatewayAuthMode,

    /// Shared secret expected as `Authorization: Bearer <token>`. Overridden by INBOX_RELAY_GATEWAY_TOKEN env.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayAuthMode {
    /// No auth; allow only when bind is loopback.
    #[default]
    None,

    /// Require the bearer token on every request.
    Token,
}

fn default_gateway_port() -> u16 {
    15152
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            auth: GatewayAuthConfig::default(),
        }
    }
}

/// Inbox settings after env overrides have been applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboxSettings {
    pub base_url: Option<String>,
    pub access_token: Option<String>,
    pub inbox_id: Option<u64>,
    pub account_id: Option<u64>,
}

impl InboxSettings {
    /// Names of required settings that are absent.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.base_url.is_none() {
            out.push("baseUrl");
        }
        if self.access_token.is_none() {
            out.push("accessToken");
        }
        if self.inbox_id.is_none() {
            out.push("inboxId");
        }
        if self.account_id.is_none() {
            out.push("accountId");
        }
        out
    }

    /// Log one configuration error per missing setting. Returns true when nothing is missing.
    pub fn report_missing(&self) -> bool {
        let missing = self.missing();
        for name in &missing {
            log::error!(
                "inbox config: {} is not set (config inbox.{} or env {}); remote calls will fail",
                name,
                name,
                env_name(name)
            );
        }
        missing.is_empty()
    }
}

fn env_name(setting: &str) -> &'static str {
    match setting {
        "baseUrl" => "CHATWOOT_BASE_URL",
        "accessToken" => "CHATWOOT_ACCESS_TOKEN",
        "inboxId" => "CHATWOOT_INBOX_ID",
        _ => "CHATWOOT_ACCOUNT_ID",
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = env_string(name)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("ignoring {}: not a number: {}", name, raw);
            None
        }
    }
}

fn trimmed(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve inbox settings: env CHATWOOT_* overrides config.
pub fn resolve_inbox_settings(config: &Config) -> InboxSettings {
    let inbox = &config.inbox;
    InboxSettings {
        base_url: env_string("CHATWOOT_BASE_URL")
            .or_else(|| trimmed(inbox.base_url.as_ref()))
            .map(|u| u.trim_end_matches('/').to_string()),
        access_token: env_string("CHATWOOT_ACCESS_TOKEN")
            .or_else(|| trimmed(inbox.access_token.as_ref())),
        inbox_id: env_u64("CHATWOOT_INBOX_ID").or(inbox.inbox_id),
        account_id: env_u64("CHATWOOT_ACCOUNT_ID").or(inbox.account_id),
    }
}

/// Resolve the gateway token: env INBOX_RELAY_GATEWAY_TOKEN overrides config.
pub fn resolve_gateway_token(config: &Config) -> Option<String> {
    env_string("INBOX_RELAY_GATEWAY_TOKEN")
        .or_else(|| trimmed(config.gateway.auth.token.as_ref()))
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("INBOX_RELAY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".inbox-relay").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, else the default path. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
