//! Runtime configuration.
//!
//! Loaded from an optional TOML file layered with `CALMIR_`-prefixed
//! environment variables. Every field has a default, so an empty config
//! is valid.

use std::path::Path;

use serde::Deserialize;

use crate::constants::{
    APPROVAL_EXPIRY_HOURS, DEFAULT_LOOKAHEAD_DAYS, DEFAULT_LOOKBACK_DAYS, EVENTS_PAGE_SIZE,
    INCREMENTAL_SYNC_INTERVAL_MINUTES, INDEX_BATCH_SIZE, MAX_EVENT_PAGES, QUOTA_POLL_INTERVAL_MS,
    QUOTA_UNITS_PER_MINUTE, QUOTA_UNITS_PER_SECOND, QUOTA_WAIT_TIMEOUT_MS, RETRY_BASE_DELAY_MS,
    RETRY_MAX_ATTEMPTS, RETRY_MAX_DELAY_MS, WEBHOOK_CHANNEL_TTL_HOURS, WEBHOOK_DEBOUNCE_MS,
    WEBHOOK_RENEWAL_BUFFER_HOURS,
};
use crate::error::{CalmirError, CalmirResult};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalmirConfig {
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
}

impl CalmirConfig {
    /// Load config from an optional TOML file plus environment
    /// overrides (`CALMIR_SYNC__LOOKBACK_DAYS=7` style).
    pub fn load(path: Option<&Path>) -> CalmirResult<CalmirConfig> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CALMIR").separator("__"),
        );

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| CalmirError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_units_per_second")]
    pub units_per_second: u32,
    #[serde(default = "default_units_per_minute")]
    pub units_per_minute: u32,
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    #[serde(default = "default_lookahead_days")]
    pub lookahead_days: i64,
    #[serde(default = "default_max_event_pages")]
    pub max_event_pages: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_index_batch_size")]
    pub index_batch_size: usize,
    #[serde(default = "default_incremental_interval_minutes")]
    pub incremental_interval_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// HTTPS address the remote system delivers notifications to.
    #[serde(default = "default_callback_url")]
    pub callback_url: String,
    #[serde(default = "default_channel_ttl_hours")]
    pub channel_ttl_hours: i64,
    #[serde(default = "default_renewal_buffer_hours")]
    pub renewal_buffer_hours: i64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default = "default_expiry_hours")]
    pub default_expiry_hours: i64,
    #[serde(default)]
    pub conflict_buffer_minutes: i64,
}

fn default_units_per_second() -> u32 {
    QUOTA_UNITS_PER_SECOND
}
fn default_units_per_minute() -> u32 {
    QUOTA_UNITS_PER_MINUTE
}
fn default_wait_timeout_ms() -> u64 {
    QUOTA_WAIT_TIMEOUT_MS
}
fn default_poll_interval_ms() -> u64 {
    QUOTA_POLL_INTERVAL_MS
}
fn default_max_attempts() -> u32 {
    RETRY_MAX_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    RETRY_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    RETRY_MAX_DELAY_MS
}
fn default_lookback_days() -> i64 {
    DEFAULT_LOOKBACK_DAYS
}
fn default_lookahead_days() -> i64 {
    DEFAULT_LOOKAHEAD_DAYS
}
fn default_max_event_pages() -> u32 {
    MAX_EVENT_PAGES
}
fn default_page_size() -> u32 {
    EVENTS_PAGE_SIZE
}
fn default_index_batch_size() -> usize {
    INDEX_BATCH_SIZE
}
fn default_incremental_interval_minutes() -> u64 {
    INCREMENTAL_SYNC_INTERVAL_MINUTES
}
fn default_callback_url() -> String {
    "https://localhost/webhooks/calendar".to_string()
}
fn default_channel_ttl_hours() -> i64 {
    WEBHOOK_CHANNEL_TTL_HOURS
}
fn default_renewal_buffer_hours() -> i64 {
    WEBHOOK_RENEWAL_BUFFER_HOURS
}
fn default_debounce_ms() -> u64 {
    WEBHOOK_DEBOUNCE_MS
}
fn default_expiry_hours() -> i64 {
    APPROVAL_EXPIRY_HOURS
}

impl Default for QuotaConfig {
    fn default() -> Self {
        QuotaConfig {
            units_per_second: default_units_per_second(),
            units_per_minute: default_units_per_minute(),
            wait_timeout_ms: default_wait_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            lookback_days: default_lookback_days(),
            lookahead_days: default_lookahead_days(),
            max_event_pages: default_max_event_pages(),
            page_size: default_page_size(),
            index_batch_size: default_index_batch_size(),
            incremental_interval_minutes: default_incremental_interval_minutes(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        WebhookConfig {
            callback_url: default_callback_url(),
            channel_ttl_hours: default_channel_ttl_hours(),
            renewal_buffer_hours: default_renewal_buffer_hours(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        ApprovalConfig {
            default_expiry_hours: default_expiry_hours(),
            conflict_buffer_minutes: 0,
        }
    }
}
