use crate::janitor::JanitorSettings;
use crate::store::DedupeSettings;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

fn default_admin_listener() -> Listener {
    Listener {
        host: "127.0.0.1".into(),
        port: 8081,
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum TenantStoreConfig {
    Filesystem { path: PathBuf },
    Memory,
}

impl Default for TenantStoreConfig {
    fn default() -> Self {
        TenantStoreConfig::Filesystem {
            path: PathBuf::from("tenants.json"),
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// Used for tenants without their own `max_queue_size`.
    pub default_max_size: usize,
    pub active_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            default_max_size: 20,
            active_timeout_secs: 60,
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct DedupeConfig {
    pub exact_window_ms: u64,
    pub retention_ms: u64,
    pub max_entries: usize,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        DedupeConfig {
            exact_window_ms: 3000,
            retention_ms: 5000,
            max_entries: 50,
        }
    }
}

impl From<&DedupeConfig> for DedupeSettings {
    fn from(config: &DedupeConfig) -> Self {
        DedupeSettings {
            exact_window: Duration::from_millis(config.exact_window_ms),
            retention: Duration::from_millis(config.retention_ms),
            max_entries: config.max_entries,
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct JanitorConfig {
    pub interval_secs: u64,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        JanitorConfig { interval_secs: 10 }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// 0 disables the limit.
    pub webhook_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            webhook_per_minute: 120,
        }
    }
}

fn default_body_limit() -> usize {
    100 * 1024
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    #[serde(default = "default_admin_listener")]
    pub admin_listener: Listener,
    pub master_key: Option<String>,
    #[serde(default)]
    pub tenants: TenantStoreConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub dedupe: DedupeConfig,
    #[serde(default)]
    pub janitor: JanitorConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: Listener::default(),
            admin_listener: default_admin_listener(),
            master_key: None,
            tenants: TenantStoreConfig::default(),
            queue: QueueConfig::default(),
            dedupe: DedupeConfig::default(),
            janitor: JanitorConfig::default(),
            rate_limit: RateLimitConfig::default(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("{0} port must not be 0")]
    ZeroPort(&'static str),
    #[error("janitor.interval_secs must be greater than 0")]
    ZeroJanitorInterval,
    #[error("queue.active_timeout_secs must be greater than 0")]
    ZeroActiveTimeout,
    #[error("queue.default_max_size must be greater than 0")]
    ZeroQueueSize,
    #[error("dedupe.exact_window_ms ({window}) must not exceed dedupe.retention_ms ({retention})")]
    DedupeWindowExceedsRetention { window: u64, retention: u64 },
    #[error("dedupe.max_entries must be greater than 0")]
    ZeroDedupeEntries,
    #[error("master_key must not be empty")]
    EmptyMasterKey,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.listener.port == 0 {
            return Err(ValidationError::ZeroPort("listener"));
        }
        if self.admin_listener.port == 0 {
            return Err(ValidationError::ZeroPort("admin_listener"));
        }
        if self.janitor.interval_secs == 0 {
            return Err(ValidationError::ZeroJanitorInterval);
        }
        if self.queue.active_timeout_secs == 0 {
            return Err(ValidationError::ZeroActiveTimeout);
        }
        if self.queue.default_max_size == 0 {
            return Err(ValidationError::ZeroQueueSize);
        }
        if self.dedupe.exact_window_ms > self.dedupe.retention_ms {
            return Err(ValidationError::DedupeWindowExceedsRetention {
                window: self.dedupe.exact_window_ms,
                retention: self.dedupe.retention_ms,
            });
        }
        if self.dedupe.max_entries == 0 {
            return Err(ValidationError::ZeroDedupeEntries);
        }
        if self.master_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            return Err(ValidationError::EmptyMasterKey);
        }
        Ok(())
    }

    /// Replaces the master key when `value` is set and non-empty.
    pub fn override_master_key(&mut self, value: Option<String>) {
        if let Some(key) = value.filter(|k| !k.trim().is_empty()) {
            self.master_key = Some(key);
        }
    }

    pub fn janitor_settings(&self) -> JanitorSettings {
        JanitorSettings {
            interval: Duration::from_secs(self.janitor.interval_secs),
            active_timeout: Duration::from_secs(self.queue.active_timeout_secs),
        }
    }
}
