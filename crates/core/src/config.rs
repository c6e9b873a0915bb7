//! Configuration types shared across crates.

use crate::session::TriggerKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// File name of the dedup index inside the state directory.
pub const INDEX_FILE_NAME: &str = "uploaded_index.json";
/// File name of the transfer job table inside the state directory.
pub const JOBS_FILE_NAME: &str = "transfer_jobs.json";
/// Directory holding temporary payloads inside the state directory.
pub const PAYLOADS_DIR_NAME: &str = "payloads";

/// Remote object store API configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the remote API (e.g., "https://photos.example.com").
    /// When unset, sync runs stop before any network call.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RemoteConfig {
    /// Base URL with surrounding whitespace and trailing slashes removed.
    /// Empty strings count as unset.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(|url| url.trim().trim_end_matches('/'))
            .filter(|url| !url.is_empty())
    }

    /// Whether a remote API is configured.
    pub fn is_configured(&self) -> bool {
        self.base_url().is_some()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate remote configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = self.base_url()
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(format!(
                "remote.base_url must start with http:// or https://, got {url}"
            ));
        }
        if self.timeout_secs == 0 {
            return Err("remote.timeout_secs cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Local item source configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory scanned for media items.
    #[serde(default = "default_source_path")]
    pub path: PathBuf,
    /// Watch the directory and sync on change (daemon only).
    #[serde(default = "default_watch")]
    pub watch: bool,
    /// Quiet period after the last file event before a change is reported.
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,
}

fn default_source_path() -> PathBuf {
    PathBuf::from("./photos")
}

fn default_watch() -> bool {
    true
}

fn default_watch_debounce_ms() -> u64 {
    2000
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: default_source_path(),
            watch: default_watch(),
            watch_debounce_ms: default_watch_debounce_ms(),
        }
    }
}

impl SourceConfig {
    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }
}

/// Local persistent state configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateConfig {
    /// Directory holding the dedup index, the job table and payloads.
    #[serde(default = "default_state_dir")]
    pub dir: PathBuf,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
        }
    }
}

impl StateConfig {
    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE_NAME)
    }

    pub fn jobs_path(&self) -> PathBuf {
        self.dir.join(JOBS_FILE_NAME)
    }

    pub fn payloads_dir(&self) -> PathBuf {
        self.dir.join(PAYLOADS_DIR_NAME)
    }
}

/// Orchestrator run configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Batch limit for manual, refresh and library-change runs.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Batch limit for long processing windows.
    #[serde(default = "default_processing_limit")]
    pub processing_limit: usize,
    /// Maximum number of items hashed and checked at once.
    #[serde(default = "default_max_concurrent_items")]
    pub max_concurrent_items: usize,
}

fn default_limit() -> usize {
    25
}

fn default_processing_limit() -> usize {
    50
}

fn default_max_concurrent_items() -> usize {
    4
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            processing_limit: default_processing_limit(),
            max_concurrent_items: default_max_concurrent_items(),
        }
    }
}

impl SyncConfig {
    /// Batch limit for a trigger kind.
    pub fn limit_for(&self, trigger: TriggerKind) -> usize {
        match trigger {
            TriggerKind::BackgroundProcessing => self.processing_limit,
            TriggerKind::Manual | TriggerKind::BackgroundRefresh | TriggerKind::LibraryChange => {
                self.default_limit
            }
        }
    }

    /// Validate sync configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_items == 0 {
            return Err("sync.max_concurrent_items cannot be 0".to_string());
        }
        if self.default_limit == 0 || self.processing_limit == 0 {
            return Err("sync limits must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Background transfer engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Maximum number of PUTs in flight.
    #[serde(default = "default_max_concurrent_transfers")]
    pub max_concurrent_transfers: usize,
    /// Retries after the first attempt for transient failures (5xx, transport).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

fn default_max_concurrent_transfers() -> usize {
    2
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_concurrent_transfers: default_max_concurrent_transfers(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

impl TransferConfig {
    /// Backoff before retry number `attempt` (1-based): base, 2x base, 4x base...
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_base_delay_ms.saturating_mul(factor))
    }

    /// Validate transfer configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_transfers == 0 {
            return Err("transfer.max_concurrent_transfers cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Execution window configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Earliest begin of the next refresh window after a request.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Budget of a refresh window.
    #[serde(default = "default_refresh_window_secs")]
    pub refresh_window_secs: u64,
    /// Earliest begin of the next processing window after a request.
    #[serde(default = "default_processing_interval_secs")]
    pub processing_interval_secs: u64,
    /// Budget of a processing window.
    #[serde(default = "default_processing_window_secs")]
    pub processing_window_secs: u64,
    /// How long an expired window waits for the cancelled run to wind down.
    #[serde(default = "default_expiry_grace_ms")]
    pub expiry_grace_ms: u64,
}

fn default_refresh_interval_secs() -> u64 {
    900 // 15 minutes
}

fn default_refresh_window_secs() -> u64 {
    30
}

fn default_processing_interval_secs() -> u64 {
    1800 // 30 minutes
}

fn default_processing_window_secs() -> u64 {
    300
}

fn default_expiry_grace_ms() -> u64 {
    500
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            refresh_window_secs: default_refresh_window_secs(),
            processing_interval_secs: default_processing_interval_secs(),
            processing_window_secs: default_processing_window_secs(),
            expiry_grace_ms: default_expiry_grace_ms(),
        }
    }
}

impl SchedulerConfig {
    /// Delay before a requested window of this kind may begin.
    pub fn interval_for(&self, trigger: TriggerKind) -> Duration {
        match trigger {
            TriggerKind::BackgroundRefresh => Duration::from_secs(self.refresh_interval_secs),
            TriggerKind::BackgroundProcessing => {
                Duration::from_secs(self.processing_interval_secs)
            }
            TriggerKind::Manual | TriggerKind::LibraryChange => Duration::ZERO,
        }
    }

    /// Budget of a window of this kind.
    ///
    /// Immediate windows get the processing budget.
    pub fn budget_for(&self, trigger: TriggerKind) -> Duration {
        match trigger {
            TriggerKind::BackgroundRefresh => Duration::from_secs(self.refresh_window_secs),
            TriggerKind::BackgroundProcessing
            | TriggerKind::Manual
            | TriggerKind::LibraryChange => Duration::from_secs(self.processing_window_secs),
        }
    }

    pub fn expiry_grace(&self) -> Duration {
        Duration::from_millis(self.expiry_grace_ms)
    }

    /// Validate scheduler configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.refresh_window_secs == 0 || self.processing_window_secs == 0 {
            return Err("scheduler window budgets cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote API configuration.
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Item source configuration.
    #[serde(default)]
    pub source: SourceConfig,
    /// Local state configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Orchestrator configuration.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Transfer engine configuration.
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Execution window configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl AppConfig {
    /// Create a test configuration rooted in `dir`.
    ///
    /// **For testing only.** Retries are disabled and backoff is short.
    pub fn for_testing(dir: impl Into<PathBuf>, base_url: Option<&str>) -> Self {
        let dir = dir.into();
        Self {
            remote: RemoteConfig {
                base_url: base_url.map(str::to_string),
                timeout_secs: 5,
            },
            source: SourceConfig {
                path: dir.join("photos"),
                watch: false,
                watch_debounce_ms: 50,
            },
            state: StateConfig {
                dir: dir.join("state"),
            },
            sync: SyncConfig::default(),
            transfer: TransferConfig {
                max_concurrent_transfers: 2,
                max_retries: 0,
                retry_base_delay_ms: 10,
            },
            scheduler: SchedulerConfig::default(),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> crate::Result<()> {
        self.remote
            .validate()
            .and_then(|_| self.sync.validate())
            .and_then(|_| self.transfer.validate())
            .and_then(|_| self.scheduler.validate())
            .map_err(crate::Error::Config)
    }
}
