//! Configuration loading and resolution.
//!
//! Store credentials are a pre-flight requirement: they are resolved before
//! any network activity and their absence aborts the run. Everything else
//! has a built-in default that an environment variable may override.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::fetch::RetryPolicy;
use crate::types::{SyncError, SyncResult};

pub const SCHEDULE_URL: &str = "https://dersprog.cankaya.edu.tr/";
pub const EXAM_LIST_URL: &str = "https://www.cankaya.edu.tr/ogrenci_isleri/sinav.php";
pub const EXAM_TABLE_URL: &str = "https://www.cankaya.edu.tr/ogrenci_isleri/sinavderskod.php";
pub const CALENDAR_URL: &str = "https://www.cankaya.edu.tr/akademik_takvim/index.php";

/// Store endpoint variable.
pub const STORE_URL_VAR: &str = "SUPABASE_URL";

/// Store key variables, in priority order. The first non-empty one wins.
pub const STORE_KEY_VARS: [&str; 2] = ["SUPABASE_KEY", "SUPABASE_SERVICE_KEY"];

const DEFAULT_SCHEDULE_DELAY_MS: u64 = 300;
const DEFAULT_EXAM_DELAY_MS: u64 = 5_000;
const DEFAULT_CALENDAR_CHUNK: usize = 100;
const DEFAULT_EXPORT_DIR: &str = "data";

/// Connection details for the relational store.
#[derive(Clone)]
pub struct StoreCredentials {
    pub url: String,
    pub key: String,
}

impl StoreCredentials {
    /// Resolve credentials from the process environment.
    pub fn from_env() -> SyncResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve credentials through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> SyncResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let url = non_empty(STORE_URL_VAR);
        let key = STORE_KEY_VARS.into_iter().find_map(|name| non_empty(name));

        match (url, key) {
            (Some(url), Some(key)) => Ok(Self { url, key }),
            (url, key) => Err(SyncError::Config(format!(
                "store credentials missing (URL: {}, KEY: {}); set {} and one of {}",
                if url.is_some() { "set" } else { "unset" },
                if key.is_some() { "set" } else { "unset" },
                STORE_URL_VAR,
                STORE_KEY_VARS.join(" / "),
            ))),
        }
    }
}

impl fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreCredentials")
            .field("url", &self.url)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Fixed portal endpoints.
#[derive(Debug, Clone)]
pub struct PortalUrls {
    pub schedule: String,
    pub exam_list: String,
    pub exam_table: String,
    pub calendar: String,
}

impl Default for PortalUrls {
    fn default() -> Self {
        Self {
            schedule: SCHEDULE_URL.to_string(),
            exam_list: EXAM_LIST_URL.to_string(),
            exam_table: EXAM_TABLE_URL.to_string(),
            calendar: CALENDAR_URL.to_string(),
        }
    }
}

/// Run-wide tunables.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub urls: PortalUrls,
    pub retry: RetryPolicy,
    /// Pause between schedule partitions.
    pub schedule_delay: Duration,
    /// Pause between exam partitions.
    pub exam_delay: Duration,
    /// Rows per insert call for full-table refreshes.
    pub calendar_chunk_size: usize,
    /// Target directory of the JSON export.
    pub export_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            urls: PortalUrls::default(),
            retry: RetryPolicy::default(),
            schedule_delay: Duration::from_millis(DEFAULT_SCHEDULE_DELAY_MS),
            exam_delay: Duration::from_millis(DEFAULT_EXAM_DELAY_MS),
            calendar_chunk_size: DEFAULT_CALENDAR_CHUNK,
            export_dir: PathBuf::from(DEFAULT_EXPORT_DIR),
        }
    }
}

impl RunConfig {
    /// Defaults overridden by `CAMPUS_SYNC_*` environment variables.
    pub fn from_env() -> SyncResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> SyncResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var::<u32, _>(&lookup, "CAMPUS_SYNC_MAX_RETRIES")? {
            config.retry.max_retries = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "CAMPUS_SYNC_BASE_TIMEOUT_SECS")? {
            config.retry.base_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "CAMPUS_SYNC_RESET_WAIT_SECS")? {
            config.retry.reset_wait = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "CAMPUS_SYNC_BACKOFF_STEP_SECS")? {
            config.retry.backoff_step = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "CAMPUS_SYNC_SCHEDULE_DELAY_MS")? {
            config.schedule_delay = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "CAMPUS_SYNC_EXAM_DELAY_MS")? {
            config.exam_delay = Duration::from_millis(v);
        }
        if let Some(dir) = lookup("CAMPUS_SYNC_EXPORT_DIR").filter(|d| !d.trim().is_empty()) {
            config.export_dir = PathBuf::from(dir.trim());
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would break the retry or chunking invariants.
    pub fn validate(&self) -> SyncResult<()> {
        if self.retry.base_timeout.is_zero() {
            return Err(SyncError::Config(
                "base fetch timeout must be greater than zero".into(),
            ));
        }
        if self.calendar_chunk_size == 0 {
            return Err(SyncError::Config("insert chunk size must be positive".into()));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> SyncResult<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| SyncError::Config(format!("invalid {name}={raw:?}: {e}"))),
    }
}
