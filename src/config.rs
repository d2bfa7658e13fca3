//! Runtime configuration, read from `TODO_CHAT_*` environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::scheduler::{MonthOverflow, POLL_INTERVAL_SECS, SNOOZE_MINS, SchedulerSettings};
use crate::store::DEFAULT_DB_PATH;

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
pub const DEFAULT_STATIC_DIR: &str = "static";
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    File { path: PathBuf },
    Rest { url: String, api_key: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: String,
    pub static_dir: PathBuf,
    pub api_url: String,
    pub access_token: Option<String>,
    pub user_id: Option<String>,
    pub store: StoreBackend,
    pub poll_interval: Duration,
    pub snooze_mins: i64,
    pub month_overflow: MonthOverflow,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let store = match get("TODO_CHAT_STORE").as_deref() {
            None | Some("file") => StoreBackend::File {
                path: get("TODO_CHAT_DB_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            },
            Some("rest") => StoreBackend::Rest {
                url: get("TODO_CHAT_STORE_URL")
                    .ok_or(ConfigError::Missing("TODO_CHAT_STORE_URL"))?,
                api_key: get("TODO_CHAT_STORE_KEY")
                    .ok_or(ConfigError::Missing("TODO_CHAT_STORE_KEY"))?,
            },
            Some(other) => {
                let reason = "expected 'file' or 'rest'";
                return Err(ConfigError::invalid("TODO_CHAT_STORE", other, reason));
            }
        };

        let poll_secs = match get("TODO_CHAT_POLL_SECS") {
            None => POLL_INTERVAL_SECS as u64,
            Some(v) => match v.parse::<u64>() {
                Ok(n) if n > 0 => n,
                _ => {
                    let reason = "expected a positive number of seconds";
                    return Err(ConfigError::invalid("TODO_CHAT_POLL_SECS", v, reason));
                }
            },
        };

        let snooze_mins = match get("TODO_CHAT_SNOOZE_MINS") {
            None => SNOOZE_MINS,
            Some(v) => match v.parse::<i64>() {
                Ok(n) if n > 0 => n,
                _ => {
                    let reason = "expected a positive number of minutes";
                    return Err(ConfigError::invalid("TODO_CHAT_SNOOZE_MINS", v, reason));
                }
            },
        };

        let month_overflow = match get("TODO_CHAT_MONTH_POLICY").as_deref() {
            None | Some("clamp") => MonthOverflow::Clamp,
            Some("rollover") => MonthOverflow::RollOver,
            Some(other) => {
                return Err(ConfigError::invalid(
                    "TODO_CHAT_MONTH_POLICY",
                    other,
                    "expected 'clamp' or 'rollover'",
                ));
            }
        };

        Ok(Self {
            bind: get("TODO_CHAT_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
            static_dir: get("TODO_CHAT_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR)),
            api_url: get("TODO_CHAT_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            access_token: get("TODO_CHAT_ACCESS_TOKEN"),
            user_id: get("TODO_CHAT_USER_ID"),
            store,
            poll_interval: Duration::from_secs(poll_secs),
            snooze_mins,
            month_overflow,
        })
    }

    /// The due window is twice the poll interval so no due moment falls
    /// between two ticks.
    pub fn scheduler_settings(&self) -> SchedulerSettings {
        let poll_secs = i64::try_from(self.poll_interval.as_secs()).unwrap_or(POLL_INTERVAL_SECS);
        SchedulerSettings {
            due_window: chrono::Duration::seconds(2 * poll_secs),
            snooze: chrono::Duration::minutes(self.snooze_mins),
            month_overflow: self.month_overflow,
        }
    }
}
