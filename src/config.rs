use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use reqwest::Url;
use thiserror::Error;
use tracing::info;

use crate::job::monitor::Initialization;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_token: String,
    pub telegram_chat_id: String,
    pub telegram_api_url: String,
    pub search_url: Url,
    pub search_keyword: String,
    pub poll_interval: Duration,
    pub schedule_interval: Duration,
    pub idle_log_interval: Duration,
    pub baseline: Option<u64>,
    pub target_count: u64,
    pub notify_on_decrease: bool,
    pub state_file: PathBuf,
    pub port: Option<u16>,
}

impl Config {
    /// Loads configuration from the environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(&lookup);
        Ok(Config {
            telegram_token: vars.required("TELEGRAM_TOKEN")?,
            telegram_chat_id: vars.required("TELEGRAM_CHAT_ID")?,
            telegram_api_url: vars.or_default("TELEGRAM_API_URL", "https://api.telegram.org")?,
            search_url: vars.or_default(
                "SEARCH_URL",
                "https://www.kmrb.or.kr/kor/CMS/TotalSearch/search.do",
            )?,
            search_keyword: vars.or_default("SEARCH_KEYWORD", "판타스틱 4")?,
            poll_interval: Duration::from_secs(vars.or_default("POLL_INTERVAL_SECS", "60")?),
            schedule_interval: Duration::from_secs(
                vars.or_default("SCHEDULE_INTERVAL_SECS", "300")?,
            ),
            idle_log_interval: Duration::from_secs(
                vars.or_default("IDLE_LOG_INTERVAL_SECS", "3600")?,
            ),
            baseline: vars.optional("BASELINE")?,
            target_count: vars.or_default("TARGET_COUNT", "1")?,
            notify_on_decrease: vars.or_default("NOTIFY_ON_DECREASE", "false")?,
            state_file: vars.or_default("STATE_FILE", "gradewatch-state.json")?,
            port: vars.optional("PORT")?,
        })
    }

    /// A configured `BASELINE` pins the first baseline; otherwise it is taken
    /// from the first live count.
    pub fn initialization(&self) -> Initialization {
        self.baseline
            .map(Initialization::Fixed)
            .unwrap_or(Initialization::Adaptive)
    }
}

struct Vars<'a, L>(&'a L);

impl<L: Fn(&str) -> Option<String>> Vars<'_, L> {
    fn var(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required<T: FromStr>(&self, key: &'static str) -> Result<T, ConfigError>
    where
        T::Err: Display,
    {
        let value = self.var(key).ok_or(ConfigError::Missing(key))?;
        parse(key, value)
    }

    fn or_default<T: FromStr>(&self, key: &'static str, default: &str) -> Result<T, ConfigError>
    where
        T::Err: Display,
    {
        let value = self.var(key).unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        });
        parse(key, value)
    }

    fn optional<T: FromStr>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T::Err: Display,
    {
        self.var(key).map(|value| parse(key, value)).transpose()
    }
}

fn parse<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let parsed = value.trim().parse::<T>();
    parsed.map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}
