// Startup configuration: command line flags with environment fallbacks

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::downloader::utils::find_ytdlp;
use crate::downloader::{Budgets, YtDlpConfig};
use crate::registry::RegistryLimits;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{budget} ({budget_secs}s) must not exceed {deadline} ({deadline_secs}s)")]
    Order {
        budget: &'static str,
        budget_secs: u64,
        deadline: &'static str,
        deadline_secs: u64,
    },
}

/// Telegram media fetch bot
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Settings {
    /// Bot token from BotFather
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    pub bot_token: String,

    /// Working directory for downloads
    #[arg(long, env = "DOWNLOAD_DIR", default_value = "downloads")]
    pub download_dir: PathBuf,

    /// Path to the yt-dlp binary (probed when unset)
    #[arg(long, env = "YTDLP_PATH")]
    pub ytdlp_path: Option<String>,

    /// Proxy URL passed to yt-dlp
    #[arg(long, env = "YTDLP_PROXY")]
    pub proxy: Option<String>,

    /// cookies.txt passed to yt-dlp
    #[arg(long, env = "YTDLP_COOKIES")]
    pub cookies: Option<String>,

    /// Fetches allowed to run at the same time
    #[arg(long, env = "MAX_CONCURRENT_FETCHES", default_value_t = 4)]
    pub max_concurrent_fetches: usize,

    /// Lifetime of a callback token in seconds
    #[arg(long, env = "TOKEN_TTL_SECS", default_value_t = 1800)]
    pub token_ttl_secs: u64,

    /// Maximum number of live callback tokens
    #[arg(long, env = "TOKEN_CAPACITY", default_value_t = 1024)]
    pub token_capacity: usize,

    /// Results offered when the top-result lookup misses
    #[arg(long, env = "SEARCH_RESULTS", default_value_t = 3)]
    pub search_results: usize,

    #[arg(long, env = "TOP_RESULT_TIMEOUT_SECS", default_value_t = 8)]
    pub top_result_timeout_secs: u64,

    #[arg(long, env = "SEARCH_TIMEOUT_SECS", default_value_t = 20)]
    pub search_timeout_secs: u64,

    #[arg(long, env = "DOWNLOAD_TIMEOUT_SECS", default_value_t = 120)]
    pub download_timeout_secs: u64,

    /// Overall deadline of a video/audio race, late results included
    #[arg(long, env = "RACE_DEADLINE_SECS", default_value_t = 180)]
    pub race_deadline_secs: u64,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("MAX_CONCURRENT_FETCHES", self.max_concurrent_fetches as u64),
            ("TOKEN_TTL_SECS", self.token_ttl_secs),
            ("TOKEN_CAPACITY", self.token_capacity as u64),
            ("SEARCH_RESULTS", self.search_results as u64),
            ("TOP_RESULT_TIMEOUT_SECS", self.top_result_timeout_secs),
            ("SEARCH_TIMEOUT_SECS", self.search_timeout_secs),
            ("DOWNLOAD_TIMEOUT_SECS", self.download_timeout_secs),
            ("RACE_DEADLINE_SECS", self.race_deadline_secs),
        ];
        if let Some((name, _)) = non_zero.into_iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero(name));
        }

        if self.download_timeout_secs > self.race_deadline_secs {
            return Err(ConfigError::Order {
                budget: "DOWNLOAD_TIMEOUT_SECS",
                budget_secs: self.download_timeout_secs,
                deadline: "RACE_DEADLINE_SECS",
                deadline_secs: self.race_deadline_secs,
            });
        }
        Ok(())
    }

    pub fn registry_limits(&self) -> RegistryLimits {
        RegistryLimits {
            max_age: Duration::from_secs(self.token_ttl_secs),
            max_size: self.token_capacity,
        }
    }

    pub fn budgets(&self) -> Budgets {
        Budgets {
            top_result: Duration::from_secs(self.top_result_timeout_secs),
            search: Duration::from_secs(self.search_timeout_secs),
            download: Duration::from_secs(self.download_timeout_secs),
            race_deadline: Duration::from_secs(self.race_deadline_secs),
        }
    }

    pub fn ytdlp_config(&self) -> YtDlpConfig {
        YtDlpConfig {
            binary: self.ytdlp_path.clone().unwrap_or_else(find_ytdlp),
            proxy: self.proxy.clone().filter(|p| !p.is_empty()),
            cookies_path: self.cookies.clone().filter(|p| !p.is_empty()),
            ..YtDlpConfig::default()
        }
    }
}
