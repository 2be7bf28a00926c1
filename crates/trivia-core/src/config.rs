//! Application configuration
//!
//! Every section has defaults matching the deployed app, so a config file
//! only needs to list what it overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use trivia_common::{LogConfig, RetryConfig};
use url::Url;

use crate::error::{TriviaError, TriviaResult};

/// Environment variable holding the config file path
pub const CONFIG_ENV_VAR: &str = "TRIVIA_CONFIG";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TriviaConfig {
    /// Offline worker settings
    pub worker: WorkerConfig,

    /// Score validation rules
    pub leaderboard: LeaderboardRules,

    /// Log output
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkerConfig {
    /// Origin the worker is registered on; manifest paths resolve against it
    pub origin: String,

    /// Cache generation tag. Bump it whenever the manifest changes.
    pub cache_version: String,

    /// Root-relative paths cached at install time
    pub manifest: Vec<String>,

    /// Navigation fallback tried after the exact URL
    pub menu_fallback: String,

    /// Navigation fallback tried after the menu page
    pub primary_fallback: String,

    /// Per-request timeout of the live network client
    pub request_timeout_ms: u64,

    /// Install attempts before the worker gives up
    pub install_retry: RetrySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

/// Plausibility rules applied to leaderboard submissions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LeaderboardRules {
    /// Question counts a game can be played with
    pub allowed_question_counts: Vec<i64>,

    /// Lower bound on elapsed seconds regardless of question count
    pub min_elapsed_floor_secs: i64,

    /// Fastest plausible pace
    pub min_secs_per_question: i64,

    /// Slowest accepted pace
    pub max_secs_per_question: i64,

    /// Score ceiling per question
    pub max_points_per_question: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingSettings {
    /// trace, debug, info, warn or error
    pub level: String,

    /// pretty, compact or json
    pub format: String,

    /// Optional EnvFilter directive string, overrides `level`
    pub filter: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: "https://sda-trivia.web.app".to_string(),
            cache_version: "sda-trivia-v1".to_string(),
            manifest: [
                "/",
                "/index.html",
                "/menu.html",
                "/leaderboard.html",
                "/css/styles.css",
                "/js/app.js",
                "/js/game.js",
                "/js/questions.js",
                "/manifest.json",
                "/icons/icon-192.png",
                "/icons/icon-512.png",
                "/images/logo.png",
                "/audio/correct.mp3",
                "/audio/wrong.mp3",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            menu_fallback: "/menu.html".to_string(),
            primary_fallback: "/index.html".to_string(),
            request_timeout_ms: 30_000,
            install_retry: RetrySettings::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl Default for LeaderboardRules {
    fn default() -> Self {
        Self {
            allowed_question_counts: vec![10, 20, 50, 100],
            min_elapsed_floor_secs: 10,
            min_secs_per_question: 2,
            max_secs_per_question: 120,
            max_points_per_question: 1000,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            filter: None,
        }
    }
}

impl TriviaConfig {
    /// Load and validate a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> TriviaResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Parse and validate config from a JSON string.
    pub fn from_json_str(raw: &str) -> TriviaResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, then `TRIVIA_CONFIG`, then defaults.
    pub fn load_or_default(path: Option<&Path>) -> TriviaResult<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::load(path),
            None => {
                debug!("No config file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> TriviaResult<()> {
        self.worker.validate()?;
        self.leaderboard.validate()
    }
}

impl WorkerConfig {
    /// Parsed application origin.
    pub fn origin_url(&self) -> TriviaResult<Url> {
        let url = Url::parse(&self.origin)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(TriviaError::config(format!(
                "worker origin must be http(s), got {other}"
            ))),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn validate(&self) -> TriviaResult<()> {
        self.origin_url()?;

        if self.cache_version.trim().is_empty() {
            return Err(TriviaError::config("cacheVersion must not be empty"));
        }

        let paths = self
            .manifest
            .iter()
            .chain([&self.menu_fallback, &self.primary_fallback]);
        for path in paths {
            if !path.starts_with('/') {
                return Err(TriviaError::config(format!(
                    "path must be root-relative: {path}"
                )));
            }
        }

        Ok(())
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter: self.jitter,
        }
    }
}

impl LeaderboardRules {
    fn validate(&self) -> TriviaResult<()> {
        if self.allowed_question_counts.is_empty()
            || self.allowed_question_counts.iter().any(|&n| n <= 0)
        {
            return Err(TriviaError::config(
                "allowedQuestionCounts must be non-empty and positive",
            ));
        }

        if self.min_secs_per_question > self.max_secs_per_question {
            return Err(TriviaError::config(
                "minSecsPerQuestion exceeds maxSecsPerQuestion",
            ));
        }

        Ok(())
    }
}

impl LoggingSettings {
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig::from_settings(&self.level, &self.format, self.filter.as_deref())
    }
}
