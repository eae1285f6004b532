use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use ink_types::JudgeStrategy;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub python_bin: PathBuf,
    pub predict_script: PathBuf,
    pub predict_timeout: Duration,
    pub max_body_bytes: u64,
    /// Remote recognition endpoint. When unset, rounds are judged by running
    /// the prediction script in-process.
    pub recognition_url: Option<String>,
    pub judge_strategy: JudgeStrategy,
    pub recognition_timeout: Duration,
    pub live_feed_interval: Duration,
    /// Newline separated words replacing the built-in random pool.
    pub word_list: Option<PathBuf>,
    pub friends: Vec<String>,
    pub seed_demo_attempts: bool,
    pub session_secret: String,
    pub session_ttl: Duration,
    pub ws_max_messages: u32,
    pub ws_refill: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from any variable source; unset variables keep their
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let session_ttl_hours = defaults.session_ttl.as_secs() / 3600;

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PORT", defaults.port)?,
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            python_bin: lookup("PYTHON_BIN").map_or(defaults.python_bin, PathBuf::from),
            predict_script: lookup("PREDICT_SCRIPT").map_or(defaults.predict_script, PathBuf::from),
            predict_timeout: Duration::from_secs(parse(
                &lookup,
                "PREDICT_TIMEOUT_SECONDS",
                defaults.predict_timeout.as_secs(),
            )?),
            max_body_bytes: parse(&lookup, "MAX_BODY_BYTES", defaults.max_body_bytes)?,
            recognition_url: lookup("RECOGNITION_URL").filter(|url| !url.trim().is_empty()),
            judge_strategy: match lookup("JUDGE_STRATEGY") {
                Some(value) => parse_strategy(&value)?,
                None => defaults.judge_strategy,
            },
            recognition_timeout: Duration::from_secs(parse(
                &lookup,
                "RECOGNITION_TIMEOUT_SECONDS",
                defaults.recognition_timeout.as_secs(),
            )?),
            live_feed_interval: Duration::from_millis(parse(
                &lookup,
                "LIVE_FEED_INTERVAL_MS",
                defaults.live_feed_interval.as_millis() as u64,
            )?),
            word_list: lookup("WORD_LIST")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
            friends: lookup("FRIENDS").map_or(defaults.friends, |list| parse_list(&list)),
            seed_demo_attempts: parse(&lookup, "SEED_DEMO_ATTEMPTS", defaults.seed_demo_attempts)?,
            session_secret: lookup("SESSION_SECRET").unwrap_or(defaults.session_secret),
            session_ttl: Duration::from_secs(
                parse(&lookup, "SESSION_TTL_HOURS", session_ttl_hours)? * 3600,
            ),
            ws_max_messages: parse(&lookup, "WS_MAX_MESSAGES", defaults.ws_max_messages)?,
            ws_refill: Duration::from_millis(parse(
                &lookup,
                "WS_REFILL_MS",
                defaults.ws_refill.as_millis() as u64,
            )?),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            database_url: "sqlite://ink.db?mode=rwc".to_string(),
            python_bin: PathBuf::from("/usr/local/bin/python3"),
            predict_script: PathBuf::from("./model/predict_word.py"),
            predict_timeout: Duration::from_secs(120),
            max_body_bytes: 15 * 1024 * 1024,
            recognition_url: None,
            judge_strategy: JudgeStrategy::ImageRecognition,
            recognition_timeout: Duration::from_secs(30),
            live_feed_interval: Duration::from_millis(3000),
            word_list: None,
            friends: parse_list("Grant,Sky,Mia"),
            seed_demo_attempts: true,
            session_secret: "ink-dev-secret".to_string(),
            session_ttl: Duration::from_secs(24 * 3600),
            ws_max_messages: 60,
            ws_refill: Duration::from_millis(250),
        }
    }
}

fn parse_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

fn parse_strategy(value: &str) -> Result<JudgeStrategy, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "image" | "image_recognition" => Ok(JudgeStrategy::ImageRecognition),
        "text" | "text_compare" => Ok(JudgeStrategy::TextCompare),
        _ => Err(ConfigError::Invalid {
            name: "JUDGE_STRATEGY",
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 4000);
        assert_eq!(config.predict_timeout, Duration::from_secs(120));
        assert_eq!(config.max_body_bytes, 15 * 1024 * 1024);
        assert_eq!(config.judge_strategy, JudgeStrategy::ImageRecognition);
        assert_eq!(config.live_feed_interval, Duration::from_millis(3000));
        assert_eq!(config.friends, vec!["Grant", "Sky", "Mia"]);
        assert!(config.seed_demo_attempts);
        assert!(config.recognition_url.is_none());
        assert!(config.word_list.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_with(&[
            ("PORT", "8080"),
            ("JUDGE_STRATEGY", "text"),
            ("FRIENDS", " Jay , ,Seth"),
            ("SEED_DEMO_ATTEMPTS", "false"),
            ("RECOGNITION_URL", "http://localhost:4000/api/predict"),
            ("WORD_LIST", "/srv/ink/words.txt"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.judge_strategy, JudgeStrategy::TextCompare);
        assert_eq!(config.friends, vec!["Jay", "Seth"]);
        assert!(!config.seed_demo_attempts);
        assert_eq!(config.word_list, Some(PathBuf::from("/srv/ink/words.txt")));
        assert_eq!(
            config.recognition_url.as_deref(),
            Some("http://localhost:4000/api/predict")
        );
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let err = config_with(&[("PORT", "eighty")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                name: "PORT",
                value: "eighty".to_string()
            }
        );

        assert!(config_with(&[("JUDGE_STRATEGY", "vibes")]).is_err());
    }
}
