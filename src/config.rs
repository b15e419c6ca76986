use std::env;

use thiserror::Error;

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";
const DEFAULT_API_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} is not defined in environment variables")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Process configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct BotConfig {
    pub telegram_token: String,
    pub database_url: String,
    pub api_base_url: String,
    pub api_secret_key: String,
    pub api_timeout_secs: u64,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let api_timeout_secs = match lookup("API_TIMEOUT_SECS") {
            Some(value) => value.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                name: "API_TIMEOUT_SECS",
                value,
            })?,
            None => DEFAULT_API_TIMEOUT_SECS,
        };

        Ok(Self {
            telegram_token: required("TELEGRAM_BOT_TOKEN")?,
            database_url: required("DATABASE_URL")?,
            api_secret_key: required("API_SECRET_KEY")?,
            api_base_url: lookup("API_BASE_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            api_timeout_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("TELEGRAM_BOT_TOKEN", "123:abc"),
        ("DATABASE_URL", "postgres://localhost/bot"),
        ("API_SECRET_KEY", "secret"),
    ];

    #[test]
    fn defaults_apply_to_optional_values() {
        let config = BotConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.api_timeout_secs, DEFAULT_API_TIMEOUT_SECS);
        assert_eq!(config.telegram_token, "123:abc");
    }

    #[test]
    fn missing_token_is_fatal() {
        let err = BotConfig::from_lookup(lookup(&REQUIRED[1..])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn blank_database_url_counts_as_missing() {
        let mut vars = REQUIRED.to_vec();
        vars[1] = ("DATABASE_URL", "  ");
        let err = BotConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("API_TIMEOUT_SECS", "soon"));
        let err = BotConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "API_TIMEOUT_SECS", .. }));
    }
}
