use std::time::Duration;

use thiserror::Error;
use vwatch_adapters::HttpClientConfig;
use vwatch_core::{DEFAULT_MERCHANT_DOMAIN, DEFAULT_PAGE_SIZE};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Process configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bot_token: Option<String>,
    pub admin_ids: Vec<u64>,
    pub database_url: String,
    pub merchant_domain: String,
    /// Overrides `https://{domain}` for marketplace requests.
    pub api_base: Option<String>,
    pub poll_interval: Duration,
    pub poll_fallback: Duration,
    pub page_size: u32,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            admin_ids: Vec::new(),
            database_url: "sqlite://vwatch.db".to_string(),
            merchant_domain: DEFAULT_MERCHANT_DOMAIN.to_string(),
            api_base: None,
            poll_interval: Duration::from_secs(15),
            poll_fallback: Duration::from_secs(20),
            page_size: DEFAULT_PAGE_SIZE,
            user_agent: "vwatch-bot/0.1".to_string(),
            http_timeout_secs: 20,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

fn parse_number<T: std::str::FromStr>(
    field: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        Some(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                field,
                reason: format!("{v:?}: {e}"),
            }),
        _ => Ok(default),
    }
}

/// A whole number of seconds, at least one.
fn parse_seconds(
    field: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let secs: u64 = parse_number(field, raw, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            field,
            reason: "must be at least 1 second".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn parse_admin_ids(raw: Option<String>) -> Result<Vec<u64>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| ConfigError::InvalidValue {
                field: "VWATCH_ADMIN_IDS",
                reason: format!("{s:?} is not a user id"),
            })
        })
        .collect()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let log_format = match non_empty("VWATCH_LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    field: "VWATCH_LOG_FORMAT",
                    reason: format!("{other:?} (expected pretty or json)"),
                })
            }
        };

        let page_size = parse_number("VWATCH_PAGE_SIZE", lookup("VWATCH_PAGE_SIZE"), defaults.page_size)?;
        if page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "VWATCH_PAGE_SIZE",
                reason: "must be at least 1".to_string(),
            });
        }

        let poll_interval = parse_seconds(
            "VWATCH_POLL_INTERVAL_SECS",
            lookup("VWATCH_POLL_INTERVAL_SECS"),
            defaults.poll_interval,
        )?;
        let poll_fallback = parse_seconds(
            "VWATCH_POLL_FALLBACK_SECS",
            lookup("VWATCH_POLL_FALLBACK_SECS"),
            defaults.poll_fallback,
        )?;

        Ok(Self {
            bot_token: non_empty("TELEGRAM_BOT_TOKEN"),
            admin_ids: parse_admin_ids(lookup("VWATCH_ADMIN_IDS"))?,
            database_url: non_empty("DATABASE_URL").unwrap_or(defaults.database_url),
            merchant_domain: non_empty("VINTED_DOMAIN").unwrap_or(defaults.merchant_domain),
            api_base: non_empty("VINTED_API_BASE"),
            poll_interval,
            poll_fallback,
            page_size,
            user_agent: non_empty("VWATCH_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: parse_number(
                "VWATCH_HTTP_TIMEOUT_SECS",
                lookup("VWATCH_HTTP_TIMEOUT_SECS"),
                defaults.http_timeout_secs,
            )?,
            log_level: non_empty("VWATCH_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format,
        })
    }

    pub fn require_bot_token(&self) -> Result<&str, ConfigError> {
        self.bot_token
            .as_deref()
            .ok_or(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            default_domain: self.merchant_domain.clone(),
            api_base: self.api_base.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_cadence() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert_eq!(config.poll_fallback, Duration::from_secs(20));
        assert_eq!(config.page_size, 20);
        assert_eq!(config.merchant_domain, "www.vinted.fr");
        assert!(config.admin_ids.is_empty());
        assert_eq!(
            config.require_bot_token(),
            Err(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))
        );
    }

    #[test]
    fn admin_ids_are_comma_separated() {
        let config = AppConfig::from_lookup(lookup(&[
            ("VWATCH_ADMIN_IDS", " 111, 222 ,,333"),
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
        ]))
        .unwrap();
        assert_eq!(config.admin_ids, vec![111, 222, 333]);
        assert_eq!(config.require_bot_token(), Ok("123:abc"));
    }

    #[test]
    fn bad_numbers_are_reported() {
        let err = AppConfig::from_lookup(lookup(&[("VWATCH_POLL_INTERVAL_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "VWATCH_POLL_INTERVAL_SECS",
                ..
            }
        ));

        let err = AppConfig::from_lookup(lookup(&[("VWATCH_ADMIN_IDS", "12,abc")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "VWATCH_ADMIN_IDS", .. }));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        assert!(AppConfig::from_lookup(lookup(&[("VWATCH_PAGE_SIZE", "0")])).is_err());
    }

    #[test]
    fn zero_poll_timings_are_rejected() {
        for field in ["VWATCH_POLL_INTERVAL_SECS", "VWATCH_POLL_FALLBACK_SECS"] {
            let err = AppConfig::from_lookup(lookup(&[(field, "0")])).unwrap_err();
            assert_eq!(
                err,
                ConfigError::InvalidValue {
                    field,
                    reason: "must be at least 1 second".to_string(),
                }
            );
        }

        let config = AppConfig::from_lookup(lookup(&[
            ("VWATCH_POLL_INTERVAL_SECS", "1"),
            ("VWATCH_POLL_FALLBACK_SECS", "2"),
        ]))
        .unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.poll_fallback, Duration::from_secs(2));
    }

    #[test]
    fn api_base_reaches_http_client_config() {
        let config = AppConfig::from_lookup(lookup(&[("VINTED_API_BASE", "http://127.0.0.1:8080")]))
            .unwrap();
        let http = config.http_client_config();
        assert_eq!(http.api_base.as_deref(), Some("http://127.0.0.1:8080"));
        assert_eq!(http.default_domain, "www.vinted.fr");
        assert_eq!(AppConfig::default().http_client_config().api_base, None);
    }

    #[test]
    fn json_log_format() {
        let config = AppConfig::from_lookup(lookup(&[("VWATCH_LOG_FORMAT", "json")])).unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
    }
}
