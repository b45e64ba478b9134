use std::env;
use std::path::PathBuf;

use super::error::ConfigError;
use super::notify::EmailSettings;
use super::request::Accounting;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub accounting: Accounting,
    /// `None` when no email endpoint is configured
    pub email: Option<EmailSettings>,
}

impl Config {
    /// Reads `.env` (if present) and then the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup, so tests need not touch the
    /// process environment
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_path = lookup("LEAVE_DB_PATH").unwrap_or_else(|| "leave.db".to_string());

        let accounting = match lookup("LEAVE_ACCOUNTING") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: "LEAVE_ACCOUNTING",
                value: raw,
            })?,
            None => Accounting::default(),
        };

        let enabled = match lookup("EMAIL_ENABLED") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid {
                key: "EMAIL_ENABLED",
                value: raw,
            })?,
            None => true,
        };

        let email = lookup("EMAIL_API_URL")
            .filter(|url| !url.trim().is_empty())
            .map(|api_url| EmailSettings {
                api_url,
                api_key: lookup("EMAIL_API_KEY").unwrap_or_default(),
                from_email: lookup("EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|| "noreply@localhost".to_string()),
                from_name: lookup("EMAIL_FROM_NAME").unwrap_or_else(|| "Leave Manager".to_string()),
                enabled,
            });

        Ok(Self {
            db_path: PathBuf::from(db_path),
            accounting,
            email,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
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
    fn defaults_without_environment() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.db_path, PathBuf::from("leave.db"));
        assert_eq!(config.accounting, Accounting::Calendar);
        assert!(config.email.is_none());
    }

    #[test]
    fn email_settings_follow_api_url() {
        let config = Config::from_lookup(lookup(&[
            ("EMAIL_API_URL", "https://mail.example.com/send"),
            ("EMAIL_API_KEY", "secret"),
            ("EMAIL_ENABLED", "false"),
            ("LEAVE_ACCOUNTING", "working"),
        ]))
        .unwrap();

        let email = config.email.unwrap();
        assert_eq!(email.api_key, "secret");
        assert_eq!(email.from_name, "Leave Manager");
        assert!(!email.enabled);
        assert_eq!(config.accounting, Accounting::Working);
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(Config::from_lookup(lookup(&[("LEAVE_ACCOUNTING", "hours")])).is_err());
        assert!(Config::from_lookup(lookup(&[("EMAIL_ENABLED", "maybe")])).is_err());
    }
}
