use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://api-key.fusionbrain.ai/";
pub const DEFAULT_STYLES_URL: &str = "https://cdn.fusionbrain.ai/static/styles/api";
pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_POLL_ATTEMPTS: u32 = 20;
pub const DEFAULT_POLL_DELAY_SECS: u64 = 10;

#[derive(Clone)]
pub struct Config {
    pub base_url: String,
    pub styles_url: String,
    pub api_key: SecretString,
    pub secret_key: SecretString,
    pub port: u16,
    pub poll_attempts: u32,
    pub poll_delay: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|s| !s.is_empty());

        let api_key = var("API_KEY").ok_or(ConfigError::Missing("API_KEY"))?;
        let secret_key = var("SECRET_KEY").ok_or(ConfigError::Missing("SECRET_KEY"))?;

        let poll_attempts = parse_or(var("POLL_ATTEMPTS"), "POLL_ATTEMPTS", DEFAULT_POLL_ATTEMPTS)?;
        if poll_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "POLL_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            base_url: var("FUSIONBRAIN_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            styles_url: var("STYLES_URL").unwrap_or_else(|| DEFAULT_STYLES_URL.to_string()),
            api_key: SecretString::from(api_key),
            secret_key: SecretString::from(secret_key),
            port: parse_or(var("PORT"), "PORT", DEFAULT_PORT)?,
            poll_attempts,
            poll_delay: Duration::from_secs(parse_or(
                var("POLL_DELAY_SECS"),
                "POLL_DELAY_SECS",
                DEFAULT_POLL_DELAY_SECS,
            )?),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}


#[cfg(test)]
pub(crate) fn test_config(base_url: &str) -> Config {
    let mut config = Config::from_lookup(|name| match name {
        "API_KEY" => Some("test-key".to_string()),
        "SECRET_KEY" => Some("test-secret".to_string()),
        "FUSIONBRAIN_URL" => Some(format!("{base_url}/")),
        "STYLES_URL" => Some(format!("{base_url}/styles")),
        _ => None,
    })
    .expect("test config");
    config.poll_attempts = 3;
    config.poll_delay = Duration::from_millis(5);
    config
}
