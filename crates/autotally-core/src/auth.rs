//! Bearer credential validation at the request boundary.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::{AutoTallyError, Result};
use crate::models::config::AuthConfig;

/// Accepted API keys.
#[derive(Debug, Clone, Default)]
pub struct CredentialValidator {
    keys: HashSet<String>,
}

impl CredentialValidator {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = keys
            .into_iter()
            .map(|k| k.as_ref().trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keys }
    }

    /// Parse a comma-separated key list.
    pub fn from_list(list: &str) -> Self {
        Self::new(list.split(','))
    }

    /// Keys from the environment variable named in the config.
    ///
    /// With no keys configured every request is refused.
    pub fn from_env(config: &AuthConfig) -> Self {
        match std::env::var(&config.api_keys_env) {
            Ok(list) => {
                let validator = Self::from_list(&list);
                debug!("Loaded {} API keys from {}", validator.len(), config.api_keys_env);
                validator
            }
            Err(_) => {
                warn!("{} is not set, all requests will be refused", config.api_keys_env);
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Check an `Authorization` header value.
    pub fn validate(&self, header: Option<&str>) -> Result<()> {
        let header = header
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("Authorization header missing"))?;

        let key = match header.split_once(' ') {
            Some((scheme, key)) if scheme.eq_ignore_ascii_case("bearer") => key.trim(),
            _ => return Err(invalid("Invalid authorization format")),
        };

        if key.is_empty() || !self.keys.contains(key) {
            return Err(invalid("Invalid API key"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> AutoTallyError {
    AutoTallyError::InvalidCredential(message.to_string())
}
