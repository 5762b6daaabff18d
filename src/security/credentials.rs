//! Storage credential handling with masking for safe logging
//!
//! Credentials are read from environment variables into `secrecy` wrappers so
//! they never show up in `Debug` output, logs or error messages.

use crate::core::config::CredentialsConfig;
use crate::core::error::DeployError;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;

/// Key pair used to sign storage requests
#[derive(Debug)]
pub struct Credentials {
    pub secret_id: SecretString,
    pub secret_key: SecretString,
}

impl Credentials {
    /// Replace every occurrence of either secret in `text` with its masked form
    pub fn mask_in(&self, text: &str) -> String {
        let mut masked = text.to_string();

        for secret in [&self.secret_id, &self.secret_key] {
            let value = secret.expose_secret();
            if value.is_empty() {
                continue;
            }
            if let Ok(regex) = Regex::new(&regex::escape(value)) {
                let replacement = mask_token(value);
                masked = regex.replace_all(&masked, replacement.as_str()).to_string();
            }
        }

        masked
    }
}

/// Reads credentials from the configured environment variables
#[derive(Debug, Clone, Default)]
pub struct CredentialManager {
    config: CredentialsConfig,
}

impl CredentialManager {
    pub fn new(config: CredentialsConfig) -> Self {
        Self { config }
    }

    /// Names of the environment variables consulted
    pub fn variable_names(&self) -> [&str; 2] {
        [&self.config.secret_id_env, &self.config.secret_key_env]
    }

    /// Both variables must be set and non-empty; names the first one missing
    pub fn require(&self, env: &HashMap<String, String>) -> Result<Credentials, DeployError> {
        let secret_id = Self::read(env, &self.config.secret_id_env)?;
        let secret_key = Self::read(env, &self.config.secret_key_env)?;

        Ok(Credentials {
            secret_id,
            secret_key,
        })
    }

    fn read(env: &HashMap<String, String>, name: &str) -> Result<SecretString, DeployError> {
        match env.get(name) {
            Some(value) if !value.is_empty() => Ok(SecretString::new(value.clone().into())),
            _ => Err(DeployError::CredentialsMissing {
                variable: name.to_string(),
            }),
        }
    }
}

/// Masks a token for safe logging
///
/// Shows only the first 3 and last 3 characters. Tokens shorter than 10
/// characters are fully masked as "****".
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() < 10 {
        return "****".to_string();
    }

    let prefix: String = chars[..3].iter().collect();
    let suffix: String = chars[chars.len() - 3..].iter().collect();
    format!("{}...{}", prefix, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_require_reads_both_variables() {
        let manager = CredentialManager::default();
        let env = env_with(&[
            ("COS_SECRET_ID", "AKIDexample0123456789"),
            ("COS_SECRET_KEY", "secret-key-0123456789"),
        ]);

        let credentials = manager.require(&env).unwrap();
        assert_eq!(credentials.secret_id.expose_secret(), "AKIDexample0123456789");
        assert_eq!(credentials.secret_key.expose_secret(), "secret-key-0123456789");
    }

    #[test]
    fn test_require_names_missing_variable() {
        let manager = CredentialManager::default();
        let env = env_with(&[("COS_SECRET_ID", "AKIDexample0123456789")]);

        match manager.require(&env) {
            Err(DeployError::CredentialsMissing { variable }) => {
                assert_eq!(variable, "COS_SECRET_KEY")
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let manager = CredentialManager::default();
        let env = env_with(&[("COS_SECRET_ID", ""), ("COS_SECRET_KEY", "x")]);

        assert!(manager.require(&env).is_err());
    }

    #[test]
    fn test_custom_variable_names() {
        let manager = CredentialManager::new(CredentialsConfig {
            secret_id_env: "MIRROR_ID".to_string(),
            secret_key_env: "MIRROR_KEY".to_string(),
        });
        let env = env_with(&[("MIRROR_ID", "id"), ("MIRROR_KEY", "key")]);

        assert_eq!(manager.variable_names(), ["MIRROR_ID", "MIRROR_KEY"]);
        assert!(manager.require(&env).is_ok());
    }

    #[test]
    fn test_debug_output_is_redacted() {
        let credentials = Credentials {
            secret_id: SecretString::new("AKIDexample0123456789".into()),
            secret_key: SecretString::new("secret-key-0123456789".into()),
        };

        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("AKIDexample0123456789"));
        assert!(!debug.contains("secret-key-0123456789"));
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("short"), "****");
        assert_eq!(mask_token(""), "****");
        assert_eq!(mask_token("abcdef123456"), "abc...456");
    }

    #[test]
    fn test_mask_in_replaces_secrets() {
        let credentials = Credentials {
            secret_id: SecretString::new("AKIDexample0123456789".into()),
            secret_key: SecretString::new("secret+key.0123456789".into()),
        };

        let masked = credentials
            .mask_in("signed with AKIDexample0123456789 and secret+key.0123456789");
        assert_eq!(masked, "signed with AKI...789 and sec...789");
    }
}
