//! Configuration file loader for dist-deployer
//!
//! This module provides configuration loading, layering and validation.

use super::config::*;
use crate::core::error::DeployError;
use regex::Regex;
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Configuration file name looked up in the project directory
pub const CONFIG_FILENAME: &str = ".deploy-config.yaml";

/// Environment variable pattern (${VAR_NAME})
const ENV_VAR_PATTERN: &str = r"\$\{([A-Z_][A-Z0-9_]*)\}";

/// Values given on the command line (highest priority)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub name: Option<String>,
    pub version: Option<String>,
    pub source_dir: Option<PathBuf>,
    pub descriptor: Option<PathBuf>,
    pub staging_dir: Option<PathBuf>,
}

/// Configuration load options
#[derive(Debug, Clone)]
pub struct ConfigLoadOptions {
    /// Directory searched for `.deploy-config.yaml`
    pub project_path: PathBuf,

    /// Explicit config file; must exist when given
    pub config_file: Option<PathBuf>,

    /// CLI arguments
    pub overrides: ConfigOverrides,

    /// Environment variables
    pub env: HashMap<String, String>,
}

/// Configuration validation result
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationResult {
    pub valid: bool,
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationWarning>,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Field path (e.g., "storage.bucket")
    pub field: String,
    pub message: String,
}

/// Configuration validation warning
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

/// Configuration file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from multiple sources with priority
    ///
    /// Priority (high to low):
    /// 1. CLI arguments
    /// 2. Environment variables
    /// 3. Config file (`--config` or ./.deploy-config.yaml)
    /// 4. Default values
    pub async fn load(options: ConfigLoadOptions) -> Result<DeployConfig, DeployError> {
        let file_config = match &options.config_file {
            Some(path) => Some(Self::load_config_file(path, &options.env).await?.ok_or_else(
                || DeployError::ConfigError(format!("config file not found: {}", path.display())),
            )?),
            None => {
                let path = options.project_path.join(CONFIG_FILENAME);
                Self::load_config_file(&path, &options.env).await?
            }
        };

        let mut config = file_config.unwrap_or_default();
        Self::apply_env(&mut config, &options.env);
        Self::apply_overrides(&mut config, options.overrides);

        Ok(config)
    }

    /// Load configuration from a YAML file, `None` if it does not exist
    async fn load_config_file(
        file_path: &Path,
        env: &HashMap<String, String>,
    ) -> Result<Option<DeployConfig>, DeployError> {
        if !file_path.exists() {
            return Ok(None);
        }
        debug!(path = %file_path.display(), "loading config file");

        let content = fs::read_to_string(file_path).await.map_err(|e| {
            DeployError::ConfigError(format!("failed to read {}: {}", file_path.display(), e))
        })?;

        Self::parse_config(&content, env).map(Some)
    }

    /// Parse YAML config text, expanding `${VAR}` references in string values
    pub fn parse_config(
        content: &str,
        env: &HashMap<String, String>,
    ) -> Result<DeployConfig, DeployError> {
        if content.trim().is_empty() {
            return Ok(DeployConfig::default());
        }
        let raw: Value = serde_yaml::from_str(content)
            .map_err(|e| DeployError::ConfigError(format!("failed to parse YAML config: {}", e)))?;

        // A comment-only file parses as null
        if raw.is_null() {
            return Ok(DeployConfig::default());
        }

        let env_var_regex = Regex::new(ENV_VAR_PATTERN)
            .map_err(|e| DeployError::ConfigError(format!("invalid env pattern: {}", e)))?;
        let expanded = Self::expand_value(raw, &env_var_regex, env);

        serde_yaml::from_value(expanded)
            .map_err(|e| DeployError::ConfigError(format!("invalid config: {}", e)))
    }

    fn expand_value(value: Value, pattern: &Regex, env: &HashMap<String, String>) -> Value {
        match value {
            Value::String(s) => Value::String(Self::expand_string(&s, pattern, env)),
            Value::Sequence(items) => Value::Sequence(
                items
                    .into_iter()
                    .map(|v| Self::expand_value(v, pattern, env))
                    .collect(),
            ),
            Value::Mapping(map) => Value::Mapping(
                map.into_iter()
                    .map(|(k, v)| (k, Self::expand_value(v, pattern, env)))
                    .collect(),
            ),
            other => other,
        }
    }

    /// Expand environment variables in a single string
    ///
    /// Unknown variables are left in place.
    fn expand_string(input: &str, pattern: &Regex, env: &HashMap<String, String>) -> String {
        let mut result = input.to_string();
        for cap in pattern.captures_iter(input) {
            let var_name = &cap[1];
            match env.get(var_name) {
                Some(value) => {
                    result = result.replace(&format!("${{{}}}", var_name), value);
                }
                None => warn!(variable = var_name, "environment variable not found"),
            }
        }
        result
    }

    /// Apply `DEPLOY_*` environment variables
    fn apply_env(config: &mut DeployConfig, env: &HashMap<String, String>) {
        if let Some(name) = env.get("DEPLOY_PACKAGE_NAME") {
            config.package.name = name.clone();
        }
        if let Some(version) = env.get("DEPLOY_PACKAGE_VERSION") {
            config.package.version = version.clone();
        }
        if let Some(bucket) = env.get("DEPLOY_BUCKET") {
            config.storage.bucket = bucket.clone();
        }
        if let Some(region) = env.get("DEPLOY_REGION") {
            config.storage.region = region.clone();
        }
        if let Some(dir) = env.get("DEPLOY_STAGING_DIR") {
            config.staging.dir = PathBuf::from(dir);
        }
    }

    fn apply_overrides(config: &mut DeployConfig, overrides: ConfigOverrides) {
        if let Some(name) = overrides.name {
            config.package.name = name;
        }
        if let Some(version) = overrides.version {
            config.package.version = version;
        }
        if let Some(source_dir) = overrides.source_dir {
            config.package.source_dir = source_dir;
        }
        if let Some(descriptor) = overrides.descriptor {
            config.package.descriptor = descriptor;
        }
        if let Some(staging_dir) = overrides.staging_dir {
            config.staging.dir = staging_dir;
        }
    }

    /// Validate configuration
    pub fn validate(config: &DeployConfig) -> ConfigValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        Self::validate_package(&config.package, &mut errors, &mut warnings);
        Self::validate_storage(&config.storage, &mut errors, &mut warnings);

        if config.index.development_version.is_empty() {
            warnings.push(ConfigValidationWarning {
                field: "index.developmentVersion".to_string(),
                message: "empty development version; every publish updates latest".to_string(),
                suggestion: None,
            });
        }

        ConfigValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Validate and turn errors into a `DeployError`
    pub fn ensure_valid(config: &DeployConfig) -> Result<ConfigValidationResult, DeployError> {
        let result = Self::validate(config);
        if result.valid {
            Ok(result)
        } else {
            Err(DeployError::InvalidConfig {
                errors: result
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect(),
            })
        }
    }

    fn validate_package(
        package: &PackageConfig,
        errors: &mut Vec<ConfigValidationError>,
        warnings: &mut Vec<ConfigValidationWarning>,
    ) {
        if package.name.is_empty() {
            errors.push(ConfigValidationError {
                field: "package.name".to_string(),
                message: "name is required".to_string(),
            });
        } else if !is_single_segment(&package.name) {
            errors.push(ConfigValidationError {
                field: "package.name".to_string(),
                message: format!("'{}' must be a single path segment", package.name),
            });
        }

        if package.version.is_empty() {
            errors.push(ConfigValidationError {
                field: "package.version".to_string(),
                message: "version is required".to_string(),
            });
        } else if !is_single_segment(&package.version) {
            errors.push(ConfigValidationError {
                field: "package.version".to_string(),
                message: format!("'{}' must be a single path segment", package.version),
            });
        } else if semver::Version::parse(&package.version).is_err() {
            warnings.push(ConfigValidationWarning {
                field: "package.version".to_string(),
                message: format!("'{}' is not a semantic version", package.version),
                suggestion: Some("Use MAJOR.MINOR.PATCH (e.g., 1.0.0)".to_string()),
            });
        }
    }

    fn validate_storage(
        storage: &StorageConfig,
        errors: &mut Vec<ConfigValidationError>,
        _warnings: &mut Vec<ConfigValidationWarning>,
    ) {
        match storage.backend {
            StorageBackend::Cos => {
                if storage.bucket.is_empty() {
                    errors.push(ConfigValidationError {
                        field: "storage.bucket".to_string(),
                        message: "bucket is required for the cos backend".to_string(),
                    });
                }
                if storage.region.is_empty() && storage.endpoint.is_none() {
                    errors.push(ConfigValidationError {
                        field: "storage.region".to_string(),
                        message: "region or endpoint is required for the cos backend".to_string(),
                    });
                }
            }
            StorageBackend::Local => {
                if storage.path.is_none() {
                    errors.push(ConfigValidationError {
                        field: "storage.path".to_string(),
                        message: "path is required for the local backend".to_string(),
                    });
                }
            }
            StorageBackend::Memory => {}
        }

        if !(storage.public_base_url.starts_with("https://")
            || storage.public_base_url.starts_with("http://"))
        {
            errors.push(ConfigValidationError {
                field: "storage.publicBaseUrl".to_string(),
                message: format!("'{}' is not an http(s) URL", storage.public_base_url),
            });
        }
    }

    /// Format validation result as human-readable string
    pub fn format_validation_result(result: &ConfigValidationResult) -> String {
        let mut lines = Vec::new();

        if result.valid {
            lines.push("✅ Configuration validation succeeded".to_string());
        } else {
            lines.push("❌ Configuration has errors".to_string());
        }

        if !result.errors.is_empty() {
            lines.push("\n🔴 Errors:".to_string());
            for error in &result.errors {
                lines.push(format!("  - [{}] {}", error.field, error.message));
            }
        }

        if !result.warnings.is_empty() {
            lines.push("\n🟡 Warnings:".to_string());
            for warning in &result.warnings {
                lines.push(format!("  - [{}] {}", warning.field, warning.message));
                if let Some(suggestion) = &warning.suggestion {
                    lines.push(format!("    Suggestion: {}", suggestion));
                }
            }
        }

        lines.join("\n")
    }
}

/// Names and versions become storage key segments
fn is_single_segment(value: &str) -> bool {
    value != "."
        && value != ".."
        && !value
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid_config() -> DeployConfig {
        let mut config = DeployConfig::default();
        config.package.name = "shared_preferences".to_string();
        config.package.version = "1.0.0".to_string();
        config
    }

    #[tokio::test]
    async fn test_load_without_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();

        let config = ConfigLoader::load(ConfigLoadOptions {
            project_path: temp_dir.path().to_path_buf(),
            config_file: None,
            overrides: ConfigOverrides::default(),
            env: HashMap::new(),
        })
        .await
        .unwrap();

        assert_eq!(config, DeployConfig::default());
    }

    #[tokio::test]
    async fn test_load_priority_cli_over_env_over_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILENAME),
            "package:\n  name: from_file\n  version: 0.1.0\nstorage:\n  region: ap-shanghai\n",
        )
        .unwrap();

        let mut env = HashMap::new();
        env.insert("DEPLOY_PACKAGE_VERSION".to_string(), "0.2.0".to_string());
        env.insert("DEPLOY_PACKAGE_NAME".to_string(), "from_env".to_string());

        let config = ConfigLoader::load(ConfigLoadOptions {
            project_path: temp_dir.path().to_path_buf(),
            config_file: None,
            overrides: ConfigOverrides {
                name: Some("from_cli".to_string()),
                ..Default::default()
            },
            env,
        })
        .await
        .unwrap();

        assert_eq!(config.package.name, "from_cli");
        assert_eq!(config.package.version, "0.2.0");
        assert_eq!(config.storage.region, "ap-shanghai");
        assert_eq!(config.storage.bucket, "mpflutter-dist-1253771526");
    }

    #[tokio::test]
    async fn test_explicit_config_file_must_exist() {
        let temp_dir = TempDir::new().unwrap();

        let result = ConfigLoader::load(ConfigLoadOptions {
            project_path: temp_dir.path().to_path_buf(),
            config_file: Some(temp_dir.path().join("missing.yaml")),
            overrides: ConfigOverrides::default(),
            env: HashMap::new(),
        })
        .await;

        assert!(matches!(result, Err(DeployError::ConfigError(_))));
    }

    #[test]
    fn test_parse_config_expands_env_vars() {
        let mut env = HashMap::new();
        env.insert("DIST_HOST".to_string(), "cdn.example.com".to_string());

        let config = ConfigLoader::parse_config(
            "storage:\n  publicBaseUrl: https://${DIST_HOST}\n  bucket: ${MISSING_VAR}\n",
            &env,
        )
        .unwrap();

        assert_eq!(config.storage.public_base_url, "https://cdn.example.com");
        assert_eq!(config.storage.bucket, "${MISSING_VAR}");
    }

    #[test]
    fn test_parse_empty_config() {
        let config = ConfigLoader::parse_config("", &HashMap::new()).unwrap();
        assert_eq!(config, DeployConfig::default());
    }

    #[test]
    fn test_parse_invalid_backend() {
        let result = ConfigLoader::parse_config("storage:\n  backend: ftp\n", &HashMap::new());
        assert!(matches!(result, Err(DeployError::ConfigError(_))));
    }

    #[test]
    fn test_validate_requires_name_and_version() {
        let result = ConfigLoader::validate(&DeployConfig::default());

        assert!(!result.valid);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"package.name"));
        assert!(fields.contains(&"package.version"));
    }

    #[test]
    fn test_validate_rejects_path_like_name() {
        let mut config = valid_config();
        config.package.name = "../escape".to_string();

        let result = ConfigLoader::validate(&config);
        assert!(!result.valid);
        assert_eq!(result.errors[0].field, "package.name");
    }

    #[test]
    fn test_validate_warns_on_non_semver_version() {
        let mut config = valid_config();
        config.package.version = "nightly".to_string();

        let result = ConfigLoader::validate(&config);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].field, "package.version");
    }

    #[test]
    fn test_validate_local_backend_requires_path() {
        let mut config = valid_config();
        config.storage.backend = StorageBackend::Local;

        let result = ConfigLoader::validate(&config);
        assert!(!result.valid);
        assert_eq!(result.errors[0].field, "storage.path");
    }

    #[test]
    fn test_ensure_valid() {
        assert!(ConfigLoader::ensure_valid(&valid_config()).is_ok());

        let err = ConfigLoader::ensure_valid(&DeployConfig::default()).unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_format_validation_result() {
        let result = ConfigValidationResult {
            valid: false,
            errors: vec![ConfigValidationError {
                field: "package.name".to_string(),
                message: "name is required".to_string(),
            }],
            warnings: vec![ConfigValidationWarning {
                field: "package.version".to_string(),
                message: "'nightly' is not a semantic version".to_string(),
                suggestion: Some("Use MAJOR.MINOR.PATCH".to_string()),
            }],
        };

        let formatted = ConfigLoader::format_validation_result(&result);

        assert!(formatted.contains("❌ Configuration has errors"));
        assert!(formatted.contains("[package.name]"));
        assert!(formatted.contains("🟡 Warnings:"));
        assert!(formatted.contains("Suggestion: Use MAJOR.MINOR.PATCH"));
    }
}
