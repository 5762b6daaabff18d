//! Error handling for package deployment
//!
//! Every failure of a deploy step maps to one `DeployError` variant carrying
//! enough context (path, storage key) to act on it.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for deployment operations
#[derive(Error, Debug)]
pub enum DeployError {
    // Configuration errors
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("invalid configuration: {}", .errors.join("; "))]
    InvalidConfig { errors: Vec<String> },

    #[error("credential environment variable {variable} is not set")]
    CredentialsMissing { variable: String },

    // Local filesystem errors
    #[error("staging directory {} is unusable: {message}", .path.display())]
    StagingFailed { path: PathBuf, message: String },

    #[error("failed to archive {}: {message}", .path.display())]
    ArchiveFailed { path: PathBuf, message: String },

    #[error("failed to read descriptor {}: {message}", .path.display())]
    DescriptorUnreadable { path: PathBuf, message: String },

    #[error("descriptor {} is not valid YAML: {message}", .path.display())]
    DescriptorInvalid { path: PathBuf, message: String },

    // Storage errors
    #[error("failed to open {backend} storage: {message}")]
    StorageInit { backend: String, message: String },

    #[error("failed to upload {key}: {message}")]
    UploadFailed { key: String, message: String },

    #[error("failed to write package index {key}: {message}")]
    IndexWriteFailed { key: String, message: String },

    #[error("failed to serialize package index: {0}")]
    IndexSerialize(#[from] serde_json::Error),
}

impl DeployError {
    /// Check if re-running the deploy can succeed without changing anything
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UploadFailed { .. } | Self::IndexWriteFailed { .. } | Self::StagingFailed { .. }
        )
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::ConfigError(_) => vec![
                "Check .deploy-config.yaml for syntax errors",
                "Pass --config to point at the intended file",
            ],
            Self::InvalidConfig { .. } => vec![
                "Fix the listed configuration fields",
                "Run `dist-deployer check` to validate before deploying",
            ],
            Self::CredentialsMissing { .. } => vec![
                "Export COS_SECRET_ID and COS_SECRET_KEY",
                "Use storage.backend: local for offline runs",
            ],
            Self::StagingFailed { .. } => vec![
                "Check that the staging directory exists and is writable",
                "Set DEPLOY_STAGING_DIR to another location",
            ],
            Self::ArchiveFailed { .. } => vec![
                "Run from a directory whose parent contains the package",
                "Check file permissions in the package tree",
            ],
            Self::DescriptorUnreadable { .. } => {
                vec!["Check that pubspec.yaml exists at the configured path"]
            }
            Self::DescriptorInvalid { .. } => vec!["Fix the YAML syntax of pubspec.yaml"],
            Self::StorageInit { .. } => vec![
                "Check storage.bucket, storage.region and storage.endpoint",
                "Check the storage credentials",
            ],
            Self::UploadFailed { .. } => vec![
                "Check network connectivity",
                "Check that the credentials may write to the bucket",
                "Re-run the deploy; uploads overwrite existing objects",
            ],
            Self::IndexWriteFailed { .. } => vec![
                "The archive was uploaded but the index was not updated",
                "Re-run the deploy to write the index again",
            ],
            Self::IndexSerialize(_) => vec!["Report this as a bug"],
        }
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::CredentialsMissing { .. } => "CREDENTIALS_MISSING",
            Self::StagingFailed { .. } => "STAGING_FAILED",
            Self::ArchiveFailed { .. } => "ARCHIVE_FAILED",
            Self::DescriptorUnreadable { .. } => "DESCRIPTOR_UNREADABLE",
            Self::DescriptorInvalid { .. } => "DESCRIPTOR_INVALID",
            Self::StorageInit { .. } => "STORAGE_INIT",
            Self::UploadFailed { .. } => "UPLOAD_FAILED",
            Self::IndexWriteFailed { .. } => "INDEX_WRITE_FAILED",
            Self::IndexSerialize(_) => "INDEX_SERIALIZE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_failed_error() {
        let error = DeployError::UploadFailed {
            key: "http/versions/1.0.0.tar.gz".to_string(),
            message: "connection reset".to_string(),
        };

        assert!(error.is_recoverable());
        assert_eq!(error.code(), "UPLOAD_FAILED");
        let msg = error.to_string();
        assert!(msg.contains("http/versions/1.0.0.tar.gz"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_index_write_failed_error() {
        let error = DeployError::IndexWriteFailed {
            key: "http/package.json".to_string(),
            message: "403 Forbidden".to_string(),
        };

        assert!(error.is_recoverable());
        assert_eq!(error.code(), "INDEX_WRITE_FAILED");
        assert!(
            error
                .suggested_actions()
                .iter()
                .any(|a| a.contains("index was not updated"))
        );
    }

    #[test]
    fn test_descriptor_invalid_error() {
        let error = DeployError::DescriptorInvalid {
            path: PathBuf::from("../pubspec.yaml"),
            message: "mapping values are not allowed".to_string(),
        };

        assert!(!error.is_recoverable());
        assert_eq!(error.code(), "DESCRIPTOR_INVALID");
        assert!(error.to_string().contains("../pubspec.yaml"));
    }

    #[test]
    fn test_credentials_missing_error() {
        let error = DeployError::CredentialsMissing {
            variable: "COS_SECRET_ID".to_string(),
        };

        assert_eq!(error.code(), "CREDENTIALS_MISSING");
        assert!(error.to_string().contains("COS_SECRET_ID"));
        assert!(error.suggested_actions().len() >= 2);
    }

    #[test]
    fn test_invalid_config_joins_errors() {
        let error = DeployError::InvalidConfig {
            errors: vec![
                "package.name: name is required".to_string(),
                "package.version: version is required".to_string(),
            ],
        };

        let display = error.to_string();
        assert!(display.contains("package.name"));
        assert!(display.contains("; package.version"));
    }

    #[test]
    fn test_every_variant_has_actions() {
        let errors = vec![
            DeployError::ConfigError("bad".to_string()),
            DeployError::ArchiveFailed {
                path: PathBuf::from(".."),
                message: "permission denied".to_string(),
            },
            DeployError::StorageInit {
                backend: "cos".to_string(),
                message: "missing bucket".to_string(),
            },
        ];

        for error in errors {
            assert!(!error.suggested_actions().is_empty(), "{}", error.code());
        }
    }
}
