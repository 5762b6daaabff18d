//! Configuration structures and types for dist-deployer
//!
//! Every value the deploy script used to keep as a module-level constant
//! (bucket, region, version, sentinel) lives here and is handed to the
//! publisher at construction.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployConfig {
    /// Package being deployed
    pub package: PackageConfig,

    /// Remote object storage
    pub storage: StorageConfig,

    /// Local staging area for the archive and index copy
    pub staging: StagingConfig,

    /// Package index behaviour
    pub index: IndexConfig,

    /// Fallbacks for missing descriptor fields
    pub defaults: DescriptorDefaults,

    /// Credential environment variable names
    pub credentials: CredentialsConfig,
}

/// Package identity and local layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageConfig {
    /// Package name, used as the top-level storage prefix
    pub name: String,

    /// Version being published
    pub version: String,

    /// Directory whose contents are archived
    pub source_dir: PathBuf,

    /// Path to the YAML descriptor
    pub descriptor: PathBuf,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: String::new(),
            source_dir: PathBuf::from(".."),
            descriptor: PathBuf::from("../pubspec.yaml"),
        }
    }
}

/// Storage backend kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Tencent COS through its S3-compatible API
    #[default]
    Cos,
    /// A directory on the local filesystem
    Local,
    /// Process-local store, lost on exit
    Memory,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cos => "cos",
            Self::Local => "local",
            Self::Memory => "memory",
        }
    }
}

/// Object storage settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    pub bucket: String,

    pub region: String,

    /// Endpoint override; defaults to `https://<bucket>.cos.<region>.myqcloud.com`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Root directory for the `local` backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Public URL prefix the bucket is served from
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Cos,
            bucket: "mpflutter-dist-1253771526".to_string(),
            region: "ap-guangzhou".to_string(),
            endpoint: None,
            path: None,
            public_base_url: "https://dist.mpflutter.com".to_string(),
        }
    }
}

impl StorageConfig {
    /// Endpoint used for the `cos` backend
    pub fn cos_endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{}.cos.{}.myqcloud.com", self.bucket, self.region))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct StagingConfig {
    pub dir: PathBuf,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexConfig {
    /// Version that is published but never promoted to `latest`
    pub development_version: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            development_version: "0.0.1-master".to_string(),
        }
    }
}

/// Literals substituted for missing descriptor fields
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DescriptorDefaults {
    pub author: String,
    pub description: String,
    pub homepage: String,
}

impl Default for DescriptorDefaults {
    fn default() -> Self {
        Self {
            author: "MPFlutter".to_string(),
            description: "/".to_string(),
            homepage: "/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CredentialsConfig {
    pub secret_id_env: String,
    pub secret_key_env: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            secret_id_env: "COS_SECRET_ID".to_string(),
            secret_key_env: "COS_SECRET_KEY".to_string(),
        }
    }
}
