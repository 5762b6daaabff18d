//! Local package descriptor (`pubspec.yaml`)

use crate::core::error::DeployError;
use serde::{Deserialize, Deserializer, de};
use serde_json::Value;
use std::path::Path;
use tokio::fs;

/// Fields of the descriptor that end up in the published manifest
///
/// Anything else in the file is ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Descriptor {
    #[serde(default, deserialize_with = "scalar_text")]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub homepage: Option<String>,
    #[serde(default)]
    pub environment: Option<DescriptorEnvironment>,
    #[serde(default)]
    pub dependencies: Option<Value>,
    #[serde(default)]
    pub dev_dependencies: Option<Value>,
}

/// Any scalar as text; `false`, `0` and null read as absent
fn scalar_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(None),
        Some(Value::Bool(true)) => Ok(Some("true".to_string())),
        Some(Value::Number(n)) if n.as_f64() == Some(0.0) => Ok(None),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(other) => Err(de::Error::custom(format!(
            "expected a string, found {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DescriptorEnvironment {
    #[serde(default)]
    pub sdk: Option<String>,
    #[serde(default)]
    pub flutter: Option<String>,
}

impl Descriptor {
    /// Read and parse the descriptor at `path`
    pub async fn from_path(path: &Path) -> Result<Self, DeployError> {
        let content =
            fs::read_to_string(path)
                .await
                .map_err(|e| DeployError::DescriptorUnreadable {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;

        Self::parse(&content).map_err(|e| DeployError::DescriptorInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Parse descriptor YAML; an empty document yields an empty descriptor
    pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let parsed: Option<Self> = serde_yaml::from_str(content)?;
        Ok(parsed.unwrap_or_default())
    }
}
