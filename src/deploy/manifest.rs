//! Version manifest built from the descriptor
//!
//! A [`VersionEntry`] is what the package index stores for one published
//! version. It is created once per run and never mutated afterwards.

use super::descriptor::Descriptor;
use crate::core::config::DescriptorDefaults;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One published version's record within the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: String,
    pub pubspec: Pubspec,
    pub archive_url: String,
    #[serde(with = "iso_millis")]
    pub published: DateTime<Utc>,
}

/// Sanitized copy of the descriptor plus name and version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pubspec {
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub environment: PubspecEnvironment,
    #[serde(default = "empty_object")]
    pub dependencies: serde_json::Value,
    #[serde(default = "empty_object")]
    pub dev_dependencies: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PubspecEnvironment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flutter: Option<String>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// HTML-escape the comparison operators of a version constraint
///
/// `>=2.0.0 <3.0.0` becomes `&gt;=2.0.0 &lt;3.0.0`.
pub fn escape_constraint(constraint: &str) -> String {
    constraint.replace('>', "&gt;").replace('<', "&lt;")
}

/// Builds [`VersionEntry`] values for one package version
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    name: String,
    version: String,
    defaults: DescriptorDefaults,
}

impl ManifestBuilder {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        defaults: DescriptorDefaults,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            defaults,
        }
    }

    pub fn build(
        &self,
        descriptor: &Descriptor,
        archive_url: &str,
        published: DateTime<Utc>,
    ) -> VersionEntry {
        let environment = descriptor.environment.clone().unwrap_or_default();

        let pubspec = Pubspec {
            version: self.version.clone(),
            name: self.name.clone(),
            author: or_default(&descriptor.author, &self.defaults.author),
            description: or_default(&descriptor.description, &self.defaults.description),
            homepage: or_default(&descriptor.homepage, &self.defaults.homepage),
            environment: PubspecEnvironment {
                sdk: non_empty(&environment.sdk).map(escape_constraint),
                flutter: non_empty(&environment.flutter).map(escape_constraint),
            },
            dependencies: object_or_empty(&descriptor.dependencies),
            dev_dependencies: object_or_empty(&descriptor.dev_dependencies),
        };

        VersionEntry {
            version: self.version.clone(),
            pubspec,
            archive_url: archive_url.to_string(),
            published,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn or_default(value: &Option<String>, default: &str) -> String {
    non_empty(value).unwrap_or(default).to_string()
}

// A `dependencies:` key with nothing under it parses as null
fn object_or_empty(value: &Option<serde_json::Value>) -> serde_json::Value {
    match value {
        Some(v) if !v.is_null() => v.clone(),
        _ => empty_object(),
    }
}

/// ISO-8601 UTC with millisecond precision, e.g. `2024-05-01T08:30:00.000Z`
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
