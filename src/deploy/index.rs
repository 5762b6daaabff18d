//! Remote package index (`<name>/package.json`)
//!
//! The index is fetched, merged in memory and written back whole. There is
//! no locking: two concurrent deploys of the same package race and the last
//! writer wins.
//!
//! Entries already in the index are kept as raw JSON. Only the entry being
//! published goes through [`VersionEntry`]; older entries are matched by
//! their `"version"` string and otherwise copied through untouched.

use super::manifest::VersionEntry;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Document tracking all published versions of a package
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageIndex {
    #[serde(default, deserialize_with = "string_or_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<Value>,

    #[serde(default, deserialize_with = "array_or_empty")]
    pub versions: Vec<Value>,

    /// Top-level keys this tool does not know about, kept on write
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// `name` is overwritten on every merge
fn string_or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(name) => Ok(name),
        _ => Ok(String::new()),
    }
}

fn array_or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Value>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(items),
        _ => Ok(Vec::new()),
    }
}

/// Why an existing index was replaced by an empty one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexFallback {
    /// No index object stored yet
    Missing,
    /// The storage read failed
    Unreadable(String),
    /// The stored bytes are not a JSON object
    Malformed(String),
}

impl IndexFallback {
    /// Note worth surfacing to the user; `None` for a missing index
    pub fn describe(&self) -> Option<String> {
        match self {
            Self::Missing => None,
            Self::Unreadable(message) => {
                Some(format!("existing index could not be read: {}", message))
            }
            Self::Malformed(message) => Some(format!(
                "existing index was malformed and replaced: {}",
                message
            )),
        }
    }
}

/// What [`PackageIndex::apply`] changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexUpdate {
    /// An entry with the same version already existed and was replaced
    pub replaced: bool,
    /// `latest` now points at the new entry
    pub latest_updated: bool,
    /// Number of versions after the update
    pub version_count: usize,
}

fn entry_version(entry: &Value) -> Option<&str> {
    entry.get("version").and_then(Value::as_str)
}

impl PackageIndex {
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Parse stored index bytes; anything but a JSON object is an error
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Parse stored bytes, falling back to an empty index on malformed input
    pub fn parse_or_empty(name: &str, bytes: &[u8]) -> (Self, Option<IndexFallback>) {
        match Self::from_slice(bytes) {
            Ok(index) => (index, None),
            Err(e) => (Self::empty(name), Some(IndexFallback::Malformed(e.to_string()))),
        }
    }

    /// Merge `entry` into the index
    ///
    /// Every entry with the same version is replaced; otherwise the entry is
    /// appended. `latest` is updated unless the version equals
    /// `development_version`.
    pub fn apply(
        &mut self,
        name: &str,
        entry: &VersionEntry,
        development_version: &str,
    ) -> Result<IndexUpdate, serde_json::Error> {
        let value = serde_json::to_value(entry)?;
        self.name = name.to_string();

        let latest_updated = entry.version != development_version;
        if latest_updated {
            self.latest = Some(value.clone());
        }

        let mut replaced = false;
        for existing in self.versions.iter_mut() {
            if entry_version(existing) == Some(entry.version.as_str()) {
                *existing = value.clone();
                replaced = true;
            }
        }
        if !replaced {
            self.versions.push(value);
        }

        Ok(IndexUpdate {
            replaced,
            latest_updated,
            version_count: self.versions.len(),
        })
    }

    /// Stored entry for `version`, as written
    pub fn find(&self, version: &str) -> Option<&Value> {
        self.versions
            .iter()
            .find(|entry| entry_version(entry) == Some(version))
    }

    /// Compact JSON, as stored remotely
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DescriptorDefaults;
    use crate::deploy::descriptor::Descriptor;
    use crate::deploy::manifest::ManifestBuilder;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    const DEV: &str = "0.0.1-master";

    fn entry(version: &str, url: &str) -> VersionEntry {
        ManifestBuilder::new("http", version, DescriptorDefaults::default()).build(
            &Descriptor::default(),
            url,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    fn parse(stored: Value) -> PackageIndex {
        let (index, fallback) = PackageIndex::parse_or_empty("http", stored.to_string().as_bytes());
        assert_eq!(fallback, None);
        index
    }

    fn written(index: &PackageIndex) -> Value {
        serde_json::from_slice(&index.to_vec().unwrap()).unwrap()
    }

    #[test]
    fn test_first_publish_creates_single_entry_and_latest() {
        let mut index = PackageIndex::empty("http");

        let update = index.apply("http", &entry("1.0.0", "a"), DEV).unwrap();

        assert_eq!(index.versions.len(), 1);
        assert_eq!(index.latest.as_ref(), Some(&index.versions[0]));
        assert_eq!(index.versions[0]["archive_url"], "a");
        assert!(update.latest_updated);
        assert!(!update.replaced);
        assert_eq!(update.version_count, 1);
    }

    #[test]
    fn test_republish_replaces_existing_version() {
        let mut index = PackageIndex::empty("http");
        index.apply("http", &entry("1.0.0", "a"), DEV).unwrap();
        index.apply("http", &entry("1.1.0", "b"), DEV).unwrap();

        let update = index.apply("http", &entry("1.0.0", "c"), DEV).unwrap();

        assert!(update.replaced);
        assert_eq!(index.versions.len(), 2);
        assert_eq!(index.versions[0]["archive_url"], "c");
        assert_eq!(index.versions[1]["version"], "1.1.0");
        assert_eq!(index.latest.as_ref().unwrap()["archive_url"], "c");
    }

    #[test]
    fn test_development_version_never_updates_latest() {
        let mut index = PackageIndex::empty("http");
        index.apply("http", &entry("1.0.0", "a"), DEV).unwrap();

        let update = index.apply("http", &entry(DEV, "dev"), DEV).unwrap();

        assert!(!update.latest_updated);
        assert_eq!(index.latest.as_ref().unwrap()["version"], "1.0.0");
        assert_eq!(index.find(DEV).unwrap()["archive_url"], "dev");

        let mut fresh = PackageIndex::empty("http");
        fresh.apply("http", &entry(DEV, "dev"), DEV).unwrap();
        assert!(fresh.latest.is_none());
        assert!(!String::from_utf8(fresh.to_vec().unwrap()).unwrap().contains("latest"));
    }

    #[test]
    fn test_malformed_json_equals_absent_index() {
        let (from_garbage, fallback) = PackageIndex::parse_or_empty("http", b"{not json");
        assert!(matches!(fallback, Some(IndexFallback::Malformed(_))));
        assert_eq!(from_garbage, PackageIndex::empty("http"));

        let (from_array, fallback) = PackageIndex::parse_or_empty("http", b"[1, 2]");
        assert!(fallback.is_some());
        assert_eq!(from_array, PackageIndex::empty("http"));
    }

    #[test]
    fn test_off_schema_entries_survive_a_merge() {
        let mut index = parse(json!({
            "name": "http",
            "latest": {"version": "0.8.0", "pubspec": {"name": "http"}},
            "versions": [
                {"version": "0.8.0", "pubspec": {"name": "http"}},
                {"version": "0.9.0", "published": "last tuesday", "pubspec": {}}
            ]
        }));

        let update = index.apply("http", &entry("1.0.0", "a"), DEV).unwrap();

        assert!(!update.replaced);
        assert_eq!(update.version_count, 3);
        let out = written(&index);
        assert_eq!(out["versions"][0], json!({"version": "0.8.0", "pubspec": {"name": "http"}}));
        assert_eq!(out["versions"][1]["published"], "last tuesday");
        assert_eq!(out["versions"][2]["version"], "1.0.0");
        assert_eq!(out["latest"]["version"], "1.0.0");
    }

    #[test]
    fn test_nested_unknown_keys_are_preserved() {
        let old = json!({
            "version": "0.9.0",
            "retracted": true,
            "pubspec": {"name": "http", "version": "0.9.0", "publish_to": "none"}
        });
        let mut index = parse(json!({"name": "http", "versions": [old.clone()]}));

        index.apply("http", &entry("1.0.0", "a"), DEV).unwrap();

        let out = written(&index);
        assert_eq!(out["versions"][0], old);
        assert!(out["versions"][0]["pubspec"].get("author").is_none());
    }

    #[test]
    fn test_null_versions_keeps_other_keys() {
        let mut index = parse(json!({"name": "http", "versions": null, "owner": "mpflutter"}));
        assert!(index.versions.is_empty());

        index.apply("http", &entry("1.0.0", "a"), DEV).unwrap();

        let out = written(&index);
        assert_eq!(out["owner"], "mpflutter");
        assert_eq!(out["versions"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_keys_are_preserved() {
        let mut index = parse(json!({
            "name": "http",
            "versions": [],
            "maintainers": ["mpflutter"]
        }));

        index.apply("http", &entry("1.0.0", "a"), DEV).unwrap();
        let out = written(&index);

        assert_eq!(out["maintainers"], json!(["mpflutter"]));
        assert_eq!(out["name"], "http");
        assert_eq!(out["versions"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_entries_match_on_version_string_only() {
        let mut index = parse(json!({
            "versions": [{"version": 1}, {"version": "1.0.0", "note": "old"}]
        }));

        let update = index.apply("http", &entry("1.0.0", "a"), DEV).unwrap();

        assert!(update.replaced);
        assert_eq!(index.versions[0], json!({"version": 1}));
        assert!(index.versions[1].get("note").is_none());
    }

    #[test]
    fn test_empty_object_parses_as_empty_index() {
        let index = PackageIndex::from_slice(b"{}").unwrap();
        assert!(index.versions.is_empty());
        assert!(index.latest.is_none());
    }

    #[test]
    fn test_apply_renames_index() {
        let mut index = PackageIndex::from_slice(br#"{"name":7,"versions":[]}"#).unwrap();
        index.apply("http", &entry("1.0.0", "a"), DEV).unwrap();
        assert_eq!(index.name, "http");
    }
}
