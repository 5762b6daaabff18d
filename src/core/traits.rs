//! Core traits for deployment
//!
//! The publisher only ever talks to remote storage through [`Bucket`], so a
//! run can target COS, a local mirror, or a test double.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Failure reported by a storage backend
#[derive(Error, Debug)]
#[error("{backend}: {message}")]
pub struct StorageError {
    pub backend: String,
    pub message: String,
}

impl StorageError {
    pub fn new(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

/// Flat key/value object storage
///
/// Keys are `/`-separated and carry no leading slash
/// (e.g. `shared_preferences/package.json`).
#[async_trait]
pub trait Bucket: Send + Sync {
    /// Backend name for logs and errors (e.g., "cos", "memory")
    fn name(&self) -> &str;

    /// Store `body` under `key`, overwriting any existing object
    async fn put(&self, key: &str, body: Bytes) -> Result<(), StorageError>;

    /// Fetch the object at `key`; `Ok(None)` when it does not exist
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError>;
}
