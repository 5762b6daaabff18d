//! Object storage backends and key layout
//!
//! Keys:
//! - archive: `<name>/versions/<version>.tar.gz`
//! - index:   `<name>/package.json`

use crate::core::config::{StorageBackend, StorageConfig};
use crate::core::error::DeployError;
use crate::core::traits::{Bucket, StorageError};
use crate::security::Credentials;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::ObjectStore;
use object_store::path::Path as ObjectPath;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::debug;

use super::archive::archive_file_name;

pub fn archive_key(name: &str, version: &str) -> String {
    format!("{}/versions/{}", name, archive_file_name(version))
}

pub fn index_key(name: &str) -> String {
    format!("{}/package.json", name)
}

/// Public URL an object is served from; not checked against the store
pub fn public_url(base_url: &str, key: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), key)
}

/// [`Bucket`] backed by an `object_store` implementation
pub struct ObjectStoreBucket {
    backend: String,
    store: Arc<dyn ObjectStore>,
    credentials: Option<Credentials>,
}

impl ObjectStoreBucket {
    /// Wrap a pre-configured object store
    pub fn with_store(backend: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            backend: backend.into(),
            store,
            credentials: None,
        }
    }

    /// Open the backend named by the configuration
    ///
    /// `credentials` is required for the `cos` backend and ignored otherwise.
    pub fn open(config: &StorageConfig, credentials: Option<Credentials>) -> Result<Self, DeployError> {
        let backend = config.backend.as_str();
        let init_err = |message: String| DeployError::StorageInit {
            backend: backend.to_string(),
            message,
        };

        let store: Arc<dyn ObjectStore> = match config.backend {
            StorageBackend::Cos => {
                use object_store::aws::AmazonS3Builder;

                let creds = credentials
                    .as_ref()
                    .ok_or_else(|| init_err("credentials are required".to_string()))?;
                let endpoint = config.cos_endpoint();
                debug!(bucket = %config.bucket, endpoint = %endpoint, "opening cos bucket");

                let store = AmazonS3Builder::new()
                    .with_bucket_name(&config.bucket)
                    .with_region(&config.region)
                    .with_endpoint(endpoint)
                    .with_virtual_hosted_style_request(true)
                    .with_access_key_id(creds.secret_id.expose_secret())
                    .with_secret_access_key(creds.secret_key.expose_secret())
                    .build()
                    .map_err(|e| init_err(creds.mask_in(&e.to_string())))?;
                Arc::new(store)
            }
            StorageBackend::Local => {
                let path = config
                    .path
                    .as_ref()
                    .ok_or_else(|| init_err("storage.path is not set".to_string()))?;
                std::fs::create_dir_all(path)
                    .map_err(|e| init_err(format!("{}: {}", path.display(), e)))?;
                let store = object_store::local::LocalFileSystem::new_with_prefix(path)
                    .map_err(|e| init_err(e.to_string()))?;
                Arc::new(store)
            }
            StorageBackend::Memory => Arc::new(object_store::memory::InMemory::new()),
        };

        Ok(Self {
            credentials,
            ..Self::with_store(backend, store)
        })
    }

    fn error(&self, err: impl std::fmt::Display) -> StorageError {
        let message = match &self.credentials {
            Some(creds) => creds.mask_in(&err.to_string()),
            None => err.to_string(),
        };
        StorageError::new(&self.backend, message)
    }

    fn path(&self, key: &str) -> Result<ObjectPath, StorageError> {
        ObjectPath::parse(key).map_err(|e| self.error(e))
    }
}

#[async_trait]
impl Bucket for ObjectStoreBucket {
    fn name(&self) -> &str {
        &self.backend
    }

    async fn put(&self, key: &str, body: Bytes) -> Result<(), StorageError> {
        let path = self.path(key)?;
        debug!(key, size = body.len(), "put object");
        self.store
            .put(&path, body.into())
            .await
            .map_err(|e| self.error(e))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        let path = self.path(key)?;
        debug!(key, "get object");
        match self.store.get(&path).await {
            Ok(result) => result.bytes().await.map(Some).map_err(|e| self.error(e)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(self.error(e)),
        }
    }
}
