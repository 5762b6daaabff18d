//! Publisher - runs the deploy steps for one package version
//!
//! 1. archive the source tree into the staging directory
//! 2. upload the archive under its versioned key
//! 3. build the version manifest from the descriptor
//! 4. merge the manifest into the remote index and write it back
//!
//! Steps run strictly in order and the first failure stops the run.

use super::archive::{ArchiveSummary, archive_file_name, create_archive};
use super::descriptor::Descriptor;
use super::index::{IndexFallback, IndexUpdate, PackageIndex};
use super::manifest::{ManifestBuilder, VersionEntry};
use super::storage::{archive_key, index_key, public_url};
use crate::core::config::DeployConfig;
use crate::core::error::DeployError;
use crate::core::traits::Bucket;
use bytes::Bytes;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tracing::{debug, info, warn};

/// Options for a deploy run
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Build everything locally but skip both uploads
    pub dry_run: bool,
}

/// Outcome of a deploy run
#[derive(Debug, Clone)]
pub struct DeployReport {
    pub package_name: String,
    pub version: String,
    pub archive_url: String,
    pub archive: ArchiveSummary,
    pub index: IndexUpdate,
    pub index_path: PathBuf,
    pub dry_run: bool,
    pub published_at: chrono::DateTime<Utc>,
    pub warnings: Vec<String>,
    /// Wall time in milliseconds
    pub duration: u64,
}

/// Result of the index step
#[derive(Debug, Clone)]
pub struct IndexOutcome {
    pub update: IndexUpdate,
    pub index: PackageIndex,
    /// Staging copy of the written index
    pub path: PathBuf,
    pub fallback: Option<IndexFallback>,
}

/// Deploys one package version to a bucket
pub struct Publisher {
    config: DeployConfig,
    bucket: Arc<dyn Bucket>,
}

impl Publisher {
    pub fn new(config: DeployConfig, bucket: Arc<dyn Bucket>) -> Self {
        Self { config, bucket }
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    fn name(&self) -> &str {
        &self.config.package.name
    }

    fn version(&self) -> &str {
        &self.config.package.version
    }

    /// Staging path of the archive
    pub fn archive_path(&self) -> PathBuf {
        self.config.staging.dir.join(archive_file_name(self.version()))
    }

    /// Staging path of the index copy
    pub fn index_path(&self) -> PathBuf {
        self.config
            .staging
            .dir
            .join(format!("{}.package.json", self.name()))
    }

    /// URL the archive is served from once uploaded
    pub fn archive_url(&self) -> String {
        public_url(
            &self.config.storage.public_base_url,
            &archive_key(self.name(), self.version()),
        )
    }

    /// Run all steps
    pub async fn deploy(&self, options: DeployOptions) -> Result<DeployReport, DeployError> {
        let start_time = Instant::now();
        let mut warnings = Vec::new();

        info!(
            package = self.name(),
            version = self.version(),
            bucket = self.bucket.name(),
            dry_run = options.dry_run,
            "deploy started"
        );

        let archive = self.archive().await?;

        let archive_url = if options.dry_run {
            info!(url = %self.archive_url(), "dry run: archive upload skipped");
            self.archive_url()
        } else {
            self.upload(&archive.path).await?
        };

        let entry = self.build_manifest(&archive_url).await?;

        let outcome = if options.dry_run {
            self.prepare_index(&entry).await?
        } else {
            self.publish_index(&entry).await?
        };

        if let Some(note) = outcome.fallback.as_ref().and_then(IndexFallback::describe) {
            warnings.push(note);
        }

        info!(
            package = self.name(),
            version = self.version(),
            versions = outcome.update.version_count,
            latest_updated = outcome.update.latest_updated,
            "deploy finished"
        );

        Ok(DeployReport {
            package_name: self.name().to_string(),
            version: self.version().to_string(),
            archive_url,
            archive,
            index: outcome.update,
            index_path: outcome.path,
            dry_run: options.dry_run,
            published_at: entry.published,
            warnings,
            duration: start_time.elapsed().as_millis() as u64,
        })
    }

    /// Archive the source directory into the staging directory
    pub async fn archive(&self) -> Result<ArchiveSummary, DeployError> {
        let staging = self.config.staging.dir.clone();
        fs::create_dir_all(&staging)
            .await
            .map_err(|e| DeployError::StagingFailed {
                path: staging.clone(),
                message: e.to_string(),
            })?;

        let source = self.config.package.source_dir.clone();
        let dest = self.archive_path();
        info!(source = %source.display(), dest = %dest.display(), "archiving");

        let source_for_task = source.clone();
        tokio::task::spawn_blocking(move || create_archive(&source_for_task, &dest))
            .await
            .map_err(|e| DeployError::ArchiveFailed {
                path: source,
                message: e.to_string(),
            })?
    }

    /// Upload the staged archive and return its public URL
    pub async fn upload(&self, path: &Path) -> Result<String, DeployError> {
        let key = archive_key(self.name(), self.version());

        let body = fs::read(path).await.map_err(|e| DeployError::StagingFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        info!(key = %key, size = body.len(), "uploading archive");

        self.bucket
            .put(&key, Bytes::from(body))
            .await
            .map_err(|e| DeployError::UploadFailed {
                key: key.clone(),
                message: e.to_string(),
            })?;

        Ok(self.archive_url())
    }

    /// Build the version manifest from the local descriptor
    pub async fn build_manifest(&self, archive_url: &str) -> Result<VersionEntry, DeployError> {
        let descriptor = Descriptor::from_path(&self.config.package.descriptor).await?;
        debug!(path = %self.config.package.descriptor.display(), "descriptor parsed");

        let builder = ManifestBuilder::new(
            self.name(),
            self.version(),
            self.config.defaults.clone(),
        );
        Ok(builder.build(&descriptor, archive_url, Utc::now()))
    }

    /// Merge `entry` into the remote index and upload the result
    pub async fn publish_index(&self, entry: &VersionEntry) -> Result<IndexOutcome, DeployError> {
        let outcome = self.prepare_index(entry).await?;
        let key = index_key(self.name());

        let body = fs::read(&outcome.path)
            .await
            .map_err(|e| DeployError::StagingFailed {
                path: outcome.path.clone(),
                message: e.to_string(),
            })?;
        info!(key = %key, size = body.len(), "writing package index");

        self.bucket
            .put(&key, Bytes::from(body))
            .await
            .map_err(|e| DeployError::IndexWriteFailed {
                key,
                message: e.to_string(),
            })?;

        Ok(outcome)
    }

    /// Fetch the remote index, merge `entry` and write the staging copy
    pub async fn prepare_index(&self, entry: &VersionEntry) -> Result<IndexOutcome, DeployError> {
        let (mut index, fallback) = self.fetch_index().await;

        let update = index.apply(
            self.name(),
            entry,
            &self.config.index.development_version,
        )?;
        if !update.latest_updated {
            info!(version = %entry.version, "development version, latest left unchanged");
        }

        let path = self.index_path();
        fs::write(&path, index.to_vec()?)
            .await
            .map_err(|e| DeployError::StagingFailed {
                path: path.clone(),
                message: e.to_string(),
            })?;

        Ok(IndexOutcome {
            update,
            index,
            path,
            fallback,
        })
    }

    /// Fetch the remote index; any failure yields an empty index
    pub async fn fetch_index(&self) -> (PackageIndex, Option<IndexFallback>) {
        let key = index_key(self.name());

        match self.bucket.get(&key).await {
            Ok(Some(bytes)) => {
                let (index, fallback) = PackageIndex::parse_or_empty(self.name(), &bytes);
                if let Some(IndexFallback::Malformed(message)) = &fallback {
                    warn!(key = %key, error = %message, "malformed package index, starting empty");
                }
                (index, fallback)
            }
            Ok(None) => {
                info!(key = %key, "no package index yet, starting empty");
                (PackageIndex::empty(self.name()), Some(IndexFallback::Missing))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "package index unreadable, starting empty");
                (
                    PackageIndex::empty(self.name()),
                    Some(IndexFallback::Unreadable(e.to_string())),
                )
            }
        }
    }
}
