pub mod archive;
pub mod descriptor;
pub mod index;
pub mod manifest;
pub mod publisher;
pub mod storage;

pub use archive::{ArchiveSummary, create_archive};
pub use descriptor::Descriptor;
pub use index::{IndexFallback, IndexUpdate, PackageIndex};
pub use manifest::{ManifestBuilder, Pubspec, VersionEntry, escape_constraint};
pub use publisher::{DeployOptions, DeployReport, IndexOutcome, Publisher};
pub use storage::ObjectStoreBucket;
