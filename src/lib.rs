pub mod core;
pub mod deploy;
pub mod security;

pub use self::core::*;
pub use deploy::{
    DeployOptions, DeployReport, Descriptor, ObjectStoreBucket, PackageIndex, Publisher,
    VersionEntry,
};
pub use security::{CredentialManager, Credentials};
