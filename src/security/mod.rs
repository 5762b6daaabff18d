pub mod credentials;

pub use credentials::{CredentialManager, Credentials, mask_token};
