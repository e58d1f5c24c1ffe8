//! Authentication module for managing user sessions and credentials.
//!
//! - `Session`: bearer-token session persisted to the cache directory,
//!   expiring after 30 minutes
//! - `CredentialStore`: optional password storage in the OS keychain
//!
//! The session token is the only thing persisted; cached entity data lives in
//! memory for the life of one `QueryClient`.

pub mod credentials;
pub mod session;

pub use credentials::CredentialStore;
pub use session::{Session, SessionData};
