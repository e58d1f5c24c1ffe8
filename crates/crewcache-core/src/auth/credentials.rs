use anyhow::{Context, Result};
use keyring::Entry;
use tracing::debug;

const SERVICE_NAME: &str = "crewcache";

/// Keychain account for a login name. Admin logins are case-insensitive on
/// the server, so `Alice` and `alice ` share one stored password.
fn account(username: &str) -> String {
    username.trim().to_lowercase()
}

fn entry(username: &str) -> Result<Entry> {
    Entry::new(SERVICE_NAME, &account(username)).context("Failed to create keyring entry")
}

pub struct CredentialStore;

impl CredentialStore {
    /// Store username and password in the OS keychain
    pub fn store(username: &str, password: &str) -> Result<()> {
        entry(username)?
            .set_password(password)
            .context("Failed to store password in keychain")?;
        debug!(account = %account(username), "Stored password in keychain");
        Ok(())
    }

    pub fn get_password(username: &str) -> Result<String> {
        entry(username)?
            .get_password()
            .context("Failed to retrieve password from keychain")
    }

    /// Delete stored credentials for a username. Missing credentials are not an error.
    pub fn delete(username: &str) -> Result<()> {
        match entry(username)?.delete_credential() {
            Ok(()) => {
                debug!(account = %account(username), "Removed password from keychain");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete credential from keychain"),
        }
    }

    pub fn has_credentials(username: &str) -> bool {
        entry(username)
            .map(|entry| entry.get_password().is_ok())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_ignores_case_and_padding() {
        assert_eq!(account("Alice"), "alice");
        assert_eq!(account("  alice "), "alice");
        assert_eq!(account("bob.smith"), "bob.smith");
    }
}
