/*!
 * Latch Vault - credential storage for the background service
 *
 * This crate provides a trait-based credential store that can be swapped
 * between storage backends, a per-site staging area for credentials the
 * user is still typing, and a `CredentialService` that answers the page
 * agent's port requests.
 */

mod service;

pub use service::CredentialService;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Credential not found: {0}")]
    NotFound(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Nothing staged for site: {0}")]
    NothingStaged(String),

    #[error("Staged credential for {0} has no password")]
    IncompleteCredential(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

pub type Result<T> = std::result::Result<T, VaultError>;

// ============================================================================
// Data Types
// ============================================================================

/// Metadata about when and how a credential was used
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialMetadata {
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub usage_count: u32,
}

impl Default for CredentialMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            created: now,
            updated: now,
            last_used: None,
            usage_count: 0,
        }
    }
}

/// A credential persisted for one site
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredCredential {
    /// Site key the credential belongs to
    pub site: String,

    /// May be empty for password-only sites
    pub username: String,

    pub password: String,

    pub metadata: CredentialMetadata,
}

impl StoredCredential {
    pub fn new(
        site: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            site: site.into(),
            username: username.into(),
            password: password.into(),
            metadata: CredentialMetadata::default(),
        }
    }

    /// Replace the stored pair, keeping creation time and usage stats
    pub fn update(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.username = username.into();
        self.password = password.into();
        self.metadata.updated = Utc::now();
    }

    /// Mark the credential as used for autofill
    pub fn mark_used(&mut self) {
        self.metadata.last_used = Some(Utc::now());
        self.metadata.usage_count += 1;
    }
}

// ============================================================================
// Credential Store Trait
// ============================================================================

/// Trait for swappable credential storage backends, keyed by site key
pub trait CredentialStore {
    /// Store or replace the credential for a site
    fn set(&mut self, site: String, credential: StoredCredential) -> Result<()>;

    /// Retrieve the credential for a site
    fn get(&self, site: &str) -> Result<Option<StoredCredential>>;

    /// List all stored credentials
    fn list(&self) -> Result<Vec<StoredCredential>>;

    /// Delete the credential for a site
    fn delete(&mut self, site: &str) -> Result<()>;

    fn exists(&self, site: &str) -> bool {
        self.get(site).ok().flatten().is_some()
    }

    fn len(&self) -> usize {
        self.list().map(|items| items.len()).unwrap_or(0)
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// In-Memory Store Implementation
// ============================================================================

/// Volatile, unencrypted store. Suitable for tests and development only.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    items: HashMap<String, StoredCredential>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
        }
    }

    /// Create a store with initial credentials, keyed by their site
    pub fn with_credentials(credentials: Vec<StoredCredential>) -> Result<Self> {
        let mut store = Self::new();
        for credential in credentials {
            store.set(credential.site.clone(), credential)?;
        }
        Ok(store)
    }
}

impl CredentialStore for InMemoryStore {
    fn set(&mut self, site: String, credential: StoredCredential) -> Result<()> {
        if site.is_empty() {
            return Err(VaultError::InvalidKey("Site cannot be empty".to_string()));
        }

        self.items.insert(site, credential);
        Ok(())
    }

    fn get(&self, site: &str) -> Result<Option<StoredCredential>> {
        Ok(self.items.get(site).cloned())
    }

    fn list(&self) -> Result<Vec<StoredCredential>> {
        Ok(self.items.values().cloned().collect())
    }

    fn delete(&mut self, site: &str) -> Result<()> {
        match self.items.remove(site) {
            Some(_) => Ok(()),
            None => Err(VaultError::NotFound(site.to_string())),
        }
    }
}

// ============================================================================
// Staging
// ============================================================================

/// A credential the user is still typing. Each field is last-write-wins.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedCredential {
    pub username: Option<String>,
    pub password: Option<String>,
    pub updated: DateTime<Utc>,
}

impl Default for StagedCredential {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            updated: Utc::now(),
        }
    }
}

/// Per-site staged credentials awaiting a commit.
///
/// Entries for pages that never submitted are kept until overwritten or
/// committed.
#[derive(Debug, Default)]
pub struct StagingArea {
    pending: HashMap<String, StagedCredential>,
}

impl StagingArea {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_username(&mut self, site: &str, username: impl Into<String>) {
        let staged = self.pending.entry(site.to_string()).or_default();
        staged.username = Some(username.into());
        staged.updated = Utc::now();
    }

    pub fn set_password(&mut self, site: &str, password: impl Into<String>) {
        let staged = self.pending.entry(site.to_string()).or_default();
        staged.password = Some(password.into());
        staged.updated = Utc::now();
    }

    pub fn get(&self, site: &str) -> Option<&StagedCredential> {
        self.pending.get(site)
    }

    /// Remove and return the staged pair for a site
    pub fn take(&mut self, site: &str) -> Result<StagedCredential> {
        self.pending
            .remove(site)
            .ok_or_else(|| VaultError::NothingStaged(site.to_string()))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_credential(site: &str) -> StoredCredential {
        StoredCredential::new(site, "alice", "correct horse")
    }

    #[test]
    fn test_in_memory_store_crud() {
        let mut store = InMemoryStore::new();

        // Create
        let credential = create_test_credential("example.com");
        store
            .set("example.com".to_string(), credential.clone())
            .unwrap();

        // Read
        let retrieved = store.get("example.com").unwrap().unwrap();
        assert_eq!(retrieved.username, "alice");
        assert_eq!(retrieved.password, "correct horse");

        // Update
        let mut updated = credential.clone();
        updated.update("bob", "battery staple");
        store.set("example.com".to_string(), updated).unwrap();

        let retrieved = store.get("example.com").unwrap().unwrap();
        assert_eq!(retrieved.username, "bob");

        // Delete
        store.delete("example.com").unwrap();
        assert!(store.get("example.com").unwrap().is_none());
    }

    #[test]
    fn test_with_credentials_keys_by_site() {
        let store = InMemoryStore::with_credentials(vec![
            create_test_credential("example.com"),
            create_test_credential("github.com"),
        ])
        .unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.exists("github.com"));
        assert!(!store.exists("gitlab.com"));
    }

    #[test]
    fn test_with_credentials_rejects_empty_site() {
        let result = InMemoryStore::with_credentials(vec![
            create_test_credential("example.com"),
            create_test_credential(""),
        ]);
        assert!(matches!(result, Err(VaultError::InvalidKey(_))));
    }

    #[test]
    fn test_delete_nonexistent() {
        let mut store = InMemoryStore::new();
        assert!(matches!(
            store.delete("nonexistent"),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn test_empty_key() {
        let mut store = InMemoryStore::new();
        let credential = create_test_credential("");
        assert!(store.set("".to_string(), credential).is_err());
    }

    #[test]
    fn test_mark_used() {
        let mut credential = create_test_credential("example.com");
        assert_eq!(credential.metadata.usage_count, 0);
        assert!(credential.metadata.last_used.is_none());

        credential.mark_used();
        assert_eq!(credential.metadata.usage_count, 1);
        assert!(credential.metadata.last_used.is_some());
    }

    #[test]
    fn test_staging_last_write_wins() {
        let mut staging = StagingArea::new();
        staging.set_username("example.com", "a");
        staging.set_username("example.com", "al");
        staging.set_password("example.com", "p");
        staging.set_password("example.com", "pw");

        let staged = staging.get("example.com").unwrap();
        assert_eq!(staged.username.as_deref(), Some("al"));
        assert_eq!(staged.password.as_deref(), Some("pw"));
    }

    #[test]
    fn test_staging_is_partitioned_by_site() {
        let mut staging = StagingArea::new();
        staging.set_password("example.com", "one");
        staging.set_password("github.com", "two");

        assert_eq!(staging.len(), 2);
        let taken = staging.take("example.com").unwrap();
        assert_eq!(taken.password.as_deref(), Some("one"));
        assert!(taken.username.is_none());
        assert_eq!(staging.len(), 1);
    }

    #[test]
    fn test_take_without_staging() {
        let mut staging = StagingArea::new();
        assert!(matches!(
            staging.take("example.com"),
            Err(VaultError::NothingStaged(_))
        ));
    }
}
