use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};

use authgate_models::CredentialRecord;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("email already registered")]
    AlreadyExists,
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

/// Lookup and insert of local email/password credentials.
///
/// Stands in for a durable user store. Emails are unique: `insert` on an
/// existing key must fail atomically, even under concurrent signups.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find(&self, email: &str) -> Result<Option<CredentialRecord>, CredentialError>;

    async fn insert(&self, email: &str, record: CredentialRecord) -> Result<(), CredentialError>;
}

#[derive(Default)]
pub struct InMemoryCredentialStore {
    records: DashMap<String, CredentialRecord>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find(&self, email: &str) -> Result<Option<CredentialRecord>, CredentialError> {
        Ok(self.records.get(email).map(|record| record.value().clone()))
    }

    async fn insert(&self, email: &str, record: CredentialRecord) -> Result<(), CredentialError> {
        match self.records.entry(email.to_string()) {
            Entry::Occupied(_) => Err(CredentialError::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }
}
