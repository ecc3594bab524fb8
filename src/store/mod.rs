//! Document store for user accounts and notes.
//!
//! Two logical collections are kept:
//! - `users`: name, phone, email, password hash
//! - `notes`: title, content
//!
//! Backends implement [`DocumentStore`]. [`FirestoreStore`] talks to a remote
//! Firestore project (or its emulator); [`SqliteStore`] keeps the same two
//! collections in a local SQLite file.
//!
//! Email uniqueness is not enforced here. Callers check for an existing user
//! before creating one.

pub mod firestore;
pub mod oauth;
pub mod sqlite;

pub use firestore::FirestoreStore;
pub use sqlite::SqliteStore;

use crate::config::{Config, StoreBackend};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Collection holding user accounts.
pub const USERS: &str = "users";

/// Collection holding notes.
pub const NOTES: &str = "notes";

/// A stored user account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Store-assigned document id.
    pub id: String,
    pub name: String,
    pub phone: String,
    pub email: String,
    /// Argon2 PHC string, never the plaintext password.
    pub password_hash: String,
}

/// Fields for a user that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub password_hash: String,
}

/// A shared note. Notes carry no owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// First user whose `email` field equals `email` exactly.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Insert a user and return its assigned id.
    async fn create_user(&self, user: &NewUser) -> Result<String>;

    /// Every note, in store order.
    async fn list_notes(&self) -> Result<Vec<Note>>;

    /// Insert a note and return its assigned id.
    async fn add_note(&self, title: &str, content: &str) -> Result<String>;
}

/// Build the configured store.
pub fn create_store(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    match config.store.backend {
        StoreBackend::Sqlite => {
            let path = config.sqlite_path();
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let store = SqliteStore::open(&path)?;
            tracing::info!(
                path = %path.display(),
                users = store.user_count()?,
                "Opened SQLite document store"
            );
            Ok(Arc::new(store))
        }
        StoreBackend::Firestore => {
            let store = FirestoreStore::from_config(&config.store)?;
            tracing::info!(project = store.project_id(), "Using Firestore document store");
            Ok(Arc::new(store))
        }
    }
}
