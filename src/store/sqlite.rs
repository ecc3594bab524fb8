//! SQLite-backed document store.
//!
//! Tables:
//! - `users`: id, name, phone, email, password_hash, created_at
//! - `notes`: seq, id, title, content, created_at

use super::{DocumentStore, NewUser, Note, User};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// SQLite document store. Ids are random UUIDs, like a document database.
pub struct SqliteStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = rusqlite::Connection::open(db_path)?;

        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        Self::init_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for tests and throwaway runs).
    pub fn in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        Self::init_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_tables(conn: &rusqlite::Connection) -> Result<()> {
        // email is indexed but not UNIQUE: uniqueness is checked by the caller,
        // same as the Firestore backend which has no such constraint.
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                phone TEXT NOT NULL,
                email TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);

            CREATE TABLE IF NOT EXISTS notes (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Count stored users.
    pub fn user_count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let row = conn.query_row(
            "SELECT id, name, phone, email, password_hash
             FROM users WHERE email = ?1 ORDER BY created_at LIMIT 1",
            rusqlite::params![email],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    phone: row.get(2)?,
                    email: row.get(3)?,
                    password_hash: row.get(4)?,
                })
            },
        );

        match row {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_user(&self, user: &NewUser) -> Result<String> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, name, phone, email, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                id,
                user.name,
                user.phone,
                user.email,
                user.password_hash,
                epoch_secs() as i64,
            ],
        )?;
        Ok(id)
    }

    async fn list_notes(&self) -> Result<Vec<Note>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, title, content FROM notes ORDER BY seq")?;
        let notes = stmt
            .query_map([], |row| {
                Ok(Note {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    content: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notes)
    }

    async fn add_note(&self, title: &str, content: &str) -> Result<String> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO notes (id, title, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, title, content, epoch_secs() as i64],
        )?;
        Ok(id)
    }
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Ada".into(),
            phone: "555-0100".into(),
            email: email.into(),
            password_hash: "$argon2id$fake".into(),
        }
    }

    #[tokio::test]
    async fn create_and_find_user_by_email() {
        let store = SqliteStore::in_memory().unwrap();

        let id = store.create_user(&new_user("ada@example.com")).await.unwrap();
        assert!(!id.is_empty());

        let user = store
            .find_user_by_email("ada@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.name, "Ada");
        assert_eq!(user.phone, "555-0100");
        assert_eq!(user.password_hash, "$argon2id$fake");
    }

    #[tokio::test]
    async fn find_unknown_email_returns_none() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store
            .find_user_by_email("ghost@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn email_lookup_is_exact_match() {
        let store = SqliteStore::in_memory().unwrap();
        store.create_user(&new_user("ada@example.com")).await.unwrap();
        assert!(store
            .find_user_by_email("ADA@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn user_ids_are_unique() {
        let store = SqliteStore::in_memory().unwrap();
        let a = store.create_user(&new_user("a@example.com")).await.unwrap();
        let b = store.create_user(&new_user("b@example.com")).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.user_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn notes_list_in_insertion_order() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.list_notes().await.unwrap().is_empty());

        store.add_note("first", "one").await.unwrap();
        store.add_note("second", "two").await.unwrap();
        store.add_note("", "").await.unwrap();

        let notes = store.list_notes().await.unwrap();
        let titles: Vec<_> = notes.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["first", "second", ""]);
        assert_eq!(notes[1].content, "two");
    }

    #[tokio::test]
    async fn file_backed_store_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lingobook.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.add_note("kept", "across reopen").await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let notes = store.list_notes().await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "kept");
    }
}
