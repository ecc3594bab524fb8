//! Account authentication: password hashing and cookie sessions.
//!
//! Provides:
//! - Argon2id password hashing with per-hash random salt (PHC strings)
//! - Opaque session tokens held in process memory, idle-expiring
//! - HMAC-SHA256 signed session cookies

pub mod password;
pub mod session;

pub use password::{hash_password, verify_password};
pub use session::{MemorySessionStore, SessionCookie, SessionStore};
