//! Lingobook: a small language learning web app.
//!
//! Accounts with hashed passwords, cookie sessions, a shared notes board
//! backed by SQLite or Cloud Firestore, and a translator page that calls the
//! Google Cloud Translation API.

pub mod auth;
pub mod config;
pub mod gateway;
pub mod store;
pub mod translate;
