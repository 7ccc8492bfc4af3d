//! Wayfarer Storage crate - key-value persistence for chat history.
//!
//! Provides a WAL-mode SQLite database with migrations, a SQLite-backed
//! [`KeyValueStore`], and an in-memory store for tests and ephemeral runs.

pub mod db;
pub mod kv;
pub mod migrations;

pub use db::Database;
pub use kv::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
