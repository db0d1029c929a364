//! # showdeck-store
//!
//! Local cache for the show server, backed by SQLite.
//!
//! Holds the mirrored event/logo catalog alongside users, conversations and
//! messages.  The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! model.  Callers that live on an async runtime share it behind a mutex.

pub mod conversations;
pub mod database;
pub mod events;
pub mod logos;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod timers;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
