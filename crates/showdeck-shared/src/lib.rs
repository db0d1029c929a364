//! # showdeck-shared
//!
//! Vocabulary shared by the store and every control surface of the show
//! server: user roles, sync-mode snapshots, timer settings, the WebSocket
//! event envelope and the OSC address map.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ValidationError;
