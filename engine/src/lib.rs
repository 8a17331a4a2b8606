//! Remote control for a media player.
//!
//! Clients connect to a WebSocket endpoint, send `play`/`stop` commands and
//! receive a status snapshot every couple of seconds. Files are addressed
//! through folder aliases and never resolve outside their configured roots.

pub mod broadcaster;
pub mod commands;
pub mod config;
pub mod connections;
pub mod engine;
pub mod error;
pub mod paths;
pub mod service;
pub mod status;
pub mod ws;

pub use service::PlayerService;
