//! Error types for the player remote.
//!
//! None of these reach a client: the protocol has no acknowledgment channel,
//! so every command-path error is logged where it is handled and dropped.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Why an inbound command was dropped.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("message is not json: {0}")]
    MalformedMessage(#[source] serde_json::Error),

    #[error("message has no string `name` field")]
    MissingCommandName,

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("play command has no string `link` field")]
    MissingLink,

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Failures turning a client link into a real path.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("link {0:?} does not name a folder alias")]
    EmptyLink(String),

    #[error("unknown folder alias {0:?}")]
    UnknownAlias(String),

    #[error("link {link:?} escapes the root of alias {alias:?}")]
    PathEscape { alias: String, link: String },

    #[error("{} does not exist", .0.display())]
    FileNotFound(PathBuf),
}

/// A call into the playback engine failed or did not finish in time.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to spawn {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("could not connect to mpv ipc socket {}: {source}", .socket.display())]
    Connect { socket: PathBuf, source: io::Error },

    #[error("engine i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("engine sent an unreadable reply: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("engine rejected {command}: {error}")]
    Command { command: String, error: String },

    #[error("engine connection closed")]
    Disconnected,

    #[error("engine has been shut down")]
    ShutDown,

    #[error("engine {op} call did not finish within {after:?}")]
    Timeout { op: &'static str, after: Duration },
}

/// A status push could not be queued for one connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendFailure {
    #[error("connection {0} is closed")]
    Closed(Uuid),

    #[error("connection {0} is not draining its outbound queue")]
    Backlogged(Uuid),
}

/// Invalid service configuration. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("folder alias {0:?} must be non-empty and must not contain '/'")]
    InvalidAlias(String),

    #[error("root of folder alias {alias:?} must be absolute, got {}", .root.display())]
    RelativeRoot { alias: String, root: PathBuf },

    #[error("endpoint {0:?} must start with '/'")]
    InvalidEndpoint(String),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("invalid bind address {value:?}: {source}")]
    Bind {
        value: String,
        source: std::net::AddrParseError,
    },
}
