use std::time::Duration;

/// Core error type for the monitor.
///
/// Adapter crates (gateway client, SQLite store, HTTP surface) map their
/// specific errors into this type so the pipeline can tell per-channel
/// failures, flood-control signals and fatal auth problems apart.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("channel {channel} unavailable: {reason}")]
    ChannelUnavailable { channel: String, reason: String },

    #[error("flood control: retry after {seconds}s")]
    FloodWait { seconds: u64 },

    #[error("flood control wait of {seconds}s exceeds threshold")]
    FloodWaitTooLong { seconds: u64 },

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Server-suggested wait for flood-control signals.
    pub fn flood_wait(&self) -> Option<Duration> {
        match self {
            Error::FloodWait { seconds } => Some(Duration::from_secs(*seconds)),
            _ => None,
        }
    }

    /// Stable machine-readable tag, used as the `error` field of JSON bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::Auth(_) => "auth_error",
            Error::ChannelUnavailable { .. } => "channel_unavailable",
            Error::FloodWait { .. } => "flood_wait",
            Error::FloodWaitTooLong { .. } => "flood_wait",
            Error::Rpc(_) => "rpc_error",
            Error::Storage(_) => "storage_error",
            Error::NotFound(_) => "not_found",
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
            Error::External(_) => "external_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
