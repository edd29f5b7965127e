use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised by the ingestion engine.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid endpoint address {ip}:{port}")]
    InvalidAddress { ip: String, port: u16 },

    #[error("CPU core {core} is out of range (0..{available})")]
    InvalidCore { core: usize, available: usize },

    #[error("no affinity cores configured; at least one worker is required")]
    NoWorkers,

    #[error("invalid setting `{name}`: {reason}")]
    InvalidSetting {
        name: &'static str,
        reason: &'static str,
    },

    #[error("ingestion engine is already running")]
    AlreadyRunning,

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("frame of {len} bytes exceeds the {limit} byte limit")]
    FrameTooLong { len: usize, limit: usize },

    #[error("failed to spawn ingestion worker: {0}")]
    Spawn(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;
