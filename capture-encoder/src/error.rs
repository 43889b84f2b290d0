use thiserror::Error;

use crate::registry::SessionId;

/**
    Errors reported by capture sessions and the registry.
*/
#[derive(Debug, Error)]
pub enum Error {
    // ── Construction ───────────────────────────────────────────────────
    #[error("failed to allocate encoder: {0}")]
    AllocationFailure(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    // ── Per-frame ──────────────────────────────────────────────────────
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("audio codec reported no usable frame size")]
    NotReady,
    #[error("failed to write packet: {0}")]
    BackendWriteFailure(String),
    #[error(transparent)]
    Codec(#[from] ffmpeg_types::Error),

    // ── Lifecycle ──────────────────────────────────────────────────────
    #[error("session has already been flushed")]
    Finished,
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
