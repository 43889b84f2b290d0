/*!
    Error type shared by the ffmpeg crates.
*/

use thiserror::Error;

/**
    Errors reported by the conversion, encoding and muxing crates.
*/
#[derive(Debug, Error)]
pub enum Error {
    /// The codec library rejected an operation.
    #[error("codec error: {0}")]
    Codec(String),
    /// A format, codec or container could not be resolved.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    /// Input data did not match its declared shape.
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    pub fn unsupported_format(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
