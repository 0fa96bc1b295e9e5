//! # Networking Error Types
//!
//! One enum per concern, plus [`NetError`] for the binaries and the runtime
//! that have to surface any of them.

use cinder_core::TerrainError;
use thiserror::Error;

/// Errors decoding a message payload.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Zero-length payload, so there is no tag.
    #[error("empty payload")]
    Empty,

    /// A known tag with a body shorter than its layout.
    #[error("truncated message tag {tag}: need {needed} bytes, have {available}")]
    Truncated {
        /// Tag byte.
        tag: u8,
        /// Payload size the tag requires.
        needed: usize,
        /// Payload size received.
        available: usize,
    },
}

/// Errors building a frame.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Payload does not fit the u16 length prefix.
    #[error("payload of {0} bytes exceeds the 65535 byte frame limit")]
    TooLarge(usize),
}

/// Errors reported by a snapshot store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for the expected shape.
    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but makes no sense.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level error for the runtime and binaries.
#[derive(Error, Debug)]
pub enum NetError {
    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Tile map failure.
    #[error(transparent)]
    Terrain(#[from] TerrainError),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for the runtime and binaries.
pub type NetResult<T> = Result<T, NetError>;
