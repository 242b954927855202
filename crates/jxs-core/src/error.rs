//! Error types for session operations

use thiserror::Error;

/// Result type for session operations
pub type JxsResult<T> = Result<T, JxsError>;

/// Errors that can occur while operating a decode or encode session
#[derive(Error, Debug)]
pub enum JxsError {
    #[error("Invalid file signature")]
    InvalidSignature,

    #[error("Invalid bitstream: {0}")]
    InvalidBitstream(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{0} not yet available")]
    NotReady(&'static str),

    #[error("A {0} lease is already active")]
    LeaseActive(&'static str),

    #[error("Call out of order: {0}")]
    OutOfOrder(String),

    #[error("No output buffer has been set")]
    OutputBufferNotSet,

    #[error("No new pixels available to flush")]
    NothingToFlush,

    #[error("Frame settings handle is stale")]
    StaleFrameSettings,

    #[error("Session has failed and must be reset")]
    SessionFailed,

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl JxsError {
    /// Coarse classification of the error, retained by the encoder for
    /// diagnostic queries after the original error has been returned.
    pub fn kind(&self) -> ErrorKind {
        match self {
            JxsError::InvalidSignature
            | JxsError::InvalidBitstream(_)
            | JxsError::InvalidHeader(_) => ErrorKind::Bitstream,
            JxsError::UnsupportedFeature(_) => ErrorKind::Unsupported,
            JxsError::InvalidDimensions { .. }
            | JxsError::BufferTooSmall { .. }
            | JxsError::InvalidParameter(_) => ErrorKind::Resource,
            JxsError::NotReady(_)
            | JxsError::LeaseActive(_)
            | JxsError::OutOfOrder(_)
            | JxsError::StaleFrameSettings => ErrorKind::Protocol,
            JxsError::OutputBufferNotSet | JxsError::NothingToFlush => ErrorKind::Flush,
            JxsError::SessionFailed => ErrorKind::Terminal,
            JxsError::IoError(_) => ErrorKind::Io,
        }
    }
}

/// Diagnostic error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or unparseable stream data
    Bitstream,
    /// Feature outside the supported subset
    Unsupported,
    /// Undersized buffers, out-of-range dimensions or parameters
    Resource,
    /// A call was made outside its valid window
    Protocol,
    /// Non-fatal flush classification
    Flush,
    /// Session is unusable until reset
    Terminal,
    /// Underlying I/O failure
    Io,
}
