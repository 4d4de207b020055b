use garnet_binary::BinaryError;
use std::io;
use thiserror::Error;

/// Errors that can occur inside the router.
///
/// These never cross the substrate callback boundary: the frame dispatch
/// entry points catch them, log, and drop the offending frame.
#[derive(Error, Debug)]
pub enum RouterError {
    /// An I/O error from the frame substrate.
    #[error("Frame substrate I/O error: {0}")]
    Io(#[from] io::Error),

    /// An error occurred during wire encoding or decoding.
    #[error("Wire handling error: {0}")]
    Binary(#[from] BinaryError),

    /// A frame was too short or failed a sanity check.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// A stored IP header checksum did not match the recomputed one.
    #[error("IP header checksum mismatch")]
    ChecksumMismatch,

    /// A routing-table entry referenced an interface the router does not have.
    #[error("Unknown interface: {0}")]
    UnknownInterface(String),

    /// A routing-table line could not be parsed.
    #[error("Bad routing table line {line}: {reason}")]
    RouteParse { line: usize, reason: String },
}

/// Result type alias for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;
