use garnet_binary::BinaryError;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors that can occur within the transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// An I/O error from the datagram substrate.
    #[error("Substrate I/O error: {0}")]
    Io(#[from] io::Error),

    /// An error occurred during segment encoding or decoding.
    #[error("Segment codec error: {0}")]
    Binary(#[from] BinaryError),

    /// No session is registered for the given peer.
    #[error("No session for peer {0}")]
    SessionNotFound(SocketAddr),
}

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
