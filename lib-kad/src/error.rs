//! Node-level error taxonomy
//!
//! Transport and framing failures are recovered locally (logged, dropped,
//! or retried by the lookup loop); authorization failures propagate to
//! the facade; configuration and bind failures are fatal at startup.

use lib_kad_crypto::AuthError;
use lib_kad_storage::StorageError;

#[derive(thiserror::Error, Debug)]
pub enum KadError {
    /// No reply arrived inside the RPC window.
    #[error("rpc timed out")]
    Timeout,

    /// Datagram too small, unknown verb, undecodable body, or an
    /// outgoing request over the size cap.
    #[error("malformed message: {reason}")]
    Malformed { reason: String },

    /// Signed-value gate rejection; surfaced to the facade.
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Unusable configuration value; fatal at startup.
    #[error("configuration out of range: {reason}")]
    OutOfRange { reason: String },

    /// Unreadable configuration file; fatal at startup.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Could not bind the datagram socket; fatal at startup.
    #[error("failed to bind datagram socket: {0}")]
    Bind(std::io::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Strict bootstrap found no reachable seed.
    #[error("no known peers to bootstrap from")]
    NoKnownPeers,

    /// An operation that needs a bound socket ran before `listen`.
    #[error("node is not listening")]
    NotListening,
}

impl KadError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        KadError::Malformed { reason: reason.into() }
    }
}
