//! Error types for the dirtlink-core crate.

use thiserror::Error;

/// Errors from the OSC receiver lifecycle.
///
/// Per-datagram decode problems are not represented here: they are logged and
/// absorbed inside the reactor so that one bad packet can never stop the
/// listening loop.
#[derive(Error, Debug)]
pub enum ReceiverError {
    /// Binding the UDP socket failed; the receiver stays unbound and may be
    /// retried via `restart`.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The receiver is already listening.
    #[error("Receiver is already bound")]
    AlreadyBound,

    /// Socket configuration error.
    #[error("Socket error: {0}")]
    Socket(#[from] std::io::Error),
}

/// A tempo update was rejected by the rendering engine in every candidate
/// shape. The retained tempo model is left unchanged, so the next inbound
/// sample re-evaluates from the prior state.
#[derive(Error, Debug)]
#[error("All {attempts} tempo candidate(s) rejected; last error: {last}")]
pub struct ApplyError {
    /// Number of candidates offered.
    pub attempts: usize,
    /// The rejection reason from the last candidate tried.
    pub last: anyhow::Error,
}
