use std::{io, time::Duration};

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Couldn't resolve statsd address {addr}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("Resolving statsd address {addr} took longer than {timeout:?}")]
    ResolveTimeout { addr: String, timeout: Duration },
    #[error("Statsd address {addr} didn't resolve to any socket address")]
    NoAddress { addr: String },
    #[error("Couldn't connect the statsd socket: {0}")]
    Connect(#[source] io::Error),
    #[error("Couldn't start the sender thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("Queue capacity must be at least 1")]
    InvalidCapacity,
    #[error("Client is closed")]
    Closed,
    /// Only ever handed to the diagnostic sink, the caller that produced the line has already returned.
    #[error("Failed to send {line:?}: {source}")]
    Transmit {
        line: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to close the transport: {0}")]
    Close(#[source] io::Error),
    #[error("Sender thread panicked")]
    SenderPanicked,
}
