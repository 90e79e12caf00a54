//! The shared error taxonomy for meshrpc.
//!
//! [`Error`] is the single kind-tagged enum threaded through the frame
//! codec, payload codecs, link layer, transport, pool, registry, and
//! balancers. Transport and server crates wrap it rather than redefine it.

use thiserror::Error;

/// A meshrpc error, tagged by kind rather than by originating crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid frame magic number")]
    InvalidMagic,

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("codec failure: {0}")]
    CodecFailure(String),

    #[error("value is not a protobuf message")]
    InvalidProtobufMessage,

    #[error("unsupported codec content-type: {0}")]
    UnsupportedCodec(String),

    #[error("link layer failure: {0}")]
    LinkFailure(String),

    #[error("transport closed")]
    TransportClosed,

    #[error("connection pool closed")]
    PoolClosed,

    #[error("connection pool exhausted")]
    PoolExhausted,

    #[error("no available service instances")]
    NoAvailableInstances,

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("no eligible methods to register")]
    NoAvailableMethods,

    #[error("invalid weight value: {0}")]
    InvalidWeight(String),

    #[error("call cancelled")]
    Cancelled,

    #[error("call timed out")]
    Timeout,

    #[error("remote error: {0}")]
    RemoteError(String),
}

impl Error {
    /// Whether this error closes the transport it occurred on.
    ///
    /// Link- and frame-level errors leave the byte stream in an
    /// unrecoverable state; codec errors for a single call do not.
    pub fn is_transport_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidMagic
                | Error::InvalidFrame(_)
                | Error::LinkFailure(_)
                | Error::TransportClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_fatal_kinds() {
        assert!(Error::InvalidMagic.is_transport_fatal());
        assert!(Error::InvalidFrame("short".into()).is_transport_fatal());
        assert!(Error::LinkFailure("auth tag mismatch".into()).is_transport_fatal());
        assert!(!Error::CodecFailure("bad json".into()).is_transport_fatal());
        assert!(!Error::RemoteError("boom".into()).is_transport_fatal());
    }
}
