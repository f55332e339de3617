use std::io;
use thiserror::Error;

/// Errors raised while decoding an ICAP byte stream.
///
/// [`FrameTooLong`](DecodeError::FrameTooLong) and
/// [`MalformedSyntax`](DecodeError::MalformedSyntax) are fatal to the
/// connection's current decode cycle: once framing is lost the stream cannot
/// be resynchronized, so the transport layer is expected to close the channel
/// when it sees one of them.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// A line, header block or aggregated body exceeded its configured limit.
    #[error("frame too long: {reason} exceeds {limit} bytes")]
    FrameTooLong { reason: String, limit: usize },

    /// The input violates the ICAP or chunked-transfer grammar.
    #[error("malformed syntax: {reason}")]
    MalformedSyntax { reason: String },

    /// Structurally valid input used in a context the protocol forbids,
    /// e.g. a body marker naming an encapsulated message that is not there.
    #[error("protocol usage error: {reason}")]
    ProtocolUsage { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl DecodeError {
    pub fn frame_too_long<S: ToString>(reason: S, limit: usize) -> Self {
        Self::FrameTooLong { reason: reason.to_string(), limit }
    }

    pub fn malformed<S: ToString>(reason: S) -> Self {
        Self::MalformedSyntax { reason: reason.to_string() }
    }

    pub fn protocol_usage<S: ToString>(reason: S) -> Self {
        Self::ProtocolUsage { reason: reason.to_string() }
    }

    /// Returns true for size-limit violations.
    pub fn is_frame_too_long(&self) -> bool {
        matches!(self, Self::FrameTooLong { .. })
    }

    /// Returns true for grammar violations.
    pub fn is_malformed_syntax(&self) -> bool {
        matches!(self, Self::MalformedSyntax { .. })
    }

    /// Returns true for out-of-context protocol usage.
    pub fn is_protocol_usage(&self) -> bool {
        matches!(self, Self::ProtocolUsage { .. })
    }
}
