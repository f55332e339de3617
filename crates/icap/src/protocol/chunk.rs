//! Chunk-level objects produced by the streaming decoder.
//!
//! A chunked encapsulated body arrives as a sequence of [`IcapChunk`] events
//! followed by either a terminal last-chunk marker or an [`IcapChunkTrailer`]
//! when header lines follow the zero-size chunk. Both are ephemeral: the
//! aggregator consumes them immediately and only the reassembled message
//! survives.

use bytes::Bytes;
use http::HeaderMap;

/// One decoded segment of a chunked encapsulated body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcapChunk {
    data: Bytes,
    last: bool,
    early_terminated: bool,
}

impl IcapChunk {
    /// Creates a payload-carrying chunk.
    pub fn new(data: Bytes) -> Self {
        Self { data, last: false, early_terminated: false }
    }

    /// Creates the terminal zero-size marker, with the early-termination
    /// flag set when the body ended on the preview `0; ieof` line.
    pub fn last(early_terminated: bool) -> Self {
        Self { data: Bytes::new(), last: true, early_terminated }
    }

    /// The chunk payload. Empty for the terminal marker.
    pub fn content(&self) -> &Bytes {
        &self.data
    }

    /// Consumes the chunk and returns its payload.
    pub fn into_content(self) -> Bytes {
        self.data
    }

    /// True for the terminal marker that closes a body.
    pub fn is_last(&self) -> bool {
        self.last
    }

    /// True when the body was cut short by the preview `0; ieof` line.
    pub fn is_early_terminated(&self) -> bool {
        self.early_terminated
    }
}

/// Trailer headers following the terminal zero-size chunk.
///
/// Emitted at most once per body; a body without trailer headers produces a
/// terminal [`IcapChunk`] marker instead.
#[derive(Debug, Clone, PartialEq)]
pub struct IcapChunkTrailer {
    headers: HeaderMap,
}

impl IcapChunkTrailer {
    pub(crate) fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn into_headers(self) -> HeaderMap {
        self.headers
    }
}
