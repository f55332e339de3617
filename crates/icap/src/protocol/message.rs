//! ICAP message model.
//!
//! An [`IcapMessage`] is created once the decoder has parsed the full header
//! section (ICAP start line, ICAP headers and any encapsulated HTTP heads).
//! It is then mutated only by the chunk aggregator, which fills the body
//! buffer of the section named by [`BodyKind`] and copies trailer headers,
//! before ownership moves to the application layer.

use bytes::BytesMut;
use http::{HeaderMap, Method, StatusCode, Uri, Version};

use crate::protocol::{DecodeError, IcapChunk, IcapChunkTrailer};

/// The one and only ICAP protocol version (RFC 3507).
pub const ICAP_VERSION: &str = "ICAP/1.0";

/// Objects produced by the streaming decoder and consumed by the aggregator.
///
/// One decode cycle yields a `Message`, followed — when the message carries a
/// body — by zero or more `Chunk`s and finally either a last-chunk marker or
/// a `Trailer`.
#[derive(Debug, Clone, PartialEq)]
pub enum IcapEvent {
    Message(IcapMessage),
    Chunk(IcapChunk),
    Trailer(IcapChunkTrailer),
}

impl IcapEvent {
    pub fn is_message(&self) -> bool {
        matches!(self, Self::Message(_))
    }

    pub fn is_chunk(&self) -> bool {
        matches!(self, Self::Chunk(_))
    }

    pub fn is_trailer(&self) -> bool {
        matches!(self, Self::Trailer(_))
    }

    /// Unwraps the message, if this event carries one.
    pub fn into_message(self) -> Option<IcapMessage> {
        match self {
            Self::Message(message) => Some(message),
            _ => None,
        }
    }

    /// Unwraps the chunk, if this event carries one.
    pub fn into_chunk(self) -> Option<IcapChunk> {
        match self {
            Self::Chunk(chunk) => Some(chunk),
            _ => None,
        }
    }
}

/// Which encapsulated section owns the message body.
///
/// Derived from the final entry of the `Encapsulated` header. At most one
/// section is the body owner; `None` and `NullBody` mean no chunked body
/// follows the header sections on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// No `Encapsulated` body entry at all (e.g. OPTIONS requests).
    None,
    /// Explicit `null-body` entry: header sections only.
    NullBody,
    /// `req-body`: the encapsulated HTTP request carries the chunked body.
    RequestBody,
    /// `res-body`: the encapsulated HTTP response carries the chunked body.
    ResponseBody,
    /// `opt-body`: an OPTIONS body owned by the ICAP message itself.
    OptionsBody,
}

impl BodyKind {
    /// True when a chunked body follows the header sections.
    pub fn expects_chunks(self) -> bool {
        matches!(self, Self::RequestBody | Self::ResponseBody | Self::OptionsBody)
    }
}

/// Start line of an ICAP message.
#[derive(Debug, Clone, PartialEq)]
pub enum StartLine {
    /// `REQMOD icap://... ICAP/1.0`
    Request { method: Method, uri: Uri },
    /// `ICAP/1.0 200 OK`
    Response { status: StatusCode },
}

/// Start line of an encapsulated HTTP message.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddedStartLine {
    Request { method: Method, uri: Uri, version: Version },
    Response { version: Version, status: StatusCode },
}

/// An encapsulated HTTP request or response: start line, headers and the
/// aggregated body buffer.
///
/// The body buffer stays empty unless this section is the body owner, in
/// which case the aggregator appends decoded chunk payloads to it.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedMessage {
    pub(crate) start_line: EmbeddedStartLine,
    pub(crate) headers: HeaderMap,
    pub(crate) body: BytesMut,
}

impl EmbeddedMessage {
    pub(crate) fn new(start_line: EmbeddedStartLine, headers: HeaderMap) -> Self {
        Self { start_line, headers, body: BytesMut::new() }
    }

    pub fn start_line(&self) -> &EmbeddedStartLine {
        &self.start_line
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The reassembled body. Empty unless this section owns the message body
    /// and aggregation has completed.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The request method, when this is an embedded request.
    pub fn method(&self) -> Option<&Method> {
        match &self.start_line {
            EmbeddedStartLine::Request { method, .. } => Some(method),
            EmbeddedStartLine::Response { .. } => None,
        }
    }

    /// The request URI, when this is an embedded request.
    pub fn uri(&self) -> Option<&Uri> {
        match &self.start_line {
            EmbeddedStartLine::Request { uri, .. } => Some(uri),
            EmbeddedStartLine::Response { .. } => None,
        }
    }

    /// The response status, when this is an embedded response.
    pub fn status(&self) -> Option<StatusCode> {
        match &self.start_line {
            EmbeddedStartLine::Request { .. } => None,
            EmbeddedStartLine::Response { status, .. } => Some(*status),
        }
    }

    pub fn version(&self) -> Version {
        match &self.start_line {
            EmbeddedStartLine::Request { version, .. } | EmbeddedStartLine::Response { version, .. } => *version,
        }
    }
}

/// A fully parsed ICAP request or response.
///
/// Headers form a case-insensitive multimap with insertion order preserved.
/// The encapsulated HTTP request/response heads are attached as
/// [`EmbeddedMessage`]s; at most one of them (or the message itself, for
/// `opt-body`) owns the chunked body.
#[derive(Debug, Clone, PartialEq)]
pub struct IcapMessage {
    start_line: StartLine,
    headers: HeaderMap,
    http_request: Option<EmbeddedMessage>,
    http_response: Option<EmbeddedMessage>,
    body: BodyKind,
    options_body: BytesMut,
    preview: Option<usize>,
}

impl IcapMessage {
    pub(crate) fn new(
        start_line: StartLine,
        headers: HeaderMap,
        http_request: Option<EmbeddedMessage>,
        http_response: Option<EmbeddedMessage>,
        body: BodyKind,
        preview: Option<usize>,
    ) -> Self {
        Self { start_line, headers, http_request, http_response, body, options_body: BytesMut::new(), preview }
    }

    pub fn start_line(&self) -> &StartLine {
        &self.start_line
    }

    /// The ICAP method, when this is a request.
    pub fn method(&self) -> Option<&Method> {
        match &self.start_line {
            StartLine::Request { method, .. } => Some(method),
            StartLine::Response { .. } => None,
        }
    }

    /// The ICAP service URI, when this is a request.
    pub fn uri(&self) -> Option<&Uri> {
        match &self.start_line {
            StartLine::Request { uri, .. } => Some(uri),
            StartLine::Response { .. } => None,
        }
    }

    /// The ICAP status code, when this is a response.
    pub fn status(&self) -> Option<StatusCode> {
        match &self.start_line {
            StartLine::Request { .. } => None,
            StartLine::Response { status } => Some(*status),
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The encapsulated HTTP request head, when `req-hdr` was announced.
    pub fn http_request(&self) -> Option<&EmbeddedMessage> {
        self.http_request.as_ref()
    }

    /// The encapsulated HTTP response head, when `res-hdr` was announced.
    pub fn http_response(&self) -> Option<&EmbeddedMessage> {
        self.http_response.as_ref()
    }

    pub fn body_kind(&self) -> BodyKind {
        self.body
    }

    /// The aggregated `opt-body` content. Empty for every other body kind.
    pub fn options_body(&self) -> &[u8] {
        &self.options_body
    }

    /// The announced preview length, when the `Preview` header is present.
    pub fn preview(&self) -> Option<usize> {
        self.preview
    }

    pub fn is_preview(&self) -> bool {
        self.preview.is_some()
    }

    /// True when the `Allow` header lists 204.
    pub fn allows_204(&self) -> bool {
        self.allow_contains("204")
    }

    /// True when the `Allow` header lists 206.
    pub fn allows_206(&self) -> bool {
        self.allow_contains("206")
    }

    fn allow_contains(&self, token: &str) -> bool {
        self.headers
            .get_all("Allow")
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .any(|candidate| candidate.trim() == token)
    }

    /// Resolves the buffer that receives aggregated body bytes, per the
    /// body marker. Fails when the marked section is not present.
    pub(crate) fn body_buffer_mut(&mut self) -> Result<&mut BytesMut, DecodeError> {
        match self.body {
            BodyKind::RequestBody => self
                .http_request
                .as_mut()
                .map(|message| &mut message.body)
                .ok_or_else(|| DecodeError::protocol_usage("req-body announced but no encapsulated request present")),
            BodyKind::ResponseBody => self
                .http_response
                .as_mut()
                .map(|message| &mut message.body)
                .ok_or_else(|| DecodeError::protocol_usage("res-body announced but no encapsulated response present")),
            BodyKind::OptionsBody => Ok(&mut self.options_body),
            BodyKind::None | BodyKind::NullBody => Err(DecodeError::protocol_usage("message carries no body")),
        }
    }

    /// Resolves the body owner and guarantees it starts from an empty buffer.
    pub(crate) fn ensure_body_buffer(&mut self) -> Result<(), DecodeError> {
        self.body_buffer_mut().map(BytesMut::clear)
    }

    /// The header set that receives trailer headers after the terminal
    /// chunk. For `opt-body` that is the ICAP header set itself.
    pub(crate) fn trailer_headers_mut(&mut self) -> Result<&mut HeaderMap, DecodeError> {
        match self.body {
            BodyKind::RequestBody => self
                .http_request
                .as_mut()
                .map(|message| &mut message.headers)
                .ok_or_else(|| DecodeError::protocol_usage("req-body announced but no encapsulated request present")),
            BodyKind::ResponseBody => self
                .http_response
                .as_mut()
                .map(|message| &mut message.headers)
                .ok_or_else(|| DecodeError::protocol_usage("res-body announced but no encapsulated response present")),
            BodyKind::OptionsBody => Ok(&mut self.headers),
            BodyKind::None | BodyKind::NullBody => {
                Err(DecodeError::protocol_usage("a message without body cannot carry trailing headers"))
            }
        }
    }
}
