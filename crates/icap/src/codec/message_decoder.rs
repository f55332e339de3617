//! Streaming ICAP message decoder.
//!
//! This module turns a fragmented byte stream into a sequence of
//! [`IcapEvent`]s according to the ICAP framing grammar of
//! [RFC 3507](https://tools.ietf.org/html/rfc3507): the ICAP start line and
//! headers, the encapsulated HTTP heads announced by the `Encapsulated`
//! header, and a chunked body using the HTTP chunked-transfer grammar with
//! the ICAP-specific `0; ieof` preview early-termination marker.
//!
//! # State machine
//!
//! The decoder holds its position in the grammar as a `DecodeState` value
//! and executes one state at a time. A state either completes — consuming a
//! fully determined number of bytes and choosing its successor — or detects
//! that the buffered data is insufficient and returns without touching the
//! buffer, so the driver can suspend and resume losslessly once more bytes
//! arrive.

use bytes::{Buf, BytesMut};
use http::{Method, StatusCode, Uri, Version};
use tokio_util::codec::Decoder;
use tracing::trace;

use DecodeState::*;

use crate::codec::decoder_util::{
    ByteCursor, CR, LF, SizeBudget, build_header_map, parse_chunk_size_line, read_header_block, read_line,
};
use crate::ensure;
use crate::protocol::encapsulated::{SectionTag, parse_encapsulated};
use crate::protocol::{
    BodyKind, DecodeError, EmbeddedMessage, EmbeddedStartLine, ICAP_VERSION, IcapChunk, IcapChunkTrailer, IcapEvent,
    IcapMessage, StartLine,
};

/// Size limits applied by one decoder instance, immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderLimits {
    /// Bound for the ICAP start line, embedded HTTP start lines and
    /// chunk-size/delimiter lines.
    pub max_initial_line_length: usize,
    /// Bound for one header block. The ICAP headers, each embedded HTTP
    /// head and the trailing headers each get a fresh budget of this size.
    pub max_header_size: usize,
}

impl Default for DecoderLimits {
    fn default() -> Self {
        Self { max_initial_line_length: 4096, max_header_size: 8192 }
    }
}

/// The closed set of framing steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// ICAP start line, ICAP headers and the announced encapsulated HTTP
    /// heads, parsed as one atomic step.
    StartAndHeaders,
    /// Hex chunk-size line, possibly carrying the `0; ieof` preview marker.
    ChunkSize,
    /// Verbatim chunk payload of the previously parsed size.
    ChunkData,
    /// Line end between a chunk payload and the next size line.
    ChunkDelimiter,
    /// Trailer headers between the terminal zero-size chunk and the blank
    /// line that closes the body.
    TrailingHeaders,
}

/// Outcome of one completed state execution: a pure internal transition, or
/// a decoded object to forward together with the successor state.
#[derive(Debug)]
enum Step {
    Transition(DecodeState),
    Emit(IcapEvent, DecodeState),
}

/// A streaming decoder for ICAP requests and responses.
///
/// Implements [`Decoder`] over [`IcapEvent`]: one decode cycle yields a
/// [`IcapEvent::Message`] carrying the parsed header section, followed — for
/// messages with a body — by chunk events and a terminal last-chunk or
/// trailer event. `Ok(None)` means more bytes are needed; the buffer is left
/// exactly where the last completed step ended, so feeding arbitrarily
/// fragmented input never loses or duplicates work.
///
/// Pair with [`IcapChunkAggregator`](crate::codec::IcapChunkAggregator) (or
/// use [`AggregatingDecoder`](crate::codec::AggregatingDecoder)) to collapse
/// the event stream into complete messages.
#[derive(Debug)]
pub struct IcapMessageDecoder {
    limits: DecoderLimits,
    state: DecodeState,
    current_chunk_size: usize,
    early_terminated: bool,
}

impl IcapMessageDecoder {
    /// Creates a decoder with the default [`DecoderLimits`].
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a decoder with explicit size limits.
    pub fn with_limits(limits: DecoderLimits) -> Self {
        Self { limits, state: StartAndHeaders, current_chunk_size: 0, early_terminated: false }
    }
}

impl Default for IcapMessageDecoder {
    fn default() -> Self {
        Self::with_limits(DecoderLimits::default())
    }
}

impl Decoder for IcapMessageDecoder {
    type Item = IcapEvent;
    type Error = DecodeError;

    /// Runs framing states against the buffered bytes until one of them
    /// emits a decoded object or runs out of input.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(event))` when a decoded object is ready to forward
    /// - `Ok(None)` when more data is needed; nothing was consumed by the
    ///   interrupted step
    /// - `Err(DecodeError)` on a grammar or size-limit violation, fatal to
    ///   this decode cycle
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.is_empty() {
                return Ok(None);
            }

            let step = match self.state {
                StartAndHeaders => self.read_start_and_headers(src)?,
                ChunkSize => self.read_chunk_size(src)?,
                ChunkData => self.read_chunk_data(src)?,
                ChunkDelimiter => self.read_chunk_delimiter(src)?,
                TrailingHeaders => self.read_trailing_headers(src)?,
            };

            match step {
                None => return Ok(None),
                Some(Step::Transition(next)) => self.state = next,
                Some(Step::Emit(event, next)) => {
                    self.state = next;
                    return Ok(Some(event));
                }
            }
        }
    }
}

impl IcapMessageDecoder {
    /// Parses the complete header section: ICAP start line, ICAP headers
    /// and every encapsulated HTTP head the `Encapsulated` header announces.
    ///
    /// The whole section is treated as one atomic step; until the final
    /// blank line of the last announced head is buffered, nothing is
    /// consumed.
    fn read_start_and_headers(&mut self, src: &mut BytesMut) -> Result<Option<Step>, DecodeError> {
        // stray line ends between messages belong to no frame
        let skip = src.iter().take_while(|&&b| b == CR || b == LF).count();
        if skip > 0 {
            src.advance(skip);
        }
        if src.is_empty() {
            return Ok(None);
        }

        let mut cursor = ByteCursor::new(&src[..]);
        let mut line_budget = SizeBudget::new(self.limits.max_initial_line_length);
        let Some(line) = read_line(&mut cursor, &mut line_budget, "initial line")? else {
            return Ok(None);
        };
        let start_line = parse_start_line(line)?;

        let mut header_budget = SizeBudget::new(self.limits.max_header_size);
        let Some(raw_headers) = read_header_block(&mut cursor, &mut header_budget, "icap headers")? else {
            return Ok(None);
        };
        let headers = build_header_map(raw_headers)?;

        let sections = match headers.get("Encapsulated") {
            Some(value) => {
                let text = value.to_str().map_err(|_| DecodeError::malformed("unreadable encapsulated header"))?;
                parse_encapsulated(text)?
            }
            None => Vec::new(),
        };

        let mut http_request = None;
        let mut http_response = None;
        let mut body = BodyKind::None;
        for (tag, _offset) in &sections {
            match tag {
                SectionTag::ReqHdr => {
                    let Some(embedded) = self.read_embedded_message(&mut cursor)? else {
                        return Ok(None);
                    };
                    http_request = Some(embedded);
                }
                SectionTag::ResHdr => {
                    let Some(embedded) = self.read_embedded_message(&mut cursor)? else {
                        return Ok(None);
                    };
                    http_response = Some(embedded);
                }
                SectionTag::ReqBody => body = BodyKind::RequestBody,
                SectionTag::ResBody => body = BodyKind::ResponseBody,
                SectionTag::OptBody => body = BodyKind::OptionsBody,
                SectionTag::NullBody => body = BodyKind::NullBody,
            }
        }

        let preview = match headers.get("Preview") {
            Some(value) => {
                let text = value.to_str().map_err(|_| DecodeError::malformed("unreadable preview header"))?;
                let length = text
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| DecodeError::malformed(format!("invalid preview length {text:?}")))?;
                Some(length)
            }
            None => None,
        };

        let consumed = cursor.pos();
        src.advance(consumed);

        let message = IcapMessage::new(start_line, headers, http_request, http_response, body, preview);
        trace!(consumed, body = ?message.body_kind(), "decoded icap message head");

        let next = if message.body_kind().expects_chunks() { ChunkSize } else { StartAndHeaders };
        Ok(Some(Step::Emit(IcapEvent::Message(message), next)))
    }

    /// Parses one encapsulated HTTP head: start line plus folded header
    /// block, each under a fresh budget.
    fn read_embedded_message(&self, cursor: &mut ByteCursor<'_>) -> Result<Option<EmbeddedMessage>, DecodeError> {
        let mut line_budget = SizeBudget::new(self.limits.max_initial_line_length);
        let Some(line) = read_line(cursor, &mut line_budget, "embedded http start line")? else {
            return Ok(None);
        };
        let start_line = parse_embedded_start_line(line)?;

        let mut header_budget = SizeBudget::new(self.limits.max_header_size);
        let Some(raw_headers) = read_header_block(cursor, &mut header_budget, "embedded http headers")? else {
            return Ok(None);
        };
        Ok(Some(EmbeddedMessage::new(start_line, build_header_map(raw_headers)?)))
    }

    fn read_chunk_size(&mut self, src: &mut BytesMut) -> Result<Option<Step>, DecodeError> {
        let mut cursor = ByteCursor::new(&src[..]);
        let mut budget = SizeBudget::new(self.limits.max_initial_line_length);
        let Some(line) = read_line(&mut cursor, &mut budget, "chunk size line")? else {
            return Ok(None);
        };
        let (size, early_terminated) = parse_chunk_size_line(line)?;
        src.advance(cursor.pos());

        self.current_chunk_size = size;
        self.early_terminated = early_terminated;
        trace!(size, early_terminated, "chunk size line");
        Ok(Some(Step::Transition(if size == 0 { TrailingHeaders } else { ChunkData })))
    }

    /// Waits for the full chunk payload, then emits it verbatim.
    fn read_chunk_data(&mut self, src: &mut BytesMut) -> Result<Option<Step>, DecodeError> {
        if src.len() < self.current_chunk_size {
            return Ok(None);
        }
        let data = src.split_to(self.current_chunk_size).freeze();
        self.current_chunk_size = 0;
        trace!(len = data.len(), "chunk payload");
        Ok(Some(Step::Emit(IcapEvent::Chunk(IcapChunk::new(data)), ChunkDelimiter)))
    }

    /// Consumes through the line end that separates a chunk payload from
    /// the next size line. Emits nothing.
    fn read_chunk_delimiter(&mut self, src: &mut BytesMut) -> Result<Option<Step>, DecodeError> {
        match src.iter().position(|&b| b == LF) {
            Some(end) => {
                src.advance(end + 1);
                Ok(Some(Step::Transition(ChunkSize)))
            }
            None => {
                ensure!(
                    src.len() <= self.limits.max_initial_line_length,
                    DecodeError::frame_too_long("chunk delimiter", self.limits.max_initial_line_length)
                );
                Ok(None)
            }
        }
    }

    /// Reads trailer headers up to the blank line that closes the body.
    ///
    /// With trailer headers present this emits an [`IcapChunkTrailer`],
    /// otherwise the terminal last-chunk marker carrying the recorded
    /// `ieof` flag. Either way the decode cycle is complete and the driver
    /// returns to awaiting the next message.
    fn read_trailing_headers(&mut self, src: &mut BytesMut) -> Result<Option<Step>, DecodeError> {
        let mut cursor = ByteCursor::new(&src[..]);
        let mut budget = SizeBudget::new(self.limits.max_header_size);
        let Some(raw_headers) = read_header_block(&mut cursor, &mut budget, "trailing headers")? else {
            return Ok(None);
        };
        src.advance(cursor.pos());

        let early_terminated = std::mem::replace(&mut self.early_terminated, false);
        let event = if raw_headers.is_empty() {
            trace!(early_terminated, "chunked body complete");
            IcapEvent::Chunk(IcapChunk::last(early_terminated))
        } else {
            let raw_headers: Vec<_> =
                raw_headers.into_iter().filter(|(name, _)| !is_disallowed_trailer_name(name)).collect();
            trace!(count = raw_headers.len(), "chunked body complete with trailer");
            IcapEvent::Trailer(IcapChunkTrailer::new(build_header_map(raw_headers)?))
        };
        Ok(Some(Step::Emit(event, StartAndHeaders)))
    }
}

/// Parses an ICAP start line, distinguishing requests from responses by the
/// leading version token.
fn parse_start_line(line: &[u8]) -> Result<StartLine, DecodeError> {
    let text = std::str::from_utf8(line).map_err(|_| DecodeError::malformed("start line is not valid ascii"))?;
    let mut parts = text.split_ascii_whitespace();
    let first = parts.next().ok_or_else(|| DecodeError::malformed("empty start line"))?;

    if first.starts_with("ICAP/") {
        ensure!(first == ICAP_VERSION, DecodeError::malformed(format!("unsupported icap version {first:?}")));
        let code = parts.next().ok_or_else(|| DecodeError::malformed("status line without code"))?;
        let status = StatusCode::from_bytes(code.as_bytes())
            .map_err(|_| DecodeError::malformed(format!("invalid status code {code:?}")))?;
        // the reason phrase adds nothing over the status code
        Ok(StartLine::Response { status })
    } else {
        let method = Method::from_bytes(first.as_bytes())
            .map_err(|_| DecodeError::malformed(format!("invalid method {first:?}")))?;
        let uri = parts.next().ok_or_else(|| DecodeError::malformed("request line without uri"))?;
        let uri =
            uri.parse::<Uri>().map_err(|_| DecodeError::malformed(format!("invalid request uri {uri:?}")))?;
        let version = parts.next().ok_or_else(|| DecodeError::malformed("request line without version"))?;
        ensure!(version == ICAP_VERSION, DecodeError::malformed(format!("unsupported icap version {version:?}")));
        ensure!(parts.next().is_none(), DecodeError::malformed("trailing tokens after request line"));
        Ok(StartLine::Request { method, uri })
    }
}

/// Parses the start line of an encapsulated HTTP request or response.
fn parse_embedded_start_line(line: &[u8]) -> Result<EmbeddedStartLine, DecodeError> {
    let text =
        std::str::from_utf8(line).map_err(|_| DecodeError::malformed("embedded start line is not valid ascii"))?;
    let mut parts = text.split_ascii_whitespace();
    let first = parts.next().ok_or_else(|| DecodeError::malformed("empty embedded start line"))?;

    if first.starts_with("HTTP/") {
        let version = parse_http_version(first)?;
        let code = parts.next().ok_or_else(|| DecodeError::malformed("embedded status line without code"))?;
        let status = StatusCode::from_bytes(code.as_bytes())
            .map_err(|_| DecodeError::malformed(format!("invalid embedded status code {code:?}")))?;
        Ok(EmbeddedStartLine::Response { version, status })
    } else {
        let method = Method::from_bytes(first.as_bytes())
            .map_err(|_| DecodeError::malformed(format!("invalid embedded method {first:?}")))?;
        let uri = parts.next().ok_or_else(|| DecodeError::malformed("embedded request line without uri"))?;
        let uri = uri
            .parse::<Uri>()
            .map_err(|_| DecodeError::malformed(format!("invalid embedded request uri {uri:?}")))?;
        let version = parts.next().ok_or_else(|| DecodeError::malformed("embedded request line without version"))?;
        let version = parse_http_version(version)?;
        ensure!(parts.next().is_none(), DecodeError::malformed("trailing tokens after embedded request line"));
        Ok(EmbeddedStartLine::Request { method, uri, version })
    }
}

fn parse_http_version(token: &str) -> Result<Version, DecodeError> {
    match token {
        "HTTP/1.1" => Ok(Version::HTTP_11),
        "HTTP/1.0" => Ok(Version::HTTP_10),
        _ => Err(DecodeError::malformed(format!("unsupported http version {token:?}"))),
    }
}

/// Framing-level names have no place in a trailer and are dropped silently.
fn is_disallowed_trailer_name(name: &[u8]) -> bool {
    const DISALLOWED: [&[u8]; 3] = [b"content-length", b"transfer-encoding", b"trailer"];
    DISALLOWED.iter().any(|disallowed| name.eq_ignore_ascii_case(disallowed))
}
