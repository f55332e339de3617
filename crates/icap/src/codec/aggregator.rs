//! Chunk aggregation: collapsing the decoded event stream into complete
//! messages.
//!
//! The streaming decoder emits a message head followed by individual body
//! chunks. Most consumers want neither: they want one [`IcapMessage`] whose
//! encapsulated HTTP part carries the fully reassembled body. The
//! [`IcapChunkAggregator`] does that reassembly, bounded by a configurable
//! aggregate size, and [`AggregatingDecoder`] packages decoder plus
//! aggregator behind a single [`Decoder`] implementation.

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::message_decoder::{DecoderLimits, IcapMessageDecoder};
use crate::protocol::{DecodeError, IcapEvent, IcapMessage};

/// Reassembles chunked encapsulated bodies into one contiguous buffer on
/// the owning HTTP sub-message.
///
/// The aggregator is either idle or holding exactly one in-progress message.
/// Messages without a body pass straight through; for messages with a body
/// the chunk payloads are appended — in emission order — to the buffer of
/// the section named by the body marker, and trailer headers are copied onto
/// that section's header set before the completed message is released.
///
/// Events that do not belong to an in-progress aggregation (a chunk or
/// trailer arriving while idle) are passed through unchanged.
#[derive(Debug)]
pub struct IcapChunkAggregator {
    max_content_length: usize,
    holding: Option<IcapMessage>,
}

impl IcapChunkAggregator {
    /// Creates an aggregator enforcing the given aggregate body limit.
    pub fn new(max_content_length: usize) -> Self {
        Self { max_content_length, holding: None }
    }

    /// True while a message body is being collected.
    pub fn is_aggregating(&self) -> bool {
        self.holding.is_some()
    }

    /// Feeds one decoded event through the aggregator.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(IcapEvent::Message(_)))` when a message is complete —
    ///   immediately for body-less messages, after the terminal chunk or
    ///   trailer otherwise
    /// - `Ok(Some(_))` passing through an event unrelated to aggregation
    /// - `Ok(None)` while body content is still being collected
    /// - `Err(DecodeError)` when the aggregate body limit is exceeded or the
    ///   body marker names a section the message does not carry; the held
    ///   message is dropped, the violation is fatal to the connection
    pub fn aggregate(&mut self, event: IcapEvent) -> Result<Option<IcapEvent>, DecodeError> {
        match event {
            IcapEvent::Message(mut message) => {
                if !message.body_kind().expects_chunks() {
                    return Ok(Some(IcapEvent::Message(message)));
                }
                message.ensure_body_buffer()?;
                trace!(body = ?message.body_kind(), "begin body aggregation");
                self.holding = Some(message);
                Ok(None)
            }
            IcapEvent::Chunk(chunk) => {
                let Some(held) = self.holding.as_mut() else {
                    return Ok(Some(IcapEvent::Chunk(chunk)));
                };
                if chunk.is_last() {
                    trace!(early_terminated = chunk.is_early_terminated(), "body aggregation complete");
                    let message = self.holding.take();
                    return Ok(message.map(IcapEvent::Message));
                }

                let max_content_length = self.max_content_length;
                let body = held.body_buffer_mut()?;
                if body.len() + chunk.content().len() > max_content_length {
                    self.holding = None;
                    return Err(DecodeError::frame_too_long("aggregated body", max_content_length));
                }
                body.extend_from_slice(chunk.content());
                trace!(buffered = body.len(), "appended chunk payload");
                Ok(None)
            }
            IcapEvent::Trailer(trailer) => {
                let Some(mut message) = self.holding.take() else {
                    return Ok(Some(IcapEvent::Trailer(trailer)));
                };
                let headers = message.trailer_headers_mut()?;
                for (name, value) in trailer.headers() {
                    headers.append(name.clone(), value.clone());
                }
                trace!(count = trailer.headers().len(), "copied trailer headers, body aggregation complete");
                Ok(Some(IcapEvent::Message(message)))
            }
        }
    }
}

/// A [`Decoder`] yielding one fully aggregated [`IcapMessage`] per decode
/// cycle.
///
/// Composes [`IcapMessageDecoder`] and [`IcapChunkAggregator`]: chunk and
/// trailer events are absorbed internally and only complete messages
/// surface. Orphan chunk events with no in-progress message are discarded —
/// nothing upstream of this decoder wants them.
#[derive(Debug)]
pub struct AggregatingDecoder {
    decoder: IcapMessageDecoder,
    aggregator: IcapChunkAggregator,
}

impl AggregatingDecoder {
    /// Creates a decoder with default [`DecoderLimits`] and the given
    /// aggregate body limit.
    pub fn new(max_content_length: usize) -> Self {
        Self::with_limits(DecoderLimits::default(), max_content_length)
    }

    /// Creates a decoder with explicit size limits.
    pub fn with_limits(limits: DecoderLimits, max_content_length: usize) -> Self {
        Self {
            decoder: IcapMessageDecoder::with_limits(limits),
            aggregator: IcapChunkAggregator::new(max_content_length),
        }
    }
}

impl Decoder for AggregatingDecoder {
    type Item = IcapMessage;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while let Some(event) = self.decoder.decode(src)? {
            match self.aggregator.aggregate(event)? {
                Some(IcapEvent::Message(message)) => return Ok(Some(message)),
                Some(_) | None => {}
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{BodyKind, EmbeddedMessage, EmbeddedStartLine, IcapChunk, IcapChunkTrailer, StartLine};
    use bytes::Bytes;
    use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Version};

    fn message_with_body(body: BodyKind) -> IcapMessage {
        let start_line = StartLine::Request {
            method: Method::from_bytes(b"RESPMOD").unwrap(),
            uri: "icap://icap.example.net/scan".parse().unwrap(),
        };
        let http_response = EmbeddedMessage::new(
            EmbeddedStartLine::Response { version: Version::HTTP_11, status: StatusCode::OK },
            HeaderMap::new(),
        );
        IcapMessage::new(start_line, HeaderMap::new(), None, Some(http_response), body, None)
    }

    fn chunk(data: &'static [u8]) -> IcapEvent {
        IcapEvent::Chunk(IcapChunk::new(Bytes::from_static(data)))
    }

    #[test]
    fn aggregates_chunks_into_body() {
        let mut aggregator = IcapChunkAggregator::new(1024);
        assert!(aggregator.aggregate(IcapEvent::Message(message_with_body(BodyKind::ResponseBody))).unwrap().is_none());
        assert!(aggregator.is_aggregating());

        assert!(aggregator.aggregate(chunk(b"Wiki")).unwrap().is_none());
        assert!(aggregator.aggregate(chunk(b"pedia")).unwrap().is_none());

        let emitted = aggregator.aggregate(IcapEvent::Chunk(IcapChunk::last(false))).unwrap().unwrap();
        let message = emitted.into_message().unwrap();
        assert_eq!(message.http_response().unwrap().body(), b"Wikipedia");
        assert!(!aggregator.is_aggregating());
    }

    #[test]
    fn null_body_message_passes_straight_through() {
        let mut aggregator = IcapChunkAggregator::new(1024);
        let emitted = aggregator.aggregate(IcapEvent::Message(message_with_body(BodyKind::NullBody))).unwrap();
        assert!(emitted.unwrap().is_message());
        assert!(!aggregator.is_aggregating());
    }

    #[test]
    fn body_size_boundary_is_inclusive() {
        // "Wikipedia" is nine bytes: exactly the limit succeeds
        let mut aggregator = IcapChunkAggregator::new(9);
        aggregator.aggregate(IcapEvent::Message(message_with_body(BodyKind::ResponseBody))).unwrap();
        assert!(aggregator.aggregate(chunk(b"Wiki")).unwrap().is_none());
        assert!(aggregator.aggregate(chunk(b"pedia")).unwrap().is_none());
        let message =
            aggregator.aggregate(IcapEvent::Chunk(IcapChunk::last(false))).unwrap().unwrap().into_message().unwrap();
        assert_eq!(message.http_response().unwrap().body(), b"Wikipedia");
    }

    #[test]
    fn body_size_one_byte_beyond_limit_fails() {
        let mut aggregator = IcapChunkAggregator::new(8);
        aggregator.aggregate(IcapEvent::Message(message_with_body(BodyKind::ResponseBody))).unwrap();
        assert!(aggregator.aggregate(chunk(b"Wiki")).unwrap().is_none());

        let err = aggregator.aggregate(chunk(b"pedia")).unwrap_err();
        assert!(err.is_frame_too_long());
        // the aborted message is gone for good
        assert!(!aggregator.is_aggregating());
    }

    #[test]
    fn trailer_headers_are_copied_onto_the_encapsulated_message() {
        let mut aggregator = IcapChunkAggregator::new(1024);
        aggregator.aggregate(IcapEvent::Message(message_with_body(BodyKind::ResponseBody))).unwrap();
        aggregator.aggregate(chunk(b"clean")).unwrap();

        let mut trailer_headers = HeaderMap::new();
        trailer_headers.append(HeaderName::from_static("x-status"), HeaderValue::from_static("clean"));
        let emitted = aggregator.aggregate(IcapEvent::Trailer(IcapChunkTrailer::new(trailer_headers))).unwrap();

        let message = emitted.unwrap().into_message().unwrap();
        let response = message.http_response().unwrap();
        assert_eq!(response.body(), b"clean");
        assert_eq!(response.headers().get("X-Status").unwrap(), "clean");
        assert!(!aggregator.is_aggregating());
    }

    #[test]
    fn idle_chunk_and_trailer_pass_through() {
        let mut aggregator = IcapChunkAggregator::new(1024);

        let passed = aggregator.aggregate(chunk(b"stray")).unwrap().unwrap();
        assert_eq!(passed.into_chunk().unwrap().content().as_ref(), b"stray");

        let trailer = IcapEvent::Trailer(IcapChunkTrailer::new(HeaderMap::new()));
        assert!(aggregator.aggregate(trailer).unwrap().unwrap().is_trailer());
    }

    #[test]
    fn body_marker_without_section_is_protocol_usage() {
        let start_line = StartLine::Request {
            method: Method::from_bytes(b"REQMOD").unwrap(),
            uri: "icap://icap.example.net/scan".parse().unwrap(),
        };
        // req-body announced, but no encapsulated request attached
        let message =
            IcapMessage::new(start_line, HeaderMap::new(), None, None, BodyKind::RequestBody, None);

        let mut aggregator = IcapChunkAggregator::new(1024);
        let err = aggregator.aggregate(IcapEvent::Message(message)).unwrap_err();
        assert!(err.is_protocol_usage());
    }

    #[test]
    fn options_body_aggregates_onto_the_icap_message() {
        let start_line = StartLine::Response { status: StatusCode::OK };
        let message = IcapMessage::new(start_line, HeaderMap::new(), None, None, BodyKind::OptionsBody, None);

        let mut aggregator = IcapChunkAggregator::new(1024);
        aggregator.aggregate(IcapEvent::Message(message)).unwrap();
        aggregator.aggregate(chunk(b"methods")).unwrap();
        let emitted = aggregator.aggregate(IcapEvent::Chunk(IcapChunk::last(false))).unwrap().unwrap();
        assert_eq!(emitted.into_message().unwrap().options_body(), b"methods");
    }

    mod aggregating_decoder {
        use super::*;

        #[test]
        fn yields_one_complete_message_per_cycle() {
            let wire = b"RESPMOD icap://icap.example.net/scan ICAP/1.0\r\n\
                Host: icap.example.net\r\n\
                Encapsulated: res-hdr=0, res-body=40\r\n\
                \r\n\
                HTTP/1.1 200 OK\r\n\
                \r\n\
                4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
            let mut decoder = AggregatingDecoder::new(64 * 1024);
            let mut buffer = BytesMut::from(&wire[..]);

            let message = decoder.decode(&mut buffer).unwrap().unwrap();
            assert_eq!(message.http_response().unwrap().body(), b"Wikipedia");
            assert!(buffer.is_empty());
            assert!(decoder.decode(&mut buffer).unwrap().is_none());
        }

        #[test]
        fn body_less_message_is_immediate() {
            let wire = b"OPTIONS icap://icap.example.net/scan ICAP/1.0\r\nHost: a\r\n\r\n";
            let mut decoder = AggregatingDecoder::new(64 * 1024);
            let mut buffer = BytesMut::from(&wire[..]);

            let message = decoder.decode(&mut buffer).unwrap().unwrap();
            assert_eq!(message.body_kind(), BodyKind::None);
        }

        #[test]
        fn trailer_flows_through_to_the_encapsulated_headers() {
            let wire = b"RESPMOD icap://icap.example.net/scan ICAP/1.0\r\n\
                Encapsulated: res-hdr=0, res-body=40\r\n\
                \r\n\
                HTTP/1.1 200 OK\r\n\
                \r\n\
                5\r\nclean\r\n0\r\nX-Status: clean\r\n\r\n";
            let mut decoder = AggregatingDecoder::new(64 * 1024);
            let mut buffer = BytesMut::from(&wire[..]);

            let message = decoder.decode(&mut buffer).unwrap().unwrap();
            assert_eq!(message.http_response().unwrap().headers().get("X-Status").unwrap(), "clean");
        }

        #[test]
        fn preview_body_is_retained_on_early_termination() {
            let wire = b"REQMOD icap://icap.example.net/filter ICAP/1.0\r\n\
                Preview: 4\r\n\
                Encapsulated: req-hdr=0, req-body=20\r\n\
                \r\n\
                GET / HTTP/1.1\r\n\
                \r\n\
                4\r\nWiki\r\n0; ieof\r\n\r\n";
            let mut decoder = AggregatingDecoder::new(64 * 1024);
            let mut buffer = BytesMut::from(&wire[..]);

            let message = decoder.decode(&mut buffer).unwrap().unwrap();
            assert!(message.is_preview());
            assert_eq!(message.http_request().unwrap().body(), b"Wiki");
        }

        #[test]
        fn oversized_body_aborts_the_cycle() {
            let wire = b"RESPMOD icap://icap.example.net/scan ICAP/1.0\r\n\
                Encapsulated: res-hdr=0, res-body=40\r\n\
                \r\n\
                HTTP/1.1 200 OK\r\n\
                \r\n\
                4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
            let mut decoder = AggregatingDecoder::new(4);
            let mut buffer = BytesMut::from(&wire[..]);

            let err = decoder.decode(&mut buffer).unwrap_err();
            assert!(err.is_frame_too_long());
        }
    }
}
