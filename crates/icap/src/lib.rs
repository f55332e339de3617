//! A streaming ICAP (RFC 3507) message codec.
//!
//! ICAP lets an HTTP proxy hand off request/response content to a remote
//! adaptation service by encapsulating the HTTP message — possibly chunked,
//! possibly truncated to a preview — inside an ICAP message. This crate
//! implements the receiving half of that exchange: a streaming decoder that
//! turns arbitrarily fragmented wire bytes into validated ICAP messages, and
//! a chunk aggregator that reassembles the encapsulated body into one
//! contiguous buffer on the HTTP sub-message that owns it.
//!
//! # Features
//!
//! - Incremental decoding via [`tokio_util::codec::Decoder`]: partial input
//!   suspends without consuming bytes and resumes losslessly
//! - Full `Encapsulated` header handling: embedded HTTP request/response
//!   heads, `req-body`/`res-body`/`opt-body`/`null-body` markers
//! - HTTP chunked-transfer grammar with the ICAP `0; ieof` preview
//!   early-termination marker and trailer headers
//! - Strict header validation (name/value character sets, fold grammar)
//! - Configurable size limits for lines, header blocks and aggregate bodies
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use micro_icap::codec::AggregatingDecoder;
//! use tokio_util::codec::Decoder;
//!
//! let wire: &[u8] = b"REQMOD icap://icap.example.org/satisf ICAP/1.0\r\n\
//!     Host: icap.example.org\r\n\
//!     Encapsulated: req-hdr=0, req-body=61\r\n\
//!     \r\n\
//!     GET /origin-resource HTTP/1.1\r\n\
//!     Host: www.origin-server.com\r\n\
//!     \r\n\
//!     4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
//!
//! let mut decoder = AggregatingDecoder::new(64 * 1024);
//! let mut buffer = BytesMut::from(wire);
//!
//! let message = decoder.decode(&mut buffer).unwrap().expect("complete message");
//! let request = message.http_request().expect("encapsulated request");
//! assert_eq!(request.body(), b"Wikipedia");
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: the data model — [`protocol::IcapMessage`] with its
//!   encapsulated HTTP heads and body marker, chunk/trailer objects, the
//!   [`protocol::DecodeError`] taxonomy
//! - [`codec`]: the framing layer — [`codec::IcapMessageDecoder`] (state
//!   machine over the ICAP/chunked grammar), [`codec::IcapChunkAggregator`]
//!   and the composed [`codec::AggregatingDecoder`]
//!
//! The transport loop is out of scope: anything that appends received bytes
//! to a `BytesMut` and calls `decode` works, with or without an async
//! runtime. A [`protocol::DecodeError`] is fatal to the connection's decode
//! cycle — the framing cannot be trusted afterwards, so the caller is
//! expected to close the channel. The encoder direction (serializing ICAP
//! messages) is likewise out of scope.
//!
//! # Limitations
//!
//! - ICAP/1.0 only, the single version the protocol ever had
//! - Preview negotiation policy (100 Continue handshakes) is left to the
//!   consumer; the decoder surfaces the `Preview` length and the `ieof`
//!   early-termination flag

pub mod codec;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
