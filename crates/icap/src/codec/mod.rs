//! ICAP codec: streaming decode and chunk aggregation.
//!
//! This module contains the framing layer that turns a fragmented byte
//! stream into decoded ICAP objects, and the aggregation layer that collapses
//! those objects into complete messages:
//!
//! - [`IcapMessageDecoder`]: the state-machine driver. Emits an
//!   [`IcapEvent`](crate::protocol::IcapEvent) stream — message head, body
//!   chunks, trailer — one object per completed framing step.
//! - [`IcapChunkAggregator`]: consumes that event stream and reassembles the
//!   chunked body onto the encapsulated HTTP message that owns it, enforcing
//!   the aggregate size limit.
//! - [`AggregatingDecoder`]: both of the above behind one
//!   [`Decoder`](tokio_util::codec::Decoder), yielding fully materialized
//!   messages.
//!
//! Decoding is driven purely by data arrival: every decode call either makes
//! progress with the bytes at hand or leaves the buffer untouched and waits
//! for more. A grammar or size-limit violation is fatal to the current
//! decode cycle; the transport is expected to close the connection.

mod aggregator;
mod decoder_util;
mod message_decoder;

pub use aggregator::AggregatingDecoder;
pub use aggregator::IcapChunkAggregator;
pub use message_decoder::DecoderLimits;
pub use message_decoder::IcapMessageDecoder;
