//! Core ICAP protocol abstractions.
//!
//! This module carries the data model shared by the decoder and the
//! aggregator:
//!
//! - **Messages** ([`message`]): [`IcapMessage`] with its [`StartLine`],
//!   encapsulated [`EmbeddedMessage`] heads and the [`BodyKind`] body marker;
//!   [`IcapEvent`] as the decoded-object stream flowing between the decoder
//!   and the aggregator.
//! - **Chunks** ([`chunk`]): [`IcapChunk`] body segments and the
//!   [`IcapChunkTrailer`] trailer-header carrier.
//! - **Encapsulated header** ([`encapsulated`]): grammar of the section list
//!   that names the embedded HTTP parts and the body owner.
//! - **Errors** ([`error`]): the [`DecodeError`] taxonomy. Frame and syntax
//!   errors are fatal to the connection's decode cycle.

mod message;
pub use message::BodyKind;
pub use message::EmbeddedMessage;
pub use message::EmbeddedStartLine;
pub use message::ICAP_VERSION;
pub use message::IcapEvent;
pub use message::IcapMessage;
pub use message::StartLine;

mod chunk;
pub use chunk::IcapChunk;
pub use chunk::IcapChunkTrailer;

mod error;
pub use error::DecodeError;

pub(crate) mod encapsulated;
