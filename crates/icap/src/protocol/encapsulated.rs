//! Grammar of the ICAP `Encapsulated` header (RFC 3507 section 4.4.1).
//!
//! The header lists the sections embedded in the message together with their
//! byte offsets, e.g. `req-hdr=0, res-hdr=45, res-body=100`. The decoder
//! reads the sections sequentially off the wire, so only the section order
//! and the body marker matter here; offsets are validated but not used for
//! slicing.

use crate::protocol::DecodeError;

/// One section tag of the `Encapsulated` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SectionTag {
    ReqHdr,
    ResHdr,
    ReqBody,
    ResBody,
    OptBody,
    NullBody,
}

impl SectionTag {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "req-hdr" => Some(Self::ReqHdr),
            "res-hdr" => Some(Self::ResHdr),
            "req-body" => Some(Self::ReqBody),
            "res-body" => Some(Self::ResBody),
            "opt-body" => Some(Self::OptBody),
            "null-body" => Some(Self::NullBody),
            _ => None,
        }
    }

    /// True for the tags that terminate the section list and mark the body
    /// owner (`null-body` included).
    pub(crate) fn is_body(self) -> bool {
        matches!(self, Self::ReqBody | Self::ResBody | Self::OptBody | Self::NullBody)
    }
}

/// Parses an `Encapsulated` header value into its ordered entry list.
///
/// Enforced shape: every entry is `tag=offset`, tags are unique, offsets are
/// non-decreasing, and at most one body tag is present, as the final entry.
pub(crate) fn parse_encapsulated(value: &str) -> Result<Vec<(SectionTag, usize)>, DecodeError> {
    let mut entries: Vec<(SectionTag, usize)> = Vec::new();
    for part in value.split(',') {
        let part = part.trim();
        let (token, offset) = part
            .split_once('=')
            .ok_or_else(|| DecodeError::malformed(format!("encapsulated entry {part:?} has no offset")))?;
        let tag = SectionTag::from_token(token.trim())
            .ok_or_else(|| DecodeError::malformed(format!("unknown encapsulated entry {token:?}")))?;
        let offset = offset
            .trim()
            .parse::<usize>()
            .map_err(|_| DecodeError::malformed(format!("invalid encapsulated offset {offset:?}")))?;

        if entries.iter().any(|(seen, _)| *seen == tag) {
            return Err(DecodeError::malformed(format!("duplicate encapsulated entry {token:?}")));
        }
        if let Some((previous, last_offset)) = entries.last() {
            if previous.is_body() {
                return Err(DecodeError::malformed("encapsulated body entry must be the final entry"));
            }
            if offset < *last_offset {
                return Err(DecodeError::malformed("encapsulated offsets must not decrease"));
            }
        }
        entries.push((tag, offset));
    }
    if entries.is_empty() {
        return Err(DecodeError::malformed("empty encapsulated header"));
    }
    Ok(entries)
}
