//! Pure decoding primitives shared by the framing states.
//!
//! Everything here operates on a borrowed byte slice through [`ByteCursor`]
//! without consuming the receive buffer; a state commits consumed bytes only
//! after its whole step has succeeded. Line and header-block reads are
//! bounded by a [`SizeBudget`] so a peer cannot grow a single frame without
//! limit.

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::protocol::DecodeError;

pub(crate) const CR: u8 = b'\r';
pub(crate) const LF: u8 = b'\n';

/// The preview early-termination marker, matched case-insensitively against
/// the whole chunk-size line.
pub(crate) const IEOF_SEQUENCE: &[u8] = b"0; ieof";

/// Remaining-byte allowance for one line or one header-block read.
///
/// Exhausting the budget before the terminator is found is a fatal
/// [`DecodeError::FrameTooLong`]. A budget never outlives a single read
/// attempt; a retry after more data arrives starts over with a fresh one.
#[derive(Debug)]
pub(crate) struct SizeBudget {
    remaining: usize,
    limit: usize,
}

impl SizeBudget {
    pub(crate) fn new(limit: usize) -> Self {
        Self { remaining: limit, limit }
    }

    /// Accounts for `n` scanned bytes, failing once the limit is crossed.
    pub(crate) fn consume(&mut self, n: usize, what: &'static str) -> Result<(), DecodeError> {
        if n > self.remaining {
            return Err(DecodeError::frame_too_long(what, self.limit));
        }
        self.remaining -= n;
        Ok(())
    }
}

/// Read position over the receive buffer.
///
/// States parse through the cursor and advance the underlying buffer by
/// [`ByteCursor::pos`] bytes only once the whole step has completed, so an
/// interrupted step leaves the buffer exactly where it started.
#[derive(Debug)]
pub(crate) struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far, i.e. the commit point for the caller.
    pub(crate) fn pos(&self) -> usize {
        self.pos
    }
}

/// Reads one line terminated by CRLF (bare LF tolerated), exclusive of the
/// terminator.
///
/// Returns `None` when the terminator is not yet buffered. The budget is
/// charged for every content byte scanned either way, so an unterminated
/// oversize line fails before its end ever arrives.
pub(crate) fn read_line<'a>(
    cursor: &mut ByteCursor<'a>,
    budget: &mut SizeBudget,
    what: &'static str,
) -> Result<Option<&'a [u8]>, DecodeError> {
    let start = cursor.pos;
    let buf = cursor.buf;
    match buf[start..].iter().position(|&b| b == LF) {
        Some(rel) => {
            let line = &buf[start..start + rel];
            let line = line.strip_suffix(&[CR]).unwrap_or(line);
            budget.consume(line.len(), what)?;
            cursor.pos = start + rel + 1;
            Ok(Some(line))
        }
        None => {
            // a trailing CR may still become part of the terminator
            let mut scanned = buf.len() - start;
            if buf.last() == Some(&CR) {
                scanned -= 1;
            }
            budget.consume(scanned, what)?;
            Ok(None)
        }
    }
}

/// Splits a header line at the first colon into `(name, value)`, trimmed.
/// A header line without a colon is a grammar violation.
pub(crate) fn split_header(line: &[u8]) -> Result<(&[u8], &[u8]), DecodeError> {
    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| DecodeError::malformed("header line without colon"))?;
    Ok((line[..colon].trim_ascii(), line[colon + 1..].trim_ascii()))
}

/// Checks a header name: printable ASCII only, none of `, : ; =`.
///
/// The control-character range also covers the prohibited
/// `\t \n \v \f \r SP` set.
pub(crate) fn validate_header_name(name: &[u8]) -> Result<(), DecodeError> {
    if name.is_empty() {
        return Err(DecodeError::malformed("empty header name"));
    }
    for &b in name {
        if !(0x21..=0x7e).contains(&b) {
            return Err(DecodeError::malformed(format!(
                "header name contains non-ascii or control byte 0x{b:02x}"
            )));
        }
        if matches!(b, b',' | b':' | b';' | b'=') {
            return Err(DecodeError::malformed(format!(
                "header name contains prohibited character {:?}",
                b as char
            )));
        }
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum FoldState {
    Text,
    SeenCr,
    SeenLf,
}

/// Checks a header value: no VT/FF, and embedded line breaks only as part of
/// the CR-LF-(SP|HT) fold grammar. A value may not end on a bare CR or LF.
pub(crate) fn validate_header_value(value: &[u8]) -> Result<(), DecodeError> {
    let mut state = FoldState::Text;
    for &b in value {
        match b {
            0x0b => return Err(DecodeError::malformed("header value contains vertical tab")),
            0x0c => return Err(DecodeError::malformed("header value contains form feed")),
            _ => {}
        }
        state = match state {
            FoldState::Text => match b {
                CR => FoldState::SeenCr,
                LF => FoldState::SeenLf,
                _ => FoldState::Text,
            },
            FoldState::SeenCr => match b {
                LF => FoldState::SeenLf,
                _ => return Err(DecodeError::malformed("only LF may follow CR in a header value")),
            },
            FoldState::SeenLf => match b {
                b'\t' | b' ' => FoldState::Text,
                _ => return Err(DecodeError::malformed("a fold must continue with SP or HT")),
            },
        };
    }
    if !matches!(state, FoldState::Text) {
        return Err(DecodeError::malformed("header value must not end with CR or LF"));
    }
    Ok(())
}

/// Parses a chunk-size line: `;`-delimited extensions are stripped and the
/// remaining hex digits give the chunk length. The literal `0; ieof` preview
/// marker yields size zero with the early-termination flag set.
pub(crate) fn parse_chunk_size_line(line: &[u8]) -> Result<(usize, bool), DecodeError> {
    let line = line.trim_ascii();
    if line.eq_ignore_ascii_case(IEOF_SEQUENCE) {
        return Ok((0, true));
    }
    let digits = match line.iter().position(|&b| b == b';') {
        Some(semicolon) => line[..semicolon].trim_ascii(),
        None => line,
    };
    if digits.is_empty() {
        return Err(DecodeError::malformed("empty chunk size line"));
    }
    let mut size: usize = 0;
    for &b in digits {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => {
                return Err(DecodeError::malformed(format!(
                    "invalid character {:?} in chunk size line",
                    b as char
                )));
            }
        };
        size = size
            .checked_mul(16)
            .and_then(|s| s.checked_add(usize::from(digit)))
            .ok_or_else(|| DecodeError::malformed("chunk size overflows"))?;
    }
    Ok((size, false))
}

/// Reads a folded header block up to and including its terminating blank
/// line. A continuation line starting with SP/HT is appended, trimmed, to
/// the previous header's last value. Returns `None` when the block is not
/// yet fully buffered.
pub(crate) fn read_header_block(
    cursor: &mut ByteCursor<'_>,
    budget: &mut SizeBudget,
    what: &'static str,
) -> Result<Option<Vec<(Vec<u8>, Vec<u8>)>>, DecodeError> {
    let mut headers: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
    loop {
        let Some(line) = read_line(cursor, budget, what)? else {
            return Ok(None);
        };
        if line.is_empty() {
            return Ok(Some(headers));
        }
        match headers.last_mut() {
            Some((_, last_value)) if line[0] == b' ' || line[0] == b'\t' => {
                last_value.extend_from_slice(line.trim_ascii());
            }
            _ => {
                let (name, value) = split_header(line)?;
                validate_header_name(name)?;
                validate_header_value(value)?;
                headers.push((name.to_vec(), value.to_vec()));
            }
        }
    }
}

/// Converts raw folded header pairs into a [`HeaderMap`], preserving
/// insertion order and multi-values.
pub(crate) fn build_header_map(raw: Vec<(Vec<u8>, Vec<u8>)>) -> Result<HeaderMap, DecodeError> {
    let mut headers = HeaderMap::with_capacity(raw.len());
    for (name, value) in raw {
        let name = HeaderName::from_bytes(&name).map_err(|_| {
            DecodeError::malformed(format!("invalid header name {:?}", String::from_utf8_lossy(&name)))
        })?;
        let value = HeaderValue::from_bytes(&value).map_err(|_| DecodeError::malformed("invalid header value"))?;
        headers.append(name, value);
    }
    Ok(headers)
}
