/*
 * This file is a part of respd
 *
 * Copyright (c) 2024, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # The RESP codec
//!
//! This module is the Redis Serialization Protocol equivalent of Skytable's `protocol` module: an
//! incremental parser that consumes a contiguous read buffer and yields a complete value plus the
//! number of bytes it consumed, or tells the caller it needs more data, and a type-driven encoder
//! that turns [`RespValue`] (and a few convenience Rust types) into wire bytes.

#[cfg(test)]
mod tests;

use bytes::{Bytes, BytesMut};
use std::fmt;

/// The largest bulk string we're willing to believe before assuming the stream is garbage or
/// hostile, capped at 512 MiB.
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// The largest array element count we're willing to believe. This is a count, not a byte size --
/// bounding it by `MAX_BULK_LEN` would let a single header (`*536870911\r\n`, no payload) force a
/// multi-gigabyte upfront allocation before a single element byte has even arrived. Matches
/// mainline Redis's multibulk length cap.
pub const MAX_ARRAY_LEN: i64 = 1024 * 1024;

/// A single RESP value, covering the full type set in both directions: values parsed off the wire
/// and values about to be written back use the same representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// `+<text>\r\n`
    Simple(Bytes),
    /// `-<text>\r\n`
    Error(Bytes),
    /// `:<int>\r\n`
    Integer(i64),
    /// `$<len>\r\n<bytes>\r\n`
    Bulk(Bytes),
    /// `$-1\r\n`
    NullBulk,
    /// `*<count>\r\n...`
    Array(Vec<RespValue>),
    /// `*-1\r\n`
    NullArray,
}

impl RespValue {
    pub fn ok() -> Self {
        Self::Simple(Bytes::from_static(b"OK"))
    }

    pub fn simple(s: impl Into<Bytes>) -> Self {
        Self::Simple(s.into())
    }

    pub fn error(s: impl Into<Bytes>) -> Self {
        Self::Error(s.into())
    }

    pub fn bulk(b: impl Into<Bytes>) -> Self {
        Self::Bulk(b.into())
    }

    pub fn array(items: Vec<RespValue>) -> Self {
        Self::Array(items)
    }

    /// Returns the bulk-string payload, if this value is a non-null bulk string.
    pub fn as_bulk(&self) -> Option<&Bytes> {
        match self {
            Self::Bulk(b) => Some(b),
            _ => None,
        }
    }

    /// Encode this value as RESP bytes, appending to `out`.
    ///
    /// Encoding is purely type-driven (per the struct's own variant): there's no branching on
    /// _content_, only on _shape_. Callers producing simple-string/error text must never pass
    /// embedded CR/LF -- route such content through `Bulk` instead.
    pub fn encode(&self, out: &mut BytesMut) {
        match self {
            Self::Simple(s) => {
                debug_assert!(!s.contains(&b'\r') && !s.contains(&b'\n'));
                out.extend_from_slice(b"+");
                out.extend_from_slice(s);
                out.extend_from_slice(b"\r\n");
            }
            Self::Error(s) => {
                debug_assert!(!s.contains(&b'\r') && !s.contains(&b'\n'));
                out.extend_from_slice(b"-");
                out.extend_from_slice(s);
                out.extend_from_slice(b"\r\n");
            }
            Self::Integer(i) => {
                out.extend_from_slice(b":");
                out.extend_from_slice(i.to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Self::Bulk(b) => {
                out.extend_from_slice(b"$");
                out.extend_from_slice(b.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(b);
                out.extend_from_slice(b"\r\n");
            }
            Self::NullBulk => out.extend_from_slice(b"$-1\r\n"),
            Self::Array(items) => {
                out.extend_from_slice(b"*");
                out.extend_from_slice(items.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for item in items {
                    item.encode(out);
                }
            }
            Self::NullArray => out.extend_from_slice(b"*-1\r\n"),
        }
    }

    /// Encode to a freshly allocated buffer. Mostly useful for tests and for replication, which
    /// needs the exact byte length of a propagated frame.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(s) => write!(f, "+{}", String::from_utf8_lossy(s)),
            Self::Error(s) => write!(f, "-{}", String::from_utf8_lossy(s)),
            Self::Integer(i) => write!(f, ":{i}"),
            Self::Bulk(b) => write!(f, "${}", String::from_utf8_lossy(b)),
            Self::NullBulk => write!(f, "$-1"),
            Self::Array(items) => write!(f, "*{items:?}"),
            Self::NullArray => write!(f, "*-1"),
        }
    }
}

/// Helper to build a command-array frame (`*N\r\n$len\r\n<bytes>\r\n...`) out of raw argument
/// bytes. Used for both reading a client frame into argv and for re-encoding a command for
/// propagation to replicas.
pub fn command_frame<I, B>(args: I) -> RespValue
where
    I: IntoIterator<Item = B>,
    B: Into<Bytes>,
{
    RespValue::Array(args.into_iter().map(|b| RespValue::Bulk(b.into())).collect())
}

/// Why a parse attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The buffer is empty; there's nothing at all to parse yet.
    Empty,
    /// A frame is in progress but the buffer doesn't yet contain all of it.
    NotEnough,
    /// The buffer contains bytes that cannot possibly be a valid RESP frame. The connection
    /// must be closed.
    Invalid,
}

pub type ParseResult<T> = Result<T, ParseError>;

/// An incremental RESP parser.
///
/// [`Parser::parse`] is the only entry point: it borrows a byte slice, and either returns the
/// parsed value plus how many bytes it consumed, or a [`ParseError`] explaining why it couldn't.
/// `NotEnough` is not a terminal condition -- the caller should read more bytes and retry the
/// same (now longer) buffer from the start.
pub struct Parser<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Parse one complete value from the front of the buffer.
    pub fn parse(buf: &'a [u8]) -> ParseResult<(RespValue, usize)> {
        if buf.is_empty() {
            return Err(ParseError::Empty);
        }
        let mut parser = Self::new(buf);
        let value = parser.parse_value()?;
        Ok((value, parser.pos))
    }

    fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Find the next `\r\n`, returning the index of the `\r` relative to the whole buffer.
    fn find_crlf(&self) -> ParseResult<usize> {
        let rest = self.remaining();
        let mut i = 0;
        while i + 1 < rest.len() {
            if rest[i] == b'\r' && rest[i + 1] == b'\n' {
                return Ok(self.pos + i);
            }
            i += 1;
        }
        Err(ParseError::NotEnough)
    }

    /// Read a CRLF-terminated line (without the CRLF), advancing the cursor past it.
    fn read_line(&mut self) -> ParseResult<&'a [u8]> {
        let crlf_at = self.find_crlf()?;
        let line = &self.buf[self.pos..crlf_at];
        self.pos = crlf_at + 2;
        Ok(line)
    }

    fn read_line_as_i64(&mut self) -> ParseResult<i64> {
        let line = self.read_line()?;
        std::str::from_utf8(line)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or(ParseError::Invalid)
    }

    fn take(&mut self, n: usize) -> ParseResult<&'a [u8]> {
        if self.remaining().len() < n {
            return Err(ParseError::NotEnough);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn expect_crlf(&mut self) -> ParseResult<()> {
        let line = self.take(2)?;
        if line == b"\r\n" {
            Ok(())
        } else {
            Err(ParseError::Invalid)
        }
    }

    fn parse_value(&mut self) -> ParseResult<RespValue> {
        if self.remaining().is_empty() {
            return Err(ParseError::NotEnough);
        }
        let tsymbol = self.buf[self.pos];
        self.pos += 1;
        match tsymbol {
            b'+' => Ok(RespValue::Simple(Bytes::copy_from_slice(self.read_line()?))),
            b'-' => Ok(RespValue::Error(Bytes::copy_from_slice(self.read_line()?))),
            b':' => Ok(RespValue::Integer(self.read_line_as_i64()?)),
            b'$' => self.parse_bulk(),
            b'*' => self.parse_array(),
            _ => Err(ParseError::Invalid),
        }
    }

    fn parse_bulk(&mut self) -> ParseResult<RespValue> {
        let len = self.read_line_as_i64()?;
        if len == -1 {
            return Ok(RespValue::NullBulk);
        }
        if len < 0 || len > MAX_BULK_LEN {
            return Err(ParseError::Invalid);
        }
        let len = len as usize;
        let bytes = Bytes::copy_from_slice(self.take(len)?);
        self.expect_crlf()?;
        Ok(RespValue::Bulk(bytes))
    }

    fn parse_array(&mut self) -> ParseResult<RespValue> {
        let count = self.read_line_as_i64()?;
        if count == -1 {
            return Ok(RespValue::NullArray);
        }
        if count < 0 || count > MAX_ARRAY_LEN {
            return Err(ParseError::Invalid);
        }
        // `count` is still attacker-controlled at this point (just bounded); don't reserve
        // against it up front, only grow as elements actually parse out of the buffer.
        let mut items = Vec::new();
        for _ in 0..count {
            items.push(self.parse_value()?);
        }
        Ok(RespValue::Array(items))
    }
}

/// Flatten a parsed client frame (expected to be an array of bulk strings) into argv.
///
/// Returns `None` if the frame isn't shaped like a command (not an array, or contains a
/// non-bulk element) -- the caller treats that as a protocol error.
pub fn frame_into_argv(value: RespValue) -> Option<Vec<Bytes>> {
    match value {
        RespValue::Array(items) => items
            .into_iter()
            .map(|item| match item {
                RespValue::Bulk(b) => Some(b),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}
