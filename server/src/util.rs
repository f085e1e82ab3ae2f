/*
 * This file is a part of respd
 *
 * respd is a free and open-source in-memory key/value server speaking the
 * Redis serialization protocol (RESP).
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

//! Dark compiler arts, the top-level error type, and other small shared bits

use std::{fmt, io};

#[cold]
#[inline(never)]
pub const fn cold() {}

/// Branch hint: `b` is expected to be true
pub const fn likely(b: bool) -> bool {
    if !b {
        cold()
    }
    b
}

/// Branch hint: `b` is expected to be false
pub const fn unlikely(b: bool) -> bool {
    if b {
        cold()
    }
    b
}

pub type IoResult<T> = io::Result<T>;
pub type SkyResult<T> = Result<T, Error>;

/// The top-level error type for everything that isn't a per-command RESP error.
///
/// Per-command errors (WRONGTYPE, arity, ...) never reach this type -- they're encoded
/// directly as a RESP error reply and the connection stays open. This type exists for the
/// failures that end a connection or abort startup.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
