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

//! # The typed in-memory store
//!
//! This is the `respd` analogue of Skytable's `corestore::memstore` -- a process-wide singleton
//! mapping keys to a single tagged [`Value`] variant, reached through an explicit `&Store`
//! rather than ambient global lookup, following the `Corestore`/`Memstore` convention: tests
//! construct their own `Store` rather than touching a global one.

#[cfg(test)]
mod tests;

use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::fmt;

use crate::clock::now_wall_ms;

/// A stream entry id: a pair `(ms, seq)`, totally ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const MIN: StreamId = StreamId { ms: 0, seq: 0 };
    pub const MAX: StreamId = StreamId { ms: u64::MAX, seq: u64::MAX };

    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    /// Parse a literal `ms-seq` id (no wildcards).
    pub fn parse_strict(s: &str) -> Option<Self> {
        let (ms, seq) = s.split_once('-')?;
        Some(Self {
            ms: ms.parse().ok()?,
            seq: seq.parse().ok()?,
        })
    }

    /// The smallest id strictly greater than `self` (used for `ms-*` auto-sequencing and `*`).
    pub fn next_seq(self) -> Self {
        Self { ms: self.ms, seq: self.seq.saturating_add(1) }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// One append-only log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Vec<(Bytes, Bytes)>,
}

/// A single key's value: exactly one of these variants, never more.
#[derive(Debug, Clone)]
pub enum Value {
    Str {
        bytes: Bytes,
        expires_at: Option<u64>,
    },
    List(VecDeque<Bytes>),
    Stream {
        entries: Vec<StreamEntry>,
        last_id: StreamId,
    },
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Str { .. } => "string",
            Self::List(_) => "list",
            Self::Stream { .. } => "stream",
        }
    }
}

/// Errors arising from a type-checked or otherwise invalid store operation.
///
/// Any of these must leave the store bit-identical to before the call (§8 "WRONGTYPE purity").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    WrongType,
    NotAnInteger,
    XaddIdTooSmall,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The typed key namespace. Not `Sync` by itself -- callers serialize access (see
/// `engine::Engine`, which wraps one `Store` in a single `parking_lot::Mutex`).
#[derive(Debug, Default)]
pub struct Store {
    map: HashMap<Bytes, Value>,
}

impl Store {
    pub fn new() -> Self {
        Self { map: HashMap::new() }
    }

    /// Remove `key` if it's a string whose TTL has passed. Called on every read path that
    /// touches a key; there's no scheduled sweeper, so expiry is purely lazy. Most keys read
    /// back have no TTL at all or haven't hit it yet, so the removal branch is the cold one.
    fn expire_if_needed(&mut self, key: &[u8], now_ms: u64) {
        let expired = matches!(
            self.map.get(key),
            Some(Value::Str { expires_at: Some(exp), .. }) if *exp <= now_ms
        );
        if crate::util::unlikely(expired) {
            self.map.remove(key);
        }
    }

    fn get_checked(&mut self, key: &[u8], now_ms: u64) -> Option<&Value> {
        self.expire_if_needed(key, now_ms);
        self.map.get(key)
    }

    pub fn type_of(&mut self, key: &[u8], now_ms: u64) -> &'static str {
        self.get_checked(key, now_ms).map(Value::type_name).unwrap_or("none")
    }

    pub fn exists(&mut self, key: &[u8], now_ms: u64) -> bool {
        self.get_checked(key, now_ms).is_some()
    }

    pub fn del(&mut self, keys: &[Bytes]) -> usize {
        let mut removed = 0;
        for k in keys {
            if self.map.remove(k.as_ref()).is_some() {
                removed += 1;
            }
        }
        removed
    }

    pub fn dbsize(&mut self, now_ms: u64) -> usize {
        let expired: Vec<Bytes> = self
            .map
            .iter()
            .filter(|(_, v)| matches!(v, Value::Str { expires_at: Some(exp), .. } if *exp <= now_ms))
            .map(|(k, _)| k.clone())
            .collect();
        for k in &expired {
            self.map.remove(k);
        }
        self.map.len()
    }

    pub fn keys(&mut self, now_ms: u64) -> Vec<Bytes> {
        self.dbsize(now_ms); // flush expired first
        self.map.keys().cloned().collect()
    }

    // ---- strings ----

    pub fn get(&mut self, key: &[u8], now_ms: u64) -> StoreResult<Option<Bytes>> {
        match self.get_checked(key, now_ms) {
            None => Ok(None),
            Some(Value::Str { bytes, .. }) => Ok(Some(bytes.clone())),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    pub fn set(&mut self, key: Bytes, value: Bytes, expires_at: Option<u64>) {
        self.map.insert(key, Value::Str { bytes: value, expires_at });
    }

    pub fn incr(&mut self, key: &Bytes, now_ms: u64) -> StoreResult<i64> {
        let current = match self.get_checked(key, now_ms) {
            None => 0i64,
            Some(Value::Str { bytes, .. }) => {
                std::str::from_utf8(bytes)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or(StoreError::NotAnInteger)?
            }
            Some(_) => return Err(StoreError::WrongType),
        };
        let next = current.checked_add(1).ok_or(StoreError::NotAnInteger)?;
        self.map.insert(
            key.clone(),
            Value::Str { bytes: Bytes::from(next.to_string()), expires_at: None },
        );
        Ok(next)
    }

    // ---- lists ----

    fn list_mut(&mut self, key: &[u8], now_ms: u64) -> StoreResult<Option<&mut VecDeque<Bytes>>> {
        match self.get_checked(key, now_ms) {
            None => Ok(None),
            Some(Value::List(_)) => match self.map.get_mut(key) {
                Some(Value::List(l)) => Ok(Some(l)),
                _ => unreachable!(),
            },
            Some(_) => Err(StoreError::WrongType),
        }
    }

    pub fn lpush(&mut self, key: Bytes, elems: &[Bytes], now_ms: u64) -> StoreResult<usize> {
        self.push(key, elems, now_ms, true)
    }

    pub fn rpush(&mut self, key: Bytes, elems: &[Bytes], now_ms: u64) -> StoreResult<usize> {
        self.push(key, elems, now_ms, false)
    }

    fn push(&mut self, key: Bytes, elems: &[Bytes], now_ms: u64, front: bool) -> StoreResult<usize> {
        if self.list_mut(&key, now_ms)?.is_none() {
            self.map.insert(key.clone(), Value::List(VecDeque::new()));
        }
        let list = match self.map.get_mut(key.as_ref()) {
            Some(Value::List(l)) => l,
            _ => return Err(StoreError::WrongType),
        };
        for e in elems {
            if front {
                list.push_front(e.clone());
            } else {
                list.push_back(e.clone());
            }
        }
        Ok(list.len())
    }

    /// Pop the head of `key`'s list, if it's a non-empty list. Deletes the key if emptied.
    pub fn lpop(&mut self, key: &[u8], now_ms: u64) -> StoreResult<Option<Bytes>> {
        let popped = match self.list_mut(key, now_ms)? {
            None => return Ok(None),
            Some(l) => l.pop_front(),
        };
        if matches!(self.map.get(key), Some(Value::List(l)) if l.is_empty()) {
            self.map.remove(key);
        }
        Ok(popped)
    }

    pub fn llen(&mut self, key: &[u8], now_ms: u64) -> StoreResult<usize> {
        Ok(self.list_mut(key, now_ms)?.map(|l| l.len()).unwrap_or(0))
    }

    pub fn lrange(&mut self, key: &[u8], start: i64, stop: i64, now_ms: u64) -> StoreResult<Vec<Bytes>> {
        let list = match self.list_mut(key, now_ms)? {
            None => return Ok(Vec::new()),
            Some(l) => l,
        };
        let len = list.len() as i64;
        if len == 0 {
            return Ok(Vec::new());
        }
        let norm = |i: i64| -> i64 { if i < 0 { (len + i).max(0) } else { i } };
        let start = norm(start).max(0);
        let stop = norm(stop).min(len - 1);
        if start > stop || start >= len {
            return Ok(Vec::new());
        }
        Ok(list.iter().skip(start as usize).take((stop - start + 1) as usize).cloned().collect())
    }

    /// Returns `true` if `key` currently names a non-empty list (used by `BLPOP`'s immediate
    /// check and by `notify` re-evaluation).
    pub fn list_has_elements(&mut self, key: &[u8], now_ms: u64) -> bool {
        matches!(self.list_mut(key, now_ms), Ok(Some(l)) if !l.is_empty())
    }

    // ---- streams ----

    pub fn xadd(
        &mut self,
        key: Bytes,
        id: StreamIdSpec,
        fields: Vec<(Bytes, Bytes)>,
    ) -> StoreResult<StreamId> {
        let last_id = match self.map.get(key.as_ref()) {
            None => StreamId::MIN,
            Some(Value::Stream { last_id, .. }) => *last_id,
            Some(_) => return Err(StoreError::WrongType),
        };
        let resolved = id.resolve(last_id);
        if resolved <= last_id {
            return Err(StoreError::XaddIdTooSmall);
        }
        match self.map.entry(key).or_insert_with(|| Value::Stream { entries: Vec::new(), last_id: StreamId::MIN }) {
            Value::Stream { entries, last_id: stored_last } => {
                entries.push(StreamEntry { id: resolved, fields });
                *stored_last = resolved;
                Ok(resolved)
            }
            _ => unreachable!("type-checked above"),
        }
    }

    pub fn xrange(&self, key: &[u8], start: StreamId, end: StreamId) -> StoreResult<Vec<StreamEntry>> {
        match self.map.get(key) {
            None => Ok(Vec::new()),
            Some(Value::Stream { entries, .. }) => Ok(entries
                .iter()
                .filter(|e| e.id >= start && e.id <= end)
                .cloned()
                .collect()),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    /// All entries with id strictly greater than `after`.
    pub fn xread_since(&self, key: &[u8], after: StreamId) -> StoreResult<Vec<StreamEntry>> {
        match self.map.get(key) {
            None => Ok(Vec::new()),
            Some(Value::Stream { entries, .. }) => {
                Ok(entries.iter().filter(|e| e.id > after).cloned().collect())
            }
            Some(_) => Err(StoreError::WrongType),
        }
    }

    pub fn stream_last_id(&self, key: &[u8]) -> StoreResult<StreamId> {
        match self.map.get(key) {
            None => Ok(StreamId::MIN),
            Some(Value::Stream { last_id, .. }) => Ok(*last_id),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    pub fn xinfo(&self, key: &[u8]) -> StoreResult<Option<StreamInfo>> {
        match self.map.get(key) {
            None => Ok(None),
            Some(Value::Stream { entries, last_id }) => Ok(Some(StreamInfo {
                length: entries.len(),
                last_id: *last_id,
                first_entry: entries.first().cloned(),
                last_entry: entries.last().cloned(),
            })),
            Some(_) => Err(StoreError::WrongType),
        }
    }
}

pub struct StreamInfo {
    pub length: usize,
    pub last_id: StreamId,
    pub first_entry: Option<StreamEntry>,
    pub last_entry: Option<StreamEntry>,
}

/// The three ways an `XADD` id argument can be spelled.
#[derive(Debug, Clone, Copy)]
pub enum StreamIdSpec {
    /// `ms-seq`, both explicit.
    Explicit(StreamId),
    /// `ms-*`: auto-sequence within that millisecond.
    AutoSeq(u64),
    /// `*`: auto-timestamp and auto-sequence.
    Auto,
}

impl StreamIdSpec {
    /// Parse an `XADD` id argument against the stream's current `last_id`.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw == "*" {
            return Some(Self::Auto);
        }
        if let Some(ms_part) = raw.strip_suffix("-*") {
            return ms_part.parse().ok().map(Self::AutoSeq);
        }
        StreamId::parse_strict(raw).map(Self::Explicit)
    }

    fn resolve(self, last_id: StreamId) -> StreamId {
        match self {
            Self::Explicit(id) => id,
            Self::AutoSeq(ms) => {
                if ms == last_id.ms {
                    StreamId::new(ms, last_id.seq + 1)
                } else {
                    StreamId::new(ms, 0)
                }
            }
            Self::Auto => {
                let ms = now_wall_ms();
                if ms > last_id.ms {
                    StreamId::new(ms, 0)
                } else {
                    last_id.next_seq()
                }
            }
        }
    }
}
