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

//! `XADD`/`XRANGE`/`XREAD`/`XINFO STREAM`.

use bytes::Bytes;

use super::store_err_to_resp;
use crate::engine::{self, Engine};
use crate::resp::RespValue;
use crate::store::{StreamEntry, StreamId, StreamIdSpec};

fn entry_to_resp(e: &StreamEntry) -> RespValue {
    let mut fields = Vec::with_capacity(e.fields.len() * 2);
    for (name, value) in &e.fields {
        fields.push(RespValue::bulk(name.clone()));
        fields.push(RespValue::bulk(value.clone()));
    }
    RespValue::array(vec![RespValue::bulk(e.id.to_string()), RespValue::array(fields)])
}

/// `XADD key id field value [field value ...]`.
pub fn xadd(engine: &Engine, argv: &[Bytes]) -> RespValue {
    let key = argv[1].clone();
    let Some(id) = std::str::from_utf8(&argv[2]).ok().and_then(StreamIdSpec::parse) else {
        return RespValue::error("ERR Invalid stream ID specified as stream command argument");
    };
    if (argv.len() - 3) % 2 != 0 {
        return RespValue::error("ERR wrong number of arguments for 'xadd' command");
    }
    let mut fields = Vec::new();
    let mut i = 3;
    while i < argv.len() {
        fields.push((argv[i].clone(), argv[i + 1].clone()));
        i += 2;
    }
    let result = engine.with_lock_notify_stream(&key.clone(), |inner| inner.store.xadd(key.clone(), id, fields));
    match result {
        Ok(assigned) => RespValue::bulk(assigned.to_string()),
        Err(e) => store_err_to_resp(e),
    }
}

/// `XRANGE key start end`. `-`/`+` denote the open-ended bounds.
pub fn xrange(engine: &Engine, argv: &[Bytes]) -> RespValue {
    let Some(start) = parse_range_bound(&argv[2], StreamId::MIN) else {
        return RespValue::error("ERR Invalid stream ID specified as stream command argument");
    };
    let Some(end) = parse_range_bound(&argv[3], StreamId::MAX) else {
        return RespValue::error("ERR Invalid stream ID specified as stream command argument");
    };
    match engine.with_lock(|inner| inner.store.xrange(&argv[1], start, end)) {
        Ok(entries) => RespValue::array(entries.iter().map(entry_to_resp).collect()),
        Err(e) => store_err_to_resp(e),
    }
}

fn parse_range_bound(raw: &[u8], open_ended: StreamId) -> Option<StreamId> {
    match raw {
        b"-" | b"+" => Some(open_ended),
        _ => std::str::from_utf8(raw).ok().and_then(StreamId::parse_strict),
    }
}

/// `XREAD [BLOCK ms] STREAMS key [key ...] id [id ...]`.
pub async fn xread(engine: &Engine, argv: &[Bytes]) -> RespValue {
    let mut i = 1;
    let mut block_ms: Option<u64> = None;
    if argv[i].eq_ignore_ascii_case(b"BLOCK") {
        let Some(ms) = super::parse_u64(&argv[i + 1]) else {
            return super::bad_integer();
        };
        block_ms = Some(ms);
        i += 2;
    }
    if i >= argv.len() || !argv[i].eq_ignore_ascii_case(b"STREAMS") {
        return RespValue::error("ERR syntax error");
    }
    i += 1;
    let remaining = &argv[i..];
    if remaining.is_empty() || remaining.len() % 2 != 0 {
        return RespValue::error("ERR Unbalanced XREAD list of streams: for each stream key an ID or '$' must be specified.");
    }
    let n = remaining.len() / 2;
    let keys = &remaining[..n];
    let ids = &remaining[n..];

    let mut origins = Vec::with_capacity(n);
    for (k, raw_id) in keys.iter().zip(ids.iter()) {
        let baseline = if raw_id.as_ref() == b"$" {
            match engine.with_lock(|inner| inner.store.stream_last_id(k)) {
                Ok(id) => id,
                Err(e) => return store_err_to_resp(e),
            }
        } else {
            let Some(id) = std::str::from_utf8(raw_id).ok().and_then(StreamId::parse_strict) else {
                return RespValue::error("ERR Invalid stream ID specified as stream command argument");
            };
            id
        };
        origins.push((k.clone(), baseline));
    }

    let immediate = engine.with_lock(|inner| -> Result<Vec<(Bytes, Vec<StreamEntry>)>, crate::store::StoreError> {
        let mut collected = Vec::new();
        for (k, baseline) in &origins {
            let entries = inner.store.xread_since(k, *baseline)?;
            if !entries.is_empty() {
                collected.push((k.clone(), entries));
            }
        }
        Ok(collected)
    });
    let collected = match immediate {
        Ok(c) => c,
        Err(e) => return store_err_to_resp(e),
    };

    let collected = if collected.is_empty() {
        match block_ms {
            None => Vec::new(),
            Some(ms) => match engine::blocking_xread(engine, origins, ms).await {
                Ok(c) => c,
                Err(e) => return store_err_to_resp(e),
            },
        }
    } else {
        collected
    };

    if collected.is_empty() {
        return RespValue::NullArray;
    }
    RespValue::array(
        collected
            .into_iter()
            .map(|(k, entries)| {
                RespValue::array(vec![
                    RespValue::bulk(k),
                    RespValue::array(entries.iter().map(entry_to_resp).collect()),
                ])
            })
            .collect(),
    )
}

pub fn xinfo(engine: &Engine, argv: &[Bytes]) -> RespValue {
    if !argv[1].eq_ignore_ascii_case(b"STREAM") {
        return RespValue::error("ERR syntax error");
    }
    match engine.with_lock(|inner| inner.store.xinfo(&argv[2])) {
        Ok(None) => RespValue::error("ERR no such key"),
        Ok(Some(info)) => RespValue::array(vec![
            RespValue::bulk("length"),
            RespValue::Integer(info.length as i64),
            RespValue::bulk("last-generated-id"),
            RespValue::bulk(info.last_id.to_string()),
            RespValue::bulk("first-entry"),
            info.first_entry.as_ref().map(entry_to_resp).unwrap_or(RespValue::NullArray),
            RespValue::bulk("last-entry"),
            info.last_entry.as_ref().map(entry_to_resp).unwrap_or(RespValue::NullArray),
        ]),
        Err(e) => store_err_to_resp(e),
    }
}
