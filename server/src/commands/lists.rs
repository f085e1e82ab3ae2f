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

//! `LPUSH`/`RPUSH`/`LPOP`/`LRANGE`/`LLEN`/`BLPOP`.

use bytes::Bytes;

use super::{bad_integer, store_err_to_resp};
use crate::clock::now_monotonic_ms;
use crate::engine::{self, Engine};
use crate::resp::RespValue;

pub fn push(engine: &Engine, argv: &[Bytes], front: bool) -> RespValue {
    let key = argv[1].clone();
    let elems: Vec<Bytes> = argv[2..].to_vec();
    let now = now_monotonic_ms();
    let result = engine.with_lock_notify_list(&key.clone(), |inner| {
        if front {
            inner.store.lpush(key.clone(), &elems, now)
        } else {
            inner.store.rpush(key.clone(), &elems, now)
        }
    });
    match result {
        Ok(n) => RespValue::Integer(n as i64),
        Err(e) => store_err_to_resp(e),
    }
}

pub fn lpop(engine: &Engine, argv: &[Bytes]) -> RespValue {
    let now = now_monotonic_ms();
    match engine.with_lock(|inner| inner.store.lpop(&argv[1], now)) {
        Ok(Some(v)) => RespValue::bulk(v),
        Ok(None) => RespValue::NullBulk,
        Err(e) => store_err_to_resp(e),
    }
}

pub fn lrange(engine: &Engine, argv: &[Bytes]) -> RespValue {
    let (Some(start), Some(stop)) = (super::parse_i64(&argv[2]), super::parse_i64(&argv[3])) else {
        return bad_integer();
    };
    let now = now_monotonic_ms();
    match engine.with_lock(|inner| inner.store.lrange(&argv[1], start, stop, now)) {
        Ok(items) => RespValue::array(items.into_iter().map(RespValue::bulk).collect()),
        Err(e) => store_err_to_resp(e),
    }
}

pub fn llen(engine: &Engine, argv: &[Bytes]) -> RespValue {
    let now = now_monotonic_ms();
    match engine.with_lock(|inner| inner.store.llen(&argv[1], now)) {
        Ok(n) => RespValue::Integer(n as i64),
        Err(e) => store_err_to_resp(e),
    }
}

/// `BLPOP k1 .. kn timeout`. The last argument is the timeout in (whole) seconds, matching
/// mainline Redis; `0` means block forever.
pub async fn blpop(engine: &Engine, argv: &[Bytes]) -> RespValue {
    let Some(timeout_secs) = super::parse_i64(&argv[argv.len() - 1]) else {
        return bad_integer();
    };
    if timeout_secs < 0 {
        return RespValue::error("ERR timeout is negative");
    }
    let keys: Vec<Bytes> = argv[1..argv.len() - 1].to_vec();
    let timeout_ms = (timeout_secs as u64).saturating_mul(1000);
    match engine::blocking_lpop(engine, keys, timeout_ms).await {
        Ok(Some((key, value))) => RespValue::array(vec![RespValue::bulk(key), RespValue::bulk(value)]),
        Ok(None) => RespValue::NullArray,
        Err(e) => store_err_to_resp(e),
    }
}
