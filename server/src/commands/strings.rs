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

//! `GET`/`SET`/`INCR`, the string-value operations. Grounded in `actions/get.rs` and the sibling
//! `actions/set.rs`/`actions/strong.rs` pair (arity-checked-then-type-checked executor shape).

use bytes::Bytes;

use super::{bad_integer, store_err_to_resp};
use crate::clock::now_monotonic_ms;
use crate::engine::Engine;
use crate::resp::RespValue;

pub fn get(engine: &Engine, argv: &[Bytes]) -> RespValue {
    let now = now_monotonic_ms();
    match engine.with_lock(|inner| inner.store.get(&argv[1], now)) {
        Ok(Some(v)) => RespValue::bulk(v),
        Ok(None) => RespValue::NullBulk,
        Err(e) => store_err_to_resp(e),
    }
}

pub fn set(engine: &Engine, argv: &[Bytes]) -> RespValue {
    let key = argv[1].clone();
    let value = argv[2].clone();
    let expires_at = if argv.len() == 3 {
        None
    } else if argv.len() == 5 {
        let opt = argv[3].to_ascii_uppercase();
        let Some(n) = super::parse_u64(&argv[4]) else {
            return bad_integer();
        };
        let now = now_monotonic_ms();
        match opt.as_slice() {
            b"EX" => Some(now + n.saturating_mul(1000)),
            b"PX" => Some(now + n),
            _ => return RespValue::error("ERR syntax error"),
        }
    } else {
        return RespValue::error("ERR syntax error");
    };
    engine.with_lock(|inner| inner.store.set(key, value, expires_at));
    RespValue::ok()
}

pub fn incr(engine: &Engine, argv: &[Bytes]) -> RespValue {
    let now = now_monotonic_ms();
    match engine.with_lock(|inner| inner.store.incr(&argv[1], now)) {
        Ok(n) => RespValue::Integer(n),
        Err(e) => store_err_to_resp(e),
    }
}
