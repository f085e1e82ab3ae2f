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

//! Commands with no opinion on value type: `PING`, `ECHO`, `TYPE`, `DEL`, `EXISTS`, `KEYS`,
//! `DBSIZE`. Grounded in Skytable's `actions/heya.rs` (PING-equivalent), `actions/del.rs`,
//! `actions/exists.rs`, `actions/dbsize.rs` and `actions/lskeys.rs`.

use bytes::Bytes;

use crate::clock::now_monotonic_ms;
use crate::engine::Engine;
use crate::resp::RespValue;

pub fn ping(argv: &[Bytes]) -> RespValue {
    match argv.len() {
        1 => RespValue::simple("PONG"),
        _ => RespValue::bulk(argv[1].clone()),
    }
}

pub fn echo(argv: &[Bytes]) -> RespValue {
    RespValue::bulk(argv[1].clone())
}

pub fn type_of(engine: &Engine, argv: &[Bytes]) -> RespValue {
    let now = now_monotonic_ms();
    let t = engine.with_lock(|inner| inner.store.type_of(&argv[1], now));
    RespValue::simple(t)
}

pub fn del(engine: &Engine, argv: &[Bytes]) -> RespValue {
    let keys: Vec<Bytes> = argv[1..].to_vec();
    let n = engine.with_lock(|inner| inner.store.del(&keys));
    RespValue::Integer(n as i64)
}

pub fn exists(engine: &Engine, argv: &[Bytes]) -> RespValue {
    let now = now_monotonic_ms();
    let n = engine.with_lock(|inner| argv[1..].iter().filter(|k| inner.store.exists(k, now)).count());
    RespValue::Integer(n as i64)
}

pub fn keys(engine: &Engine, argv: &[Bytes]) -> RespValue {
    if argv[1].as_ref() != b"*" {
        // this introspection command only supports the full-scan form; anything else is simply
        // empty rather than implementing a pattern matcher (Non-goals exclude a real SCAN cursor)
        return RespValue::array(Vec::new());
    }
    let now = now_monotonic_ms();
    let ks = engine.with_lock(|inner| inner.store.keys(now));
    RespValue::array(ks.into_iter().map(RespValue::bulk).collect())
}

pub fn dbsize(engine: &Engine) -> RespValue {
    let now = now_monotonic_ms();
    let n = engine.with_lock(|inner| inner.store.dbsize(now));
    RespValue::Integer(n as i64)
}
