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

//! A monotonic millisecond clock
//!
//! TTLs, `BLPOP`/`XREAD`/`WAIT` deadlines and stream ids all need a notion of "now". TTLs and
//! deadlines use [`now_monotonic_ms`]; stream ids additionally need wall-clock time, handled in
//! `store::StreamIdSpec::resolve`.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Returns milliseconds elapsed since an arbitrary, process-local epoch. Never goes backwards,
/// unlike wall-clock time -- safe to use for TTL/deadline arithmetic.
pub fn now_monotonic_ms() -> u64 {
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let start = *START.get_or_init(Instant::now);
    start.elapsed().as_millis() as u64
}

/// Returns the current wall-clock time in milliseconds since the Unix epoch. Used only to seed
/// new stream ids -- `Store::xadd` still forces strict monotonicity on collision.
pub fn now_wall_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
