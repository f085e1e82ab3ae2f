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

//! The fixed empty snapshot handed to a freshly `PSYNC`'d replica.
//!
//! This core doesn't persist anything to disk, so there's no real dataset to dump; what a
//! replica needs from `FULLRESYNC` is a syntactically valid, empty RDB image to load before it
//! starts applying the propagation stream. `REDIS0011` is a version header, `0xFF` is the EOF
//! opcode, and the trailing eight zero bytes stand in for a CRC64 checksum (disabled checksums
//! are conventionally all-zero).

pub const EMPTY_RDB: &[u8] = b"REDIS0011\xff\x00\x00\x00\x00\x00\x00\x00\x00";
