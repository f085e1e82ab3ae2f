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

//! The master side of the replication handshake: `REPLCONF`, `PSYNC`, and the `WAIT` barrier.

use bytes::{Bytes, BytesMut};

use super::{bad_integer, ConnCtx, Outcome, Role};
use crate::engine::Engine;
use crate::rdb::EMPTY_RDB;
use crate::resp::RespValue;

/// `REPLCONF listening-port <p>` / `REPLCONF capa <cap..>` / `REPLCONF GETACK *` /
/// `REPLCONF ACK <offset>`. Unknown subcommands reply `+OK` (decision recorded in DESIGN.md).
pub fn replconf(engine: &Engine, ctx: &mut ConnCtx, argv: &[Bytes]) -> RespValue {
    let sub = argv[1].to_ascii_uppercase();
    if sub == b"ACK" {
        let Some(offset) = argv.get(2).and_then(|b| super::parse_u64(b)) else {
            return bad_integer();
        };
        if let Some(id) = ctx.replica_id {
            engine.replication.ack(id, offset);
        }
        // an ACK is a one-way report, not a request-reply exchange; nothing is written back
        return RespValue::NullBulk;
    }
    RespValue::ok()
}

/// `PSYNC <replid|?> <offset|-1>`. Always answers with a full resync: this core keeps no
/// persisted dataset a partial resync could be computed against.
pub fn psync(engine: &Engine, ctx: &mut ConnCtx, _argv: &[Bytes]) -> Outcome {
    let (id, rx) = engine.replication.register_replica();
    ctx.role = Role::Replica;
    ctx.replica_id = Some(id);

    let mut out = BytesMut::new();
    out.extend_from_slice(b"+FULLRESYNC ");
    out.extend_from_slice(engine.replication.master_replid.as_bytes());
    out.extend_from_slice(b" ");
    out.extend_from_slice(engine.replication.master_offset().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(format!("${}\r\n", EMPTY_RDB.len()).as_bytes());
    out.extend_from_slice(EMPTY_RDB);

    Outcome::BecomeReplica { fullresync_bytes: out.freeze(), rx }
}

/// `WAIT numreplicas timeout_ms`.
pub async fn wait(engine: &Engine, argv: &[Bytes]) -> RespValue {
    let (Some(n), Some(t)) = (super::parse_i64(&argv[1]), super::parse_i64(&argv[2])) else {
        return bad_integer();
    };
    if n < 0 || t < 0 {
        return RespValue::error("ERR timeout is negative");
    }
    let count = engine.replication.wait(n as usize, t as u64).await;
    RespValue::Integer(count as i64)
}
