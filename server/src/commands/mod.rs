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

//! # The command catalog and dispatcher
//!
//! This is the `respd` analogue of Skytable's `actions` module: a table of named operations with
//! arity and a write flag (upstream generates this table with an `action!` macro; here it's a
//! plain static slice since every handler here is `async` and macro-generated async fn items get
//! unwieldy fast), plus one dispatcher that routes a parsed frame to its executor. Individual
//! executors live in sibling files grouped by the value type they touch, mirroring
//! `actions/get.rs`, `actions/lists.rs`, etc.

mod generic;
mod lists;
mod repl;
mod streams;
mod strings;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::engine::Engine;
use crate::resp::RespValue;

/// Whether this connection is an ordinary client or a promoted replica feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Replica,
}

/// The dispatch-relevant slice of per-connection state. Transaction queuing is owned entirely by
/// `connection::Connection` (it has to buffer frames before a command is ever dispatched), so it
/// isn't part of this context -- only the bits individual command executors need to read or
/// mutate.
pub struct ConnCtx {
    pub role: Role,
    pub replica_id: Option<u64>,
}

impl ConnCtx {
    pub fn new() -> Self {
        Self { role: Role::Client, replica_id: None }
    }
}

impl Default for ConnCtx {
    fn default() -> Self {
        Self::new()
    }
}

/// What dispatching a single command produced.
pub enum Outcome {
    /// A normal reply to write back to the connection.
    Reply(RespValue),
    /// `PSYNC` completed: the connection must send `fullresync_bytes` verbatim (the `+FULLRESYNC`
    /// line followed by the bulk-framed RDB, with no extra encoding) and then switch to draining
    /// `rx` into the socket instead of reading further client commands.
    BecomeReplica { fullresync_bytes: Bytes, rx: mpsc::Receiver<Bytes> },
}

/// One entry in the command catalog: name, arity bounds (inclusive, counted including the
/// command name itself), and whether a successful run should propagate to replicas.
pub struct CommandSpec {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    pub is_write: bool,
    pub is_transaction_control: bool,
}

const UNBOUNDED: usize = usize::MAX;

pub static CATALOG: &[CommandSpec] = &[
    CommandSpec { name: "PING", min_args: 1, max_args: 2, is_write: false, is_transaction_control: false },
    CommandSpec { name: "ECHO", min_args: 2, max_args: 2, is_write: false, is_transaction_control: false },
    CommandSpec { name: "GET", min_args: 2, max_args: 2, is_write: false, is_transaction_control: false },
    CommandSpec { name: "SET", min_args: 3, max_args: 5, is_write: true, is_transaction_control: false },
    CommandSpec { name: "INCR", min_args: 2, max_args: 2, is_write: true, is_transaction_control: false },
    CommandSpec { name: "TYPE", min_args: 2, max_args: 2, is_write: false, is_transaction_control: false },
    CommandSpec { name: "DEL", min_args: 2, max_args: UNBOUNDED, is_write: true, is_transaction_control: false },
    CommandSpec { name: "EXISTS", min_args: 2, max_args: UNBOUNDED, is_write: false, is_transaction_control: false },
    CommandSpec { name: "KEYS", min_args: 2, max_args: 2, is_write: false, is_transaction_control: false },
    CommandSpec { name: "DBSIZE", min_args: 1, max_args: 1, is_write: false, is_transaction_control: false },
    CommandSpec { name: "LPUSH", min_args: 3, max_args: UNBOUNDED, is_write: true, is_transaction_control: false },
    CommandSpec { name: "RPUSH", min_args: 3, max_args: UNBOUNDED, is_write: true, is_transaction_control: false },
    CommandSpec { name: "LPOP", min_args: 2, max_args: 2, is_write: true, is_transaction_control: false },
    CommandSpec { name: "LRANGE", min_args: 4, max_args: 4, is_write: false, is_transaction_control: false },
    CommandSpec { name: "LLEN", min_args: 2, max_args: 2, is_write: false, is_transaction_control: false },
    CommandSpec { name: "BLPOP", min_args: 3, max_args: UNBOUNDED, is_write: true, is_transaction_control: false },
    CommandSpec { name: "XADD", min_args: 5, max_args: UNBOUNDED, is_write: true, is_transaction_control: false },
    CommandSpec { name: "XRANGE", min_args: 4, max_args: 4, is_write: false, is_transaction_control: false },
    CommandSpec { name: "XREAD", min_args: 4, max_args: UNBOUNDED, is_write: false, is_transaction_control: false },
    CommandSpec { name: "XINFO", min_args: 3, max_args: 3, is_write: false, is_transaction_control: false },
    CommandSpec { name: "MULTI", min_args: 1, max_args: 1, is_write: false, is_transaction_control: true },
    CommandSpec { name: "EXEC", min_args: 1, max_args: 1, is_write: false, is_transaction_control: true },
    CommandSpec { name: "DISCARD", min_args: 1, max_args: 1, is_write: false, is_transaction_control: true },
    CommandSpec { name: "REPLCONF", min_args: 2, max_args: UNBOUNDED, is_write: false, is_transaction_control: false },
    CommandSpec { name: "PSYNC", min_args: 3, max_args: 3, is_write: false, is_transaction_control: false },
    CommandSpec { name: "WAIT", min_args: 3, max_args: 3, is_write: false, is_transaction_control: false },
];

/// Case-insensitive catalog lookup.
pub fn lookup(name: &[u8]) -> Option<&'static CommandSpec> {
    CATALOG.iter().find(|c| c.name.as_bytes().eq_ignore_ascii_case(name))
}

/// Execute one already-parsed, already-arity-checked command. `argv[0]` is the command name.
pub async fn dispatch(engine: &Engine, ctx: &mut ConnCtx, argv: &[Bytes]) -> Outcome {
    let name = String::from_utf8_lossy(&argv[0]).to_ascii_uppercase();
    let reply = match name.as_str() {
        "PING" => generic::ping(argv),
        "ECHO" => generic::echo(argv),
        "TYPE" => generic::type_of(engine, argv),
        "DEL" => generic::del(engine, argv),
        "EXISTS" => generic::exists(engine, argv),
        "KEYS" => generic::keys(engine, argv),
        "DBSIZE" => generic::dbsize(engine),
        "GET" => strings::get(engine, argv),
        "SET" => strings::set(engine, argv),
        "INCR" => strings::incr(engine, argv),
        "LPUSH" => lists::push(engine, argv, true),
        "RPUSH" => lists::push(engine, argv, false),
        "LPOP" => lists::lpop(engine, argv),
        "LRANGE" => lists::lrange(engine, argv),
        "LLEN" => lists::llen(engine, argv),
        "BLPOP" => lists::blpop(engine, argv).await,
        "XADD" => streams::xadd(engine, argv),
        "XRANGE" => streams::xrange(engine, argv),
        "XREAD" => streams::xread(engine, argv).await,
        "XINFO" => streams::xinfo(engine, argv),
        "REPLCONF" => repl::replconf(engine, ctx, argv),
        "PSYNC" => return repl::psync(engine, ctx, argv),
        "WAIT" => repl::wait(engine, argv).await,
        _ => RespValue::error(format!("ERR unknown command '{name}'")),
    };
    Outcome::Reply(reply)
}

/// Shared arity/type-argument helpers used by more than one executor file.
pub(crate) fn parse_i64(b: &[u8]) -> Option<i64> {
    std::str::from_utf8(b).ok()?.parse().ok()
}

pub(crate) fn parse_u64(b: &[u8]) -> Option<u64> {
    std::str::from_utf8(b).ok()?.parse().ok()
}

pub(crate) fn bad_integer() -> RespValue {
    RespValue::error("ERR value is not an integer or out of range")
}

/// Turn a [`crate::store::StoreError`] into the exact user-visible RESP error text (§6).
pub(crate) fn store_err_to_resp(e: crate::store::StoreError) -> RespValue {
    use crate::store::StoreError;
    match e {
        StoreError::WrongType => RespValue::error("WRONGTYPE Operation against a key holding the wrong kind of value"),
        StoreError::NotAnInteger => bad_integer(),
        StoreError::XaddIdTooSmall => {
            RespValue::error("ERR The ID specified in XADD is equal or smaller than the target stream top item")
        }
    }
}
