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

//! # Per-connection state machine
//!
//! The `respd` analogue of Skytable's `dbnet::connection::ConnectionHandler`: one task per
//! accepted socket, holding its own read buffer, its own transaction queue, and a semaphore
//! permit released on drop (the `climit` back-pressure idiom). `run()` mirrors the
//! `tokio::select!` between "read and dispatch" and "shutdown signal received".

use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::sync::mpsc;

use crate::commands::{self, CommandSpec, ConnCtx, Outcome};
use crate::engine::Engine;
use crate::resp::{command_frame, Parser, RespValue};

#[cfg(test)]
mod tests;

/// A fixed growth chunk for the read buffer, the same role as `BUF_CAP` plays upstream.
const READ_CHUNK: usize = 8 * 1024;

/// `Terminator` is this connection's half of the listener's shutdown broadcast: it resolves
/// exactly once, when the listener asks every live connection to wind down.
pub struct Terminator {
    signal: broadcast::Receiver<()>,
}

impl Terminator {
    pub fn new(signal: broadcast::Receiver<()>) -> Self {
        Self { signal }
    }

    pub async fn wait(&mut self) {
        let _ = self.signal.recv().await;
    }
}

enum Mode {
    Normal,
    Queuing { queue: Vec<Vec<Bytes>>, poisoned: bool },
}

/// One accepted client connection, still in the `Client` role until (if ever) it completes a
/// `PSYNC` handshake and is promoted to `Replica`.
pub struct Connection {
    stream: TcpStream,
    engine: Arc<Engine>,
    terminator: Terminator,
    ctx: ConnCtx,
    mode: Mode,
    read_buf: BytesMut,
    /// kept alive for the lifetime of the connection; its `Drop` returns the slot to `climit`
    _permit: tokio::sync::OwnedSemaphorePermit,
    /// held only so the sender side of the shutdown-drain channel stays alive until this
    /// connection exits; the server's shutdown path waits for every clone to drop (§5)
    _terminate_tx: mpsc::Sender<()>,
}

impl Connection {
    pub fn new(
        stream: TcpStream,
        engine: Arc<Engine>,
        terminator: Terminator,
        permit: tokio::sync::OwnedSemaphorePermit,
        terminate_tx: mpsc::Sender<()>,
    ) -> Self {
        Self {
            stream,
            engine,
            terminator,
            ctx: ConnCtx::new(),
            mode: Mode::Normal,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            _permit: permit,
            _terminate_tx: terminate_tx,
        }
    }

    /// Drive this connection until the socket closes or the server asks it to shut down.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.terminator.wait() => {
                    log::debug!("connection shutting down on server signal");
                    return;
                }
                frame = self.read_frame() => {
                    match frame {
                        Ok(Some(argv)) => {
                            if self.handle_frame(argv).await.is_break() {
                                return;
                            }
                        }
                        Ok(None) => {
                            log::debug!("connection closed by peer");
                            return;
                        }
                        Err(e) => {
                            log::error!("connection I/O error: {e}");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Read exactly one complete RESP frame off the socket, growing the buffer as needed.
    /// Returns `Ok(None)` on clean EOF with no partial frame pending.
    async fn read_frame(&mut self) -> crate::util::IoResult<Option<RespValue>> {
        loop {
            match Parser::parse(&self.read_buf) {
                Ok((value, consumed)) => {
                    let _ = self.read_buf.split_to(consumed);
                    return Ok(Some(value));
                }
                Err(crate::resp::ParseError::Invalid) => {
                    let _ = self.stream.write_all(&RespValue::error("ERR Protocol error").to_bytes()).await;
                    return Ok(None);
                }
                Err(crate::resp::ParseError::Empty) | Err(crate::resp::ParseError::NotEnough) => {
                    let mut chunk = [0u8; READ_CHUNK];
                    let n = self.stream.read(&mut chunk).await?;
                    if n == 0 {
                        return Ok(None);
                    }
                    self.read_buf.extend_from_slice(&chunk[..n]);
                }
            }
        }
    }

    /// Handle one parsed frame: validate shape/arity, route through the transaction FSM, write
    /// the reply (or replies), and propagate writes. Returns whether the connection loop should
    /// stop (replica feed takeover, or an unrecoverable protocol condition).
    async fn handle_frame(&mut self, value: RespValue) -> std::ops::ControlFlow<()> {
        let Some(argv) = crate::resp::frame_into_argv(value) else {
            let _ = self.write_reply(&RespValue::error("ERR Protocol error")).await;
            return std::ops::ControlFlow::Break(());
        };
        if argv.is_empty() {
            return std::ops::ControlFlow::Continue(());
        }
        let name_upper = argv[0].to_ascii_uppercase();
        let spec = commands::lookup(&name_upper);

        match spec {
            None => {
                let msg = format!("ERR unknown command '{}'", String::from_utf8_lossy(&argv[0]));
                self.queue_or_poison(&msg).await;
            }
            Some(spec) if !arity_ok(spec, argv.len()) => {
                let msg = format!("ERR wrong number of arguments for '{}' command", spec.name.to_ascii_lowercase());
                self.queue_or_poison(&msg).await;
            }
            Some(spec) if spec.is_transaction_control => {
                self.handle_transaction_control(spec, &argv).await;
            }
            Some(_) => match &mut self.mode {
                Mode::Queuing { queue, .. } => {
                    queue.push(argv);
                    let _ = self.write_reply(&RespValue::simple("QUEUED")).await;
                }
                Mode::Normal => {
                    return self.execute_and_propagate(argv).await;
                }
            },
        }
        std::ops::ControlFlow::Continue(())
    }

    /// Reply with `msg` immediately; if queuing, mark the transaction poisoned (§4.D EXECABORT).
    async fn queue_or_poison(&mut self, msg: &str) {
        if let Mode::Queuing { poisoned, .. } = &mut self.mode {
            *poisoned = true;
        }
        let _ = self.write_reply(&RespValue::error(msg)).await;
    }

    async fn handle_transaction_control(&mut self, spec: &CommandSpec, argv: &[Bytes]) {
        let _ = argv;
        match spec.name {
            "MULTI" => {
                let reply = match &self.mode {
                    Mode::Queuing { .. } => RespValue::error("ERR MULTI calls can not be nested"),
                    Mode::Normal => {
                        self.mode = Mode::Queuing { queue: Vec::new(), poisoned: false };
                        RespValue::ok()
                    }
                };
                let _ = self.write_reply(&reply).await;
            }
            "DISCARD" => {
                let reply = match &self.mode {
                    Mode::Normal => RespValue::error("ERR DISCARD without MULTI"),
                    Mode::Queuing { .. } => {
                        self.mode = Mode::Normal;
                        RespValue::ok()
                    }
                };
                let _ = self.write_reply(&reply).await;
            }
            "EXEC" => self.handle_exec().await,
            _ => unreachable!("only MULTI/DISCARD/EXEC are marked transaction-control"),
        }
    }

    async fn handle_exec(&mut self) {
        let queued = match std::mem::replace(&mut self.mode, Mode::Normal) {
            Mode::Normal => {
                let _ = self.write_reply(&RespValue::error("ERR EXEC without MULTI")).await;
                return;
            }
            Mode::Queuing { queue, poisoned } => {
                if poisoned {
                    let _ = self
                        .write_reply(&RespValue::error("EXECABORT Transaction discarded because of previous errors."))
                        .await;
                    return;
                }
                queue
            }
        };

        let mut replies = Vec::with_capacity(queued.len());
        for argv in queued {
            // PSYNC takes over the whole connection and makes no sense mid-transaction; refuse
            // it up front rather than letting it register a replica we then throw away
            if argv[0].eq_ignore_ascii_case(b"PSYNC") {
                replies.push(RespValue::error("ERR command not allowed inside a transaction"));
                continue;
            }
            let reply = match commands::dispatch(&self.engine, &mut self.ctx, &argv).await {
                Outcome::Reply(r) => r,
                Outcome::BecomeReplica { .. } => unreachable!("PSYNC is filtered out above"),
            };
            self.propagate_if_write(&argv, &reply);
            replies.push(reply);
        }
        let _ = self.write_reply(&RespValue::array(replies)).await;
    }

    /// Execute one command outside a transaction, propagate it if it was a successful write, and
    /// write its reply (or, for `PSYNC`, take over the connection as a replica feed).
    async fn execute_and_propagate(&mut self, argv: Vec<Bytes>) -> std::ops::ControlFlow<()> {
        match commands::dispatch(&self.engine, &mut self.ctx, &argv).await {
            Outcome::Reply(reply) => {
                self.propagate_if_write(&argv, &reply);
                let _ = self.write_reply(&reply).await;
                std::ops::ControlFlow::Continue(())
            }
            Outcome::BecomeReplica { fullresync_bytes, rx } => {
                if self.stream.write_all(&fullresync_bytes).await.is_err() {
                    return std::ops::ControlFlow::Break(());
                }
                log::info!("replica completed PSYNC handshake");
                self.run_replica_feed(rx).await;
                std::ops::ControlFlow::Break(())
            }
        }
    }

    fn propagate_if_write(&self, argv: &[Bytes], reply: &RespValue) {
        let Some(spec) = commands::lookup(&argv[0].to_ascii_uppercase()) else {
            return;
        };
        if !spec.is_write || matches!(reply, RespValue::Error(_)) {
            return;
        }
        let mut normalized = argv.to_vec();
        normalized[0] = Bytes::from(spec.name.as_bytes().to_vec());
        let frame = command_frame(normalized).to_bytes();
        self.engine.replication.propagate(&frame);
    }

    /// Once a connection has completed `PSYNC`, it's a one-way propagation feed plus an inbound
    /// channel for unsolicited `REPLCONF ACK` reports. It never goes back to being a client.
    async fn run_replica_feed(&mut self, mut rx: mpsc::Receiver<Bytes>) {
        loop {
            tokio::select! {
                biased;
                _ = self.terminator.wait() => return,
                maybe_frame = rx.recv() => {
                    match maybe_frame {
                        Some(frame) => {
                            if self.stream.write_all(&frame).await.is_err() {
                                self.deregister_replica();
                                return;
                            }
                        }
                        None => return,
                    }
                }
                frame = self.read_frame() => {
                    match frame {
                        Ok(Some(value)) => {
                            if let Some(argv) = crate::resp::frame_into_argv(value) {
                                if argv.first().map(|c| c.eq_ignore_ascii_case(b"REPLCONF")).unwrap_or(false) {
                                    let _ = commands::dispatch(&self.engine, &mut self.ctx, &argv).await;
                                }
                            }
                        }
                        Ok(None) | Err(_) => {
                            self.deregister_replica();
                            return;
                        }
                    }
                }
            }
        }
    }

    fn deregister_replica(&self) {
        if let Some(id) = self.ctx.replica_id {
            self.engine.replication.remove_replica(id);
        }
    }

    async fn write_reply(&mut self, reply: &RespValue) -> crate::util::IoResult<()> {
        self.stream.write_all(&reply.to_bytes()).await?;
        self.stream.flush().await
    }
}

fn arity_ok(spec: &CommandSpec, argc: usize) -> bool {
    argc >= spec.min_args && argc <= spec.max_args
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.deregister_replica();
    }
}
