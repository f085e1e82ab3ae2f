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

//! # Replica Manager
//!
//! The master side of replication: a registry of connected replicas, write propagation, offset
//! accounting and the `WAIT` barrier. Grounded in the same "one `Arc`-shared, mutex-guarded
//! singleton per connection" idiom as `engine::Engine`, but kept as its own lock since
//! propagation and acknowledgment bookkeeping have nothing to do with the key/value store.


use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::resp::command_frame;

/// A high-water mark on a replica's outbound buffer past which it's considered too far behind
/// to be worth keeping around (§4.E "Failure handling").
const REPLICA_BACKLOG_HIGH_WATER: usize = 4096;

struct ReplicaHandle {
    sender: mpsc::Sender<Bytes>,
    offset_acked: u64,
}

struct ReplicationState {
    replicas: HashMap<u64, ReplicaHandle>,
    next_id: u64,
    master_offset: u64,
}

/// Shared, `Arc`-wrapped (by the caller) replication state. One per process.
pub struct ReplicationHub {
    state: Mutex<ReplicationState>,
    pub master_replid: String,
}

impl ReplicationHub {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ReplicationState {
                replicas: HashMap::new(),
                next_id: 0,
                master_offset: 0,
            }),
            master_replid: generate_replid(),
        }
    }

    pub fn master_offset(&self) -> u64 {
        self.state.lock().master_offset
    }

    /// Register a new replica, returning its id and the receiving half of its propagation
    /// channel. The connection task owns the receiver and drains it into the socket.
    pub fn register_replica(&self) -> (u64, mpsc::Receiver<Bytes>) {
        let mut st = self.state.lock();
        st.next_id += 1;
        let id = st.next_id;
        let (tx, rx) = mpsc::channel(REPLICA_BACKLOG_HIGH_WATER);
        st.replicas.insert(id, ReplicaHandle { sender: tx, offset_acked: 0 });
        (id, rx)
    }

    pub fn remove_replica(&self, id: u64) {
        self.state.lock().replicas.remove(&id);
    }

    pub fn replica_count(&self) -> usize {
        self.state.lock().replicas.len()
    }

    /// Forward `frame` to every registered replica and advance `master_offset` by its length.
    /// A replica whose channel is full (past the high-water mark) or closed is dropped.
    pub fn propagate(&self, frame: &Bytes) {
        let mut st = self.state.lock();
        st.master_offset += frame.len() as u64;
        st.replicas.retain(|_, r| match r.sender.try_send(frame.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("replica fell behind the propagation backlog; disconnecting");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Record a `REPLCONF ACK <offset>` from a replica.
    pub fn ack(&self, id: u64, offset: u64) {
        let mut st = self.state.lock();
        if let Some(r) = st.replicas.get_mut(&id) {
            r.offset_acked = r.offset_acked.max(offset);
        }
    }

    fn count_caught_up(&self, target_offset: u64) -> usize {
        self.state.lock().replicas.values().filter(|r| r.offset_acked >= target_offset).count()
    }

    /// Ask every replica to report its offset immediately, by propagating a `REPLCONF GETACK *`.
    fn request_acks(&self) {
        let getack = command_frame(vec![&b"REPLCONF"[..], &b"GETACK"[..], &b"*"[..]]).to_bytes();
        self.propagate(&getack);
    }

    /// `WAIT numreplicas timeout_ms`. `numreplicas == 0` returns immediately with the current
    /// count (decision recorded in DESIGN.md). `timeout_ms == 0` blocks indefinitely.
    pub async fn wait(&self, numreplicas: usize, timeout_ms: u64) -> usize {
        let target = self.master_offset();
        if numreplicas == 0 {
            return self.count_caught_up(target);
        }
        self.request_acks();
        const POLL_INTERVAL: Duration = Duration::from_millis(20);
        if timeout_ms == 0 {
            loop {
                let c = self.count_caught_up(target);
                if c >= numreplicas {
                    return c;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let c = self.count_caught_up(target);
            if c >= numreplicas || tokio::time::Instant::now() >= deadline {
                return c;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

impl Default for ReplicationHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A 40-hex-character replication id, the same shape as a Redis `master_replid`. Not
/// cryptographically meaningful, just needs to look distinct across restarts.
fn generate_replid() -> String {
    let a = uuid::Uuid::new_v4().simple().to_string();
    let b = uuid::Uuid::new_v4().simple().to_string();
    format!("{a}{b}")[..40].to_string()
}
