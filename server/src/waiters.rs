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

//! # The blocking waiter registry
//!
//! A key -> FIFO-of-waiters map, the cooperative-suspension primitive behind `BLPOP` and
//! `XREAD BLOCK`. Every waiter is identified by a stable [`WaiterId`] handle rather than by a
//! direct reference, following the generational-handle pattern: wake-up looks the waiter up by
//! id, so removing it from every key queue it's registered on is cheap and can't dangle.
//!
//! `notify` is always called by the task that just committed a write, with the store lock still
//! held -- it performs the waking mutation itself (popping the list head, collecting the new
//! stream entries) and hands the result to the suspended task over a completion slot
//! (`tokio::sync::oneshot`). The suspended task never re-enters the store on its own; it just
//! waits for the slot to fill.


use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use tokio::sync::oneshot;

use crate::store::{Store, StreamEntry, StreamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterId(u64);

/// What a waiter is blocked on, and how to decide whether it's satisfied.
pub enum WaiterPredicate {
    /// `BLPOP k1 .. kn`: keys checked in this order, first non-empty list wins.
    ListPop { order: Vec<Bytes> },
    /// `XREAD BLOCK .. STREAMS k1 .. kn id1 .. idn`: per-key baseline id to read strictly after.
    StreamRead { origins: Vec<(Bytes, StreamId)> },
}

/// What a waiter is woken up with.
pub enum WaitOutcome {
    ListPopped { key: Bytes, value: Bytes },
    StreamData(Vec<(Bytes, Vec<StreamEntry>)>),
}

struct WaiterEntry {
    keys: Vec<Bytes>,
    predicate: WaiterPredicate,
    sender: oneshot::Sender<WaitOutcome>,
}

/// The registry itself. Lives inside the same lock as the [`Store`] (see `engine::Engine`) so
/// that registration, notification, and the store mutation they trigger are all one atomic step.
#[derive(Default)]
pub struct WaiterRegistry {
    queues: HashMap<Bytes, VecDeque<WaiterId>>,
    entries: HashMap<WaiterId, WaiterEntry>,
    next_id: u64,
}

impl WaiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new waiter across all of `keys`, in arrival order. Returns a handle plus the
    /// receiving end of its completion slot.
    pub fn register(
        &mut self,
        keys: Vec<Bytes>,
        predicate: WaiterPredicate,
    ) -> (WaiterId, oneshot::Receiver<WaitOutcome>) {
        self.next_id += 1;
        let id = WaiterId(self.next_id);
        let (tx, rx) = oneshot::channel();
        for k in &keys {
            self.queues.entry(k.clone()).or_default().push_back(id);
        }
        self.entries.insert(id, WaiterEntry { keys, predicate, sender: tx });
        (id, rx)
    }

    /// Remove a waiter from every queue it's on without completing it. Used on timeout and on
    /// client disconnect (§5 cancellation).
    pub fn deregister(&mut self, id: WaiterId) {
        if let Some(entry) = self.entries.remove(&id) {
            for k in &entry.keys {
                self.remove_id_from_queue(k, id);
            }
        }
    }

    fn remove_id_from_queue(&mut self, key: &Bytes, id: WaiterId) {
        if let Some(q) = self.queues.get_mut(key) {
            q.retain(|waiting| *waiting != id);
            if q.is_empty() {
                self.queues.remove(key);
            }
        }
    }

    fn complete(&mut self, id: WaiterId, outcome: WaitOutcome) {
        if let Some(entry) = self.entries.remove(&id) {
            for k in &entry.keys {
                self.remove_id_from_queue(k, id);
            }
            // the receiver may already be gone (client disconnected): ignore send failure
            let _ = entry.sender.send(outcome);
        }
    }

    /// Drain and re-evaluate every waiter registered on `key` after a list write. At most one
    /// waiter consumes any single newly available element; waiters that aren't satisfied are
    /// left in place for the next notification.
    pub fn notify_list(&mut self, store: &mut Store, key: &[u8], now_ms: u64) {
        let Some(ids) = self.queues.get(key).cloned() else {
            return;
        };
        for id in ids {
            let Some(entry) = self.entries.get(&id) else {
                continue;
            };
            let WaiterPredicate::ListPop { order } = &entry.predicate else {
                continue;
            };
            let ready = order.iter().find(|k| store.list_has_elements(k, now_ms)).cloned();
            if let Some(ready_key) = ready {
                let value = store
                    .lpop(&ready_key, now_ms)
                    .expect("type already checked by list_has_elements")
                    .expect("checked non-empty immediately above");
                self.complete(id, WaitOutcome::ListPopped { key: ready_key, value });
            }
        }
    }

    /// Drain and re-evaluate every waiter registered on `key` after an `XADD`.
    pub fn notify_stream(&mut self, store: &Store, key: &[u8]) {
        let Some(ids) = self.queues.get(key).cloned() else {
            return;
        };
        for id in ids {
            let Some(entry) = self.entries.get(&id) else {
                continue;
            };
            let WaiterPredicate::StreamRead { origins } = &entry.predicate else {
                continue;
            };
            let mut collected = Vec::new();
            for (k, baseline) in origins {
                if let Ok(entries) = store.xread_since(k, *baseline) {
                    if !entries.is_empty() {
                        collected.push((k.clone(), entries));
                    }
                }
            }
            if !collected.is_empty() {
                self.complete(id, WaitOutcome::StreamData(collected));
            }
        }
    }
}
