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

//! # The engine
//!
//! `Engine` is the process-wide singleton, the `respd` analogue of Skytable's `Corestore`
//! handle: every connection task holds an `Arc<Engine>` and reaches the data through it. Unlike
//! `Corestore`, which fans out into a lock-free sharded `Coremap` per keyspace, `Engine` wraps
//! its [`Store`] and [`WaiterRegistry`] in a single `parking_lot::Mutex`. That's deliberate: the
//! command set this server exposes (transactions, blocking reads, replication offsets) all want
//! a single global order of operations, and `parking_lot`'s mutex is cheap enough, uncontended,
//! that sharding would only buy concurrency the protocol doesn't need. The one rule every caller
//! must follow is that the lock is never held across an `.await` -- critical sections here are
//! always synchronous code that runs to completion before anything can yield.

use bytes::Bytes;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::clock::now_monotonic_ms;
use crate::replication::ReplicationHub;
use crate::resp::RespValue;
use crate::store::{Store, StoreResult, StreamId};
use crate::waiters::{WaitOutcome, WaiterId, WaiterPredicate, WaiterRegistry};

pub struct EngineInner {
    pub store: Store,
    pub waiters: WaiterRegistry,
}

/// The shared, lock-protected database plus the replication fan-out, which has its own
/// independent synchronization (see `replication::ReplicationHub`) since propagation is a
/// broadcast concern, not a store concern.
pub struct Engine {
    inner: Mutex<EngineInner>,
    pub replication: ReplicationHub,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(EngineInner { store: Store::new(), waiters: WaiterRegistry::new() }),
            replication: ReplicationHub::new(),
        }
    }

    /// Run a synchronous closure with exclusive access to the store and waiter registry. The
    /// closure must not contain an `.await` -- there's no way to enforce that at the type level
    /// short of requiring `FnOnce() -> T` (which this does), so it's on every caller to keep
    /// these sections short and non-async.
    pub fn with_lock<T>(&self, f: impl FnOnce(&mut EngineInner) -> T) -> T {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    /// Convenience: run a write that may need to wake blocked `BLPOP` callers on `key`.
    pub fn with_lock_notify_list<T>(&self, key: &[u8], f: impl FnOnce(&mut EngineInner) -> T) -> T {
        let mut guard = self.inner.lock();
        let result = f(&mut guard);
        let now = now_monotonic_ms();
        let EngineInner { store, waiters } = &mut *guard;
        waiters.notify_list(store, key, now);
        result
    }

    /// Convenience: run a write that may need to wake blocked `XREAD BLOCK` callers on `key`.
    pub fn with_lock_notify_stream<T>(&self, key: &[u8], f: impl FnOnce(&mut EngineInner) -> T) -> T {
        let mut guard = self.inner.lock();
        let result = f(&mut guard);
        let EngineInner { store, waiters } = &mut *guard;
        waiters.notify_stream(store, key);
        result
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Block the calling task until `keys` (checked in order) yields an element via `LPUSH`/`RPUSH`,
/// or until `timeout_ms` elapses (`0` means wait forever). Performs the non-blocking fast path
/// itself: if an element is already available, it's popped and returned with no waiter ever
/// registered.
pub async fn blocking_lpop(engine: &Engine, keys: Vec<Bytes>, timeout_ms: u64) -> StoreResult<Option<(Bytes, Bytes)>> {
    let now = now_monotonic_ms();
    let registered = engine.with_lock(|inner| -> StoreResult<Result<(Bytes, Bytes), (WaiterId, oneshot::Receiver<WaitOutcome>)>> {
        for k in &keys {
            if inner.store.list_has_elements(k, now) {
                let v = inner.store.lpop(k, now)?.expect("checked non-empty above");
                return Ok(Ok((k.clone(), v)));
            }
        }
        let handle = inner.waiters.register(keys.clone(), WaiterPredicate::ListPop { order: keys.clone() });
        Ok(Err(handle))
    })?;

    let (id, rx) = match registered {
        Ok(pair) => return Ok(Some(pair)),
        Err(handle) => handle,
    };

    let mut guard = WaiterGuard { engine, id: Some(id) };
    let outcome = if timeout_ms == 0 {
        rx.await.ok()
    } else {
        tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await.ok().and_then(Result::ok)
    };
    guard.id = None; // completed one way or another; the registry entry is already gone

    match outcome {
        Some(WaitOutcome::ListPopped { key, value }) => Ok(Some((key, value))),
        _ => Ok(None),
    }
}

/// Block the calling task until any of `origins` (key, last-seen-id pairs) has a newer entry, or
/// until `timeout_ms` elapses (`0` means wait forever).
pub async fn blocking_xread(
    engine: &Engine,
    origins: Vec<(Bytes, StreamId)>,
    timeout_ms: u64,
) -> StoreResult<Vec<(Bytes, Vec<crate::store::StreamEntry>)>> {
    let registered = engine.with_lock(|inner| -> StoreResult<Result<Vec<(Bytes, Vec<crate::store::StreamEntry>)>, (WaiterId, oneshot::Receiver<WaitOutcome>)>> {
        let mut collected = Vec::new();
        for (k, baseline) in &origins {
            let entries = inner.store.xread_since(k, *baseline)?;
            if !entries.is_empty() {
                collected.push((k.clone(), entries));
            }
        }
        if !collected.is_empty() {
            return Ok(Ok(collected));
        }
        let keys = origins.iter().map(|(k, _)| k.clone()).collect();
        let handle = inner.waiters.register(keys, WaiterPredicate::StreamRead { origins: origins.clone() });
        Ok(Err(handle))
    })?;

    let (id, rx) = match registered {
        Ok(data) => return Ok(data),
        Err(handle) => handle,
    };

    let mut guard = WaiterGuard { engine, id: Some(id) };
    let outcome = if timeout_ms == 0 {
        rx.await.ok()
    } else {
        tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await.ok().and_then(Result::ok)
    };
    guard.id = None;

    match outcome {
        Some(WaitOutcome::StreamData(data)) => Ok(data),
        _ => Ok(Vec::new()),
    }
}

/// Ensures a registered waiter is always removed from the registry, even when the surrounding
/// future is dropped mid-wait (client disconnects, or a `select!` elsewhere cancels us). Setting
/// `id` to `None` before drop marks the waiter as already resolved, skipping the cleanup.
struct WaiterGuard<'e> {
    engine: &'e Engine,
    id: Option<WaiterId>,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.engine.with_lock(|inner| inner.waiters.deregister(id));
        }
    }
}

/// Encode a null reply for a `BLPOP`/`XREAD BLOCK` timeout, shared by the two command handlers.
pub fn null_array() -> RespValue {
    RespValue::NullArray
}
