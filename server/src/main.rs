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

//! # respd
//!
//! An in-memory key/value server speaking RESP: typed values, transactions, blocking reads
//! and master-side replication. See the individual modules for their respective documentation.

use std::cell::Cell;
use std::env;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::time;

mod clock;
mod commands;
mod config;
mod connection;
mod engine;
mod rdb;
mod replication;
mod resp;
mod store;
mod util;
mod waiters;

use config::ServerConfig;
use connection::{Connection, Terminator};
use engine::Engine;

#[cfg(not(target_env = "msvc"))]
use jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

fn main() {
    env_logger::Builder::new()
        .parse_filters(&env::var("RESPD_LOG").unwrap_or_else(|_| "info".to_owned()))
        .init();

    let config = match ServerConfig::from_args() {
        Ok(c) => c,
        Err(e) => {
            log::error!("Startup failure: {e}");
            process::exit(0x100);
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("respd-worker")
        .enable_all()
        .build()
        .unwrap();

    let exit_ok = runtime.block_on(run(config));
    drop(runtime);
    log::info!("Stopped accepting incoming connections");
    if !exit_ok {
        process::exit(0x100);
    }
}

/// Bring the listener up, accept connections until asked to shut down, then drain every
/// in-flight connection before returning. Returns `false` on a bind failure.
async fn run(config: ServerConfig) -> bool {
    if let Some((host, port)) = &config.replicaof {
        log::warn!(
            "--replicaof {host} {port} was supplied, but this build only serves the master \
             role; starting as a master and ignoring the flag"
        );
    }

    let listener = match TcpListener::bind(config.bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            log::error!("Startup failure: failed to bind {}: {e}", config.bind_addr);
            return false;
        }
    };

    let engine = Arc::new(Engine::new());
    let climit = Arc::new(Semaphore::new(config.max_connections));
    let (signal_tx, _) = broadcast::channel(1);
    let (terminate_tx, mut terminate_rx) = mpsc::channel(1);

    log::info!("respd started on {}", config.bind_addr);

    tokio::select! {
        _ = accept_loop(listener, engine, climit, signal_tx.clone(), terminate_tx.clone()) => {}
        _ = signal::ctrl_c() => {
            log::info!("Received shutdown signal, draining connections");
        }
    }

    drop(signal_tx);
    drop(terminate_tx);
    let _ = terminate_rx.recv().await;
    true
}

/// Retries a failed `accept()` with exponential backoff rather than tearing down the whole
/// server; a connection-level error here is noise, not a reason to stop serving everyone else.
struct AcceptBackoff {
    secs: Cell<u8>,
}

impl AcceptBackoff {
    const MAX_BACKOFF: u8 = 64;

    const fn new() -> Self {
        Self { secs: Cell::new(1) }
    }

    async fn spin(&self) {
        time::sleep(Duration::from_secs(self.secs.get() as u64)).await;
        self.secs.set(self.secs.get().saturating_mul(2));
    }

    fn should_give_up(&self) -> bool {
        self.secs.get() > Self::MAX_BACKOFF
    }
}

async fn accept_loop(
    listener: TcpListener,
    engine: Arc<Engine>,
    climit: Arc<Semaphore>,
    signal_tx: broadcast::Sender<()>,
    terminate_tx: mpsc::Sender<()>,
) {
    let backoff = AcceptBackoff::new();
    loop {
        let permit = match climit.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => return,
        };
        let (stream, peer): (_, SocketAddr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                if backoff.should_give_up() {
                    log::error!("Accept loop failing repeatedly, giving up: {e}");
                    return;
                }
                backoff.spin().await;
                continue;
            }
        };
        log::debug!("Accepted connection from {peer}");
        let conn = Connection::new(
            stream,
            engine.clone(),
            Terminator::new(signal_tx.subscribe()),
            permit,
            terminate_tx.clone(),
        );
        tokio::spawn(conn.run());
    }
}
