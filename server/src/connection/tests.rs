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

//! End-to-end wire-level tests: a real `TcpListener`, real `Connection` tasks, real client
//! sockets speaking RESP bytes, run against the actual accept/dispatch/propagate path rather
//! than against the command executors directly.

use super::*;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

/// Bind an ephemeral port, spin up an accept loop backed by a fresh [`Engine`], and return the
/// address clients can connect to. The loop (and every spawned connection) is torn down when the
/// test's runtime shuts down at the end of the `#[tokio::test]` function.
async fn start_server(engine: Arc<Engine>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("listener has a local addr");
    let climit = Arc::new(Semaphore::new(64));
    let (signal_tx, _signal_rx) = broadcast::channel(1);
    let (terminate_tx, _terminate_rx) = mpsc::channel(1);

    tokio::spawn(async move {
        loop {
            let permit = match climit.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => return,
            };
            let (stream, _peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let conn = Connection::new(
                stream,
                engine.clone(),
                Terminator::new(signal_tx.subscribe()),
                permit,
                terminate_tx.clone(),
            );
            tokio::spawn(conn.run());
        }
    });
    addr
}

async fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.expect("connect to test server")
}

async fn roundtrip(stream: &mut TcpStream, req: &[u8]) -> Vec<u8> {
    stream.write_all(req).await.expect("write request");
    let mut buf = vec![0u8; 8 * 1024];
    let n = stream.read(&mut buf).await.expect("read response");
    buf.truncate(n);
    buf
}

#[tokio::test]
async fn ping_returns_pong() {
    let addr = start_server(Arc::new(Engine::new())).await;
    let mut client = connect(addr).await;
    let resp = roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n").await;
    assert_eq!(resp, b"+PONG\r\n");
}

#[tokio::test]
async fn set_get_with_px_ttl_then_expiry() {
    let addr = start_server(Arc::new(Engine::new())).await;
    let mut client = connect(addr).await;
    let set = roundtrip(&mut client, b"*5\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n$2\r\nPX\r\n$2\r\n50\r\n").await;
    assert_eq!(set, b"+OK\r\n");
    let get = roundtrip(&mut client, b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n").await;
    assert_eq!(get, b"$3\r\nbar\r\n");
    tokio::time::sleep(Duration::from_millis(60)).await;
    let get_after = roundtrip(&mut client, b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n").await;
    assert_eq!(get_after, b"$-1\r\n");
}

#[tokio::test]
async fn incr_from_absent_key() {
    let addr = start_server(Arc::new(Engine::new())).await;
    let mut client = connect(addr).await;
    let first = roundtrip(&mut client, b"*2\r\n$4\r\nINCR\r\n$7\r\ncounter\r\n").await;
    assert_eq!(first, b":1\r\n");
    let second = roundtrip(&mut client, b"*2\r\n$4\r\nINCR\r\n$7\r\ncounter\r\n").await;
    assert_eq!(second, b":2\r\n");
}

#[tokio::test]
async fn multi_exec_runs_queued_commands_in_order() {
    let addr = start_server(Arc::new(Engine::new())).await;
    let mut client = connect(addr).await;
    assert_eq!(roundtrip(&mut client, b"*1\r\n$5\r\nMULTI\r\n").await, b"+OK\r\n");
    assert_eq!(roundtrip(&mut client, b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n").await, b"+QUEUED\r\n");
    assert_eq!(roundtrip(&mut client, b"*2\r\n$4\r\nINCR\r\n$1\r\na\r\n").await, b"+QUEUED\r\n");
    let exec = roundtrip(&mut client, b"*1\r\n$4\r\nEXEC\r\n").await;
    assert_eq!(exec, b"*2\r\n+OK\r\n:2\r\n");
}

#[tokio::test]
async fn exec_without_multi_errors() {
    let addr = start_server(Arc::new(Engine::new())).await;
    let mut client = connect(addr).await;
    let resp = roundtrip(&mut client, b"*1\r\n$4\r\nEXEC\r\n").await;
    assert_eq!(resp, b"-ERR EXEC without MULTI\r\n");
}

#[tokio::test]
async fn nested_multi_errors_but_keeps_queuing() {
    let addr = start_server(Arc::new(Engine::new())).await;
    let mut client = connect(addr).await;
    assert_eq!(roundtrip(&mut client, b"*1\r\n$5\r\nMULTI\r\n").await, b"+OK\r\n");
    let nested = roundtrip(&mut client, b"*1\r\n$5\r\nMULTI\r\n").await;
    assert_eq!(nested, b"-ERR MULTI calls can not be nested\r\n");
    let discard = roundtrip(&mut client, b"*1\r\n$7\r\nDISCARD\r\n").await;
    assert_eq!(discard, b"+OK\r\n");
}

#[tokio::test]
async fn blpop_wakes_on_rpush_from_another_connection() {
    let addr = start_server(Arc::new(Engine::new())).await;
    let mut waiter = connect(addr).await;
    let mut pusher = connect(addr).await;

    waiter.write_all(b"*3\r\n$5\r\nBLPOP\r\n$1\r\nq\r\n$1\r\n0\r\n").await.expect("send BLPOP");
    // give the waiter's task a moment to register before the push races it
    tokio::time::sleep(Duration::from_millis(50)).await;

    let pushed = roundtrip(&mut pusher, b"*3\r\n$5\r\nRPUSH\r\n$1\r\nq\r\n$5\r\nhello\r\n").await;
    assert_eq!(pushed, b":1\r\n");

    let mut buf = vec![0u8; 4096];
    let n = waiter.read(&mut buf).await.expect("read BLPOP reply");
    buf.truncate(n);
    assert_eq!(buf, b"*2\r\n$1\r\nq\r\n$5\r\nhello\r\n");
}

#[tokio::test]
async fn xadd_rejects_regressed_id_then_xrange_returns_entry() {
    let addr = start_server(Arc::new(Engine::new())).await;
    let mut client = connect(addr).await;
    let first = roundtrip(&mut client, b"*5\r\n$4\r\nXADD\r\n$1\r\ns\r\n$3\r\n1-1\r\n$1\r\nk\r\n$1\r\nv\r\n").await;
    assert_eq!(first, b"$3\r\n1-1\r\n");
    let dup = roundtrip(&mut client, b"*5\r\n$4\r\nXADD\r\n$1\r\ns\r\n$3\r\n1-1\r\n$1\r\nk\r\n$1\r\nv\r\n").await;
    assert_eq!(
        dup,
        b"-ERR The ID specified in XADD is equal or smaller than the target stream top item\r\n"
    );
    let range = roundtrip(&mut client, b"*4\r\n$6\r\nXRANGE\r\n$1\r\ns\r\n$1\r\n-\r\n$1\r\n+\r\n").await;
    assert_eq!(range, &b"*1\r\n*2\r\n$3\r\n1-1\r\n*2\r\n$1\r\nk\r\n$1\r\nv\r\n"[..]);
}

#[tokio::test]
async fn replica_receives_exact_propagated_frame_after_psync() {
    let addr = start_server(Arc::new(Engine::new())).await;
    let mut replica = connect(addr).await;

    let ok1 = roundtrip(&mut replica, b"*3\r\n$8\r\nREPLCONF\r\n$14\r\nlistening-port\r\n$4\r\n6380\r\n").await;
    assert_eq!(ok1, b"+OK\r\n");
    let ok2 = roundtrip(&mut replica, b"*3\r\n$8\r\nREPLCONF\r\n$4\r\ncapa\r\n$3\r\neof\r\n").await;
    assert_eq!(ok2, b"+OK\r\n");

    replica.write_all(b"*3\r\n$5\r\nPSYNC\r\n$1\r\n?\r\n$2\r\n-1\r\n").await.expect("send PSYNC");
    let mut handshake_buf = vec![0u8; 4096];
    let n = replica.read(&mut handshake_buf).await.expect("read FULLRESYNC");
    handshake_buf.truncate(n);
    assert!(handshake_buf.starts_with(b"+FULLRESYNC "));

    let mut writer = connect(addr).await;
    let set_reply = roundtrip(&mut writer, b"*3\r\n$3\r\nSET\r\n$1\r\nx\r\n$1\r\ny\r\n").await;
    assert_eq!(set_reply, b"+OK\r\n");

    let mut propagated = vec![0u8; 4096];
    let n2 = replica.read(&mut propagated).await.expect("read propagated frame");
    propagated.truncate(n2);
    assert_eq!(propagated, b"*3\r\n$3\r\nSET\r\n$1\r\nx\r\n$1\r\ny\r\n");
}

#[tokio::test]
async fn command_errors_do_not_propagate_to_replicas() {
    let addr = start_server(Arc::new(Engine::new())).await;
    let mut replica = connect(addr).await;
    roundtrip(&mut replica, b"*3\r\n$8\r\nREPLCONF\r\n$14\r\nlistening-port\r\n$4\r\n6380\r\n").await;
    roundtrip(&mut replica, b"*3\r\n$8\r\nREPLCONF\r\n$4\r\ncapa\r\n$3\r\neof\r\n").await;
    replica.write_all(b"*3\r\n$5\r\nPSYNC\r\n$1\r\n?\r\n$2\r\n-1\r\n").await.expect("send PSYNC");
    let mut handshake_buf = vec![0u8; 4096];
    replica.read(&mut handshake_buf).await.expect("read FULLRESYNC");

    let mut client = connect(addr).await;
    // a list-typed key rejecting INCR must not show up on the replica feed
    roundtrip(&mut client, b"*3\r\n$5\r\nRPUSH\r\n$1\r\nl\r\n$1\r\na\r\n").await;
    let wrongtype = roundtrip(&mut client, b"*2\r\n$4\r\nINCR\r\n$1\r\nl\r\n").await;
    assert_eq!(wrongtype, b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n");

    // the only frame that should show up is the RPUSH; confirm by issuing a real write next and
    // checking it's the first thing to arrive
    let mut expect_rpush = vec![0u8; 4096];
    let n = replica.read(&mut expect_rpush).await.expect("read propagated RPUSH");
    expect_rpush.truncate(n);
    assert_eq!(expect_rpush, b"*3\r\n$5\r\nRPUSH\r\n$1\r\nl\r\n$1\r\na\r\n");
}
