//! End-to-end exercise of `Client` against a minimal fake RESP server on loopback, standing in
//! for the Docker-backed harness this crate keeps out of scope (§1). The fake
//! server only understands enough of RESP2 to answer `PING`, `SET`, `GET` and `INCR`, which is
//! all `Client::ping`/`pipeline` need to prove the pool -> connection -> router path works.

use pyrsedis_core::config::Config;
use pyrsedis_core::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

async fn spawn_fake_server() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let store: Arc<Mutex<HashMap<String, String>>> = Arc::new(Mutex::new(HashMap::new()));

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let store = store.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    let n = match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    buf.extend_from_slice(&chunk[..n]);
                    while let Some((args, consumed)) = try_parse_frame(&buf) {
                        let reply = handle(&args, &store);
                        if socket.write_all(&reply).await.is_err() {
                            return;
                        }
                        buf.drain(..consumed);
                    }
                }
            });
        }
    });

    addr
}

/// Parses one `*N\r\n$len\r\n<bytes>\r\n...` request frame. Good enough for the commands this
/// test issues; not a general RESP parser (that's `pyrsedis_core::resp::Codec`'s job).
fn try_parse_frame(buf: &[u8]) -> Option<(Vec<String>, usize)> {
    let text = std::str::from_utf8(buf).ok()?;
    let mut lines = text.split("\r\n");
    let header = lines.next()?;
    let count: usize = header.strip_prefix('*')?.parse().ok()?;
    let mut args = Vec::with_capacity(count);
    let mut consumed = header.len() + 2;
    for _ in 0..count {
        let len_line = lines.next()?;
        let len: usize = len_line.strip_prefix('$')?.parse().ok()?;
        consumed += len_line.len() + 2;
        let value = lines.next()?;
        if value.len() != len {
            return None;
        }
        consumed += len + 2;
        args.push(value.to_string());
    }
    Some((args, consumed))
}

fn handle(args: &[String], store: &Arc<Mutex<HashMap<String, String>>>) -> Vec<u8> {
    let name = args[0].to_ascii_uppercase();
    match name.as_str() {
        "PING" => b"+PONG\r\n".to_vec(),
        "SET" => {
            store.lock().unwrap().insert(args[1].clone(), args[2].clone());
            b"+OK\r\n".to_vec()
        }
        "GET" => match store.lock().unwrap().get(&args[1]) {
            Some(v) => format!("${}\r\n{}\r\n", v.len(), v).into_bytes(),
            None => b"$-1\r\n".to_vec(),
        },
        "INCR" => {
            let mut guard = store.lock().unwrap();
            let entry = guard.entry(args[1].clone()).or_insert_with(|| "0".to_string());
            let next: i64 = entry.parse().unwrap_or(0) + 1;
            *entry = next.to_string();
            format!(":{next}\r\n").into_bytes()
        }
        "UNKNOWNCMD" => b"-ERR unknown command 'UNKNOWNCMD'\r\n".to_vec(),
        other => format!("-ERR unsupported test command '{other}'\r\n").into_bytes(),
    }
}

fn test_config(addr: std::net::SocketAddr) -> Config {
    Config {
        host: addr.ip().to_string(),
        port: addr.port(),
        decode_responses: true,
        ..Config::default()
    }
}

#[tokio::test]
async fn ping_round_trips_against_a_real_socket() {
    let addr = spawn_fake_server().await;
    let client = Client::new(test_config(addr));
    let ran_ping = tokio::task::spawn_blocking(move || client.ping()).await.unwrap();
    assert!(ran_ping.unwrap());
}

#[tokio::test]
async fn pipeline_preserves_order_and_types() {
    let addr = spawn_fake_server().await;
    let client = Client::new(test_config(addr));
    let results = tokio::task::spawn_blocking(move || {
        let mut pipeline = client.pipeline();
        pipeline
            .command(&["SET", "a", "1"])
            .command(&["SET", "b", "2"])
            .command(&["GET", "a"])
            .command(&["INCR", "a"]);
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(pipeline.execute())
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(results.len(), 4);
    assert_eq!(results[0].as_ref().unwrap().as_str(), Some("OK"));
    assert_eq!(results[1].as_ref().unwrap().as_str(), Some("OK"));
    assert_eq!(results[2].as_ref().unwrap().as_str(), Some("1"));
    assert_eq!(results[3].as_ref().unwrap().as_integer(), Some(2));
}

#[tokio::test]
async fn unknown_command_error_is_classified_without_breaking_the_connection() {
    let addr = spawn_fake_server().await;
    let client = Client::new(test_config(addr));
    let outcome = tokio::task::spawn_blocking(move || {
        let first = client.execute_command::<&str>("UNKNOWNCMD", &[]);
        let second = client.ping();
        (first, second)
    })
    .await
    .unwrap();

    assert!(outcome.0.is_err());
    assert!(outcome.1.unwrap(), "a server error reply must not mark the connection broken");
}

#[tokio::test]
async fn idle_connection_returns_to_the_pool_after_use() {
    let addr = spawn_fake_server().await;
    let client = Client::new(test_config(addr));
    assert_eq!(client.pool_idle_count(), 0);
    let client2 = client.clone();
    tokio::task::spawn_blocking(move || client2.ping()).await.unwrap().unwrap();
    assert_eq!(client.pool_idle_count(), 1);
}
