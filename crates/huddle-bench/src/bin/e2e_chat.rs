//! End-to-end chat load client for Huddle.
//!
//! Connects N clients to a running server, seats them in a handful of rooms,
//! and counts delivered chat messages while every client talks.

use futures_util::{SinkExt, StreamExt};
use huddle_protocol::{codec, ClientEvent, ServerEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const SERVER_URL: &str = "ws://127.0.0.1:3001/ws";
const ROOMS: usize = 4;
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;

type ClientResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let num_clients = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(16);
    let url = args.get(2).cloned().unwrap_or_else(|| SERVER_URL.to_string());

    println!("Huddle end-to-end chat benchmark");
    println!("  server:  {}", url);
    println!("  clients: {} across {} rooms", num_clients, ROOMS);
    println!();

    let delivered = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(num_clients + 1));
    let mut handles = Vec::new();

    for client_id in 0..num_clients {
        let delivered = Arc::clone(&delivered);
        let barrier = Arc::clone(&barrier);
        let url = url.clone();

        handles.push(tokio::spawn(async move {
            if let Err(e) = run_client(client_id, &url, delivered, barrier).await {
                eprintln!("Client {} error: {}", client_id, e);
            }
        }));
    }

    barrier.wait().await;
    println!("All {} clients seated, warming up for {}s", num_clients, WARMUP_SECS);
    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;

    delivered.store(0, Ordering::SeqCst);
    let start = Instant::now();
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;

    let elapsed = start.elapsed().as_secs_f64();
    let total = delivered.load(Ordering::SeqCst);

    println!();
    println!("  duration:   {:>10.2}s", elapsed);
    println!("  delivered:  {:>10}", total);
    println!("  throughput: {:>10.0} msg/s", total as f64 / elapsed);
    println!(
        "  per client: {:>10.0} msg/s",
        total as f64 / elapsed / num_clients.max(1) as f64
    );

    for handle in handles {
        handle.abort();
    }
}

async fn run_client(
    client_id: usize,
    url: &str,
    delivered: Arc<AtomicU64>,
    barrier: Arc<Barrier>,
) -> ClientResult {
    let (ws, _) = connect_async(url).await?;
    let (mut sender, mut receiver) = ws.split();

    let name = format!("bench-{client_id}");
    let room = format!("room-{}", client_id % ROOMS);
    let enter = codec::encode_json(&ClientEvent::enter_room(name.clone(), room))?;
    sender.send(Message::Text(enter)).await?;

    // The room list is the last event of a join.
    while let Some(msg) = receiver.next().await {
        if let Message::Text(text) = msg? {
            if let Ok(ServerEvent::RoomsList { .. }) = codec::decode_json::<ServerEvent>(&text) {
                break;
            }
        }
    }

    barrier.wait().await;

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(ServerEvent::Message(_)) = codec::decode_json::<ServerEvent>(&text) {
                    delivered.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    });

    let chat = Message::Text(codec::encode_json(&ClientEvent::message(name, "hello"))?);
    loop {
        if sender.send(chat.clone()).await.is_err() {
            break;
        }
        tokio::task::yield_now().await;
    }

    recv_task.abort();
    Ok(())
}
