//! End-to-end throughput benchmark for Parley.
//!
//! Connects real WebSocket clients to a running server, has each of them
//! blast global chat messages, and counts the `chat_message` broadcasts
//! received.

use futures_util::{SinkExt, StreamExt};
use parley_protocol::{codec, ClientEvent, ClientFrame, Version, PROTOCOL_VERSION};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:3001/ws";
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let num_clients = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(16);
    let url = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║         Parley End-to-End Throughput Benchmark               ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Make sure the server is running: cargo run --release        ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    run_chat_benchmark(num_clients, Arc::new(url)).await;
}

async fn run_chat_benchmark(num_clients: usize, url: Arc<String>) {
    println!("📊 Global chat benchmark: {} clients against {}", num_clients, url);
    println!("   Warmup: {}s, Measurement: {}s", WARMUP_SECS, BENCH_SECS);
    println!();

    let message_count = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(num_clients + 1));

    let mut handles = Vec::new();

    for client_id in 0..num_clients {
        let msg_count = Arc::clone(&message_count);
        let barrier = Arc::clone(&barrier);
        let url = Arc::clone(&url);

        let handle = tokio::spawn(async move {
            if let Err(e) = run_client(client_id, &url, msg_count, barrier).await {
                eprintln!("Client {} error: {}", client_id, e);
            }
        });
        handles.push(handle);
    }

    // Wait for all clients to connect and register
    barrier.wait().await;
    println!("✓ All {} clients connected", num_clients);

    println!("⏳ Warming up for {}s...", WARMUP_SECS);
    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;

    message_count.store(0, Ordering::SeqCst);
    let start = Instant::now();

    println!("📈 Measuring for {}s...", BENCH_SECS);
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;

    let elapsed = start.elapsed();
    let total_messages = message_count.load(Ordering::SeqCst);

    let msgs_per_sec = total_messages as f64 / elapsed.as_secs_f64();
    let msgs_per_sec_per_client = msgs_per_sec / num_clients as f64;

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                         RESULTS                              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!(
        "║  Clients:              {:>10}                           ║",
        num_clients
    );
    println!(
        "║  Duration:             {:>10.2}s                          ║",
        elapsed.as_secs_f64()
    );
    println!(
        "║  Broadcasts received:  {:>10}                           ║",
        total_messages
    );
    println!(
        "║  Throughput:           {:>10.0} msg/s                    ║",
        msgs_per_sec
    );
    println!(
        "║  Per-Client:           {:>10.0} msg/s                    ║",
        msgs_per_sec_per_client
    );
    println!("╚══════════════════════════════════════════════════════════════╝");

    for handle in handles {
        handle.abort();
    }
}

/// Event name and data of a server text frame.
fn parse_event(text: &str) -> Option<(String, serde_json::Value)> {
    let mut value: serde_json::Value = serde_json::from_str(text).ok()?;
    let event = value.get("event")?.as_str()?.to_string();
    let data = value.get_mut("data").map(serde_json::Value::take);
    Some((event, data.unwrap_or_default()))
}

async fn run_client(
    client_id: usize,
    url: &str,
    message_count: Arc<AtomicU64>,
    barrier: Arc<Barrier>,
) -> Result<(), BoxError> {
    let (ws, _) = connect_async(url).await?;
    let (mut sender, mut receiver) = ws.split();

    // The server greets every connection with `connected`
    if let Some(Ok(Message::Text(text))) = receiver.next().await {
        if let Some((event, data)) = parse_event(&text) {
            let version: Option<Version> = data
                .get("version")
                .and_then(|v| v.as_str())
                .and_then(|v| v.parse().ok());
            match version {
                Some(v) if event == "connected" && v.is_compatible_with(&PROTOCOL_VERSION) => {}
                _ => return Err(format!("unexpected handshake: {text}").into()),
            }
        }
    }

    let register = ClientFrame::new(ClientEvent::Register(format!("bench-{client_id}")));
    sender
        .send(Message::Text(codec::encode_text(&register)?))
        .await?;

    barrier.wait().await;

    let chat = ClientFrame::new(ClientEvent::ChatMessage("x".repeat(64)));
    let chat_msg = Message::Text(codec::encode_text(&chat)?);

    // Separate receiver task for full-duplex operation
    let recv_count = Arc::clone(&message_count);
    let recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            if let Ok(Message::Text(text)) = result {
                if matches!(parse_event(&text), Some((event, _)) if event == "chat_message") {
                    recv_count.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    });

    loop {
        if sender.send(chat_msg.clone()).await.is_err() {
            break;
        }
        // Small yield to not starve the receiver task
        tokio::task::yield_now().await;
    }

    recv_task.abort();
    Ok(())
}
