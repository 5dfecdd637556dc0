//! Stress demo — flood an echo server with framed messages
//!
//! Opens N connections to a running echo server (`echo serve <port>`),
//! sends M messages on each, and waits for every echo to come back.
//!
//! ```text
//! stress 9000 50 200    # 50 connections x 200 messages
//! ```

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use wiremux::Engine;
use wiremux_core::EngineConfig;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let (port, conns, msgs) = match (
        args.get(1).and_then(|s| s.parse::<u16>().ok()),
        args.get(2).and_then(|s| s.parse::<usize>().ok()),
        args.get(3).and_then(|s| s.parse::<usize>().ok()),
    ) {
        (Some(p), Some(c), Some(m)) => (p, c, m),
        _ => {
            eprintln!("usage: stress <port> <connections> <messages-per-connection>");
            std::process::exit(2);
        }
    };

    println!("=== wiremux stress: {} conns x {} msgs ===", conns, msgs);

    let mut engine = Engine::new(
        EngineConfig::default()
            .queue_capacity(4096)
            .worker_count(4),
    );
    engine.start().expect("engine start failed");

    let echoed = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let payload = vec![0x42u8; 512];

    let start = Instant::now();
    let mut connections = Vec::with_capacity(conns);
    for _ in 0..conns {
        let conn = engine
            .connect(Ipv4Addr::LOCALHOST, port)
            .expect("connect failed");
        let echoed = echoed.clone();
        conn.set_on_message(move |_| {
            echoed.fetch_add(1, Ordering::Relaxed);
        });
        let failed_cb = failed.clone();
        conn.set_on_error(move || {
            failed_cb.fetch_add(1, Ordering::Relaxed);
        });
        conn.register();
        connections.push(conn);
    }

    for conn in &connections {
        for _ in 0..msgs {
            conn.send_message(&payload, None, None).expect("send failed");
        }
    }

    let expected = conns * msgs;
    let deadline = Instant::now() + Duration::from_secs(60);
    while echoed.load(Ordering::Relaxed) < expected {
        if failed.load(Ordering::Relaxed) > 0 {
            eprintln!("{} connection(s) failed", failed.load(Ordering::Relaxed));
            std::process::exit(1);
        }
        if Instant::now() > deadline {
            eprintln!(
                "timed out: {}/{} echoes",
                echoed.load(Ordering::Relaxed),
                expected
            );
            std::process::exit(1);
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    let elapsed = start.elapsed();
    println!(
        "{} messages echoed in {:.2?} ({:.0} msg/s)",
        expected,
        elapsed,
        expected as f64 / elapsed.as_secs_f64()
    );

    engine.shutdown();
}
