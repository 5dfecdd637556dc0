//! Echo demo — a framed echo server and a one-shot client
//!
//! Server: every message that arrives on a connection is sent straight
//! back on the same connection.
//!
//! ```text
//! echo serve 9000
//! echo send 9000 "hello over the wire"
//! ```
//!
//! # Environment Variables
//!
//! - `WMX_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `WMX_FLUSH=1` - Flush log output immediately

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use wiremux::{Engine, MessageConn};
use wiremux_core::{wm_info, EngineConfig};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("serve") => serve(parse_port(&args, 2)),
        Some("send") => {
            let msg = args.get(3).cloned().unwrap_or_else(|| "ping".to_string());
            send(parse_port(&args, 2), &msg);
        }
        _ => {
            eprintln!("usage: echo serve <port> | echo send <port> [message]");
            std::process::exit(2);
        }
    }
}

fn parse_port(args: &[String], idx: usize) -> u16 {
    args.get(idx)
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| {
            eprintln!("usage: echo serve <port> | echo send <port> [message]");
            std::process::exit(2);
        })
}

fn serve(port: u16) {
    println!("=== wiremux echo server ===");

    let mut engine = Engine::new(EngineConfig::default());
    engine.start().expect("engine start failed");

    let served = Arc::new(AtomicUsize::new(0));
    let registry = engine.registry().clone();
    let counter = served.clone();
    engine
        .listen(port, move |channel| {
            wm_info!("connection fd={}", channel.fd());
            let conn = MessageConn::new(channel, registry.clone());
            let echo = conn.clone();
            let counter = counter.clone();
            conn.set_on_message(move |payload| {
                counter.fetch_add(1, Ordering::Relaxed);
                let _ = echo.send_message(payload, None, None);
            });
            let fd = conn.channel().fd();
            conn.set_on_error(move || wm_info!("connection fd={} closed", fd));
            conn.register();
        })
        .expect("listen failed");

    println!("listening on port {}", port);
    loop {
        std::thread::sleep(Duration::from_secs(10));
        wm_info!("served {} messages so far", served.load(Ordering::Relaxed));
    }
}

fn send(port: u16, message: &str) {
    let mut engine = Engine::new(EngineConfig::default().worker_count(1));
    engine.start().expect("engine start failed");

    let conn = engine
        .connect(Ipv4Addr::LOCALHOST, port)
        .expect("connect failed");

    let got = Arc::new(AtomicUsize::new(0));
    let g = got.clone();
    conn.set_on_message(move |payload| {
        println!("{}", String::from_utf8_lossy(payload));
        g.fetch_add(1, Ordering::SeqCst);
    });
    conn.set_on_error(|| {
        eprintln!("connection failed");
        std::process::exit(1);
    });
    conn.register();

    conn.send_message(message.as_bytes(), None, None)
        .expect("send failed");

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while got.load(Ordering::SeqCst) == 0 {
        if std::time::Instant::now() > deadline {
            eprintln!("no reply within 5s");
            std::process::exit(1);
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    engine.shutdown();
}
