// In demos/mock_server.rs
//
// Test traffic source: accepts one connection, sends `num_messages` frames
// spaced `interval_us` apart, then the stop sentinel, and closes.
use ingestion_engine::Core::affinity;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::env;
use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        eprintln!(
            "Usage: {} <port> <num_messages> <interval_us> [stop_message] [cpu_core]",
            args[0]
        );
        std::process::exit(1);
    }

    let port: u16 = args[1].parse().expect("Invalid port");
    let num_messages: usize = args[2].parse().expect("Invalid number of messages");
    let interval_us: u64 = args[3].parse().expect("Invalid interval");
    let stop_message = args.get(4).cloned().unwrap_or_else(|| "STOP".to_string());

    if let Some(core) = args.get(5).map(|c| c.parse::<usize>().expect("Invalid CPU core")) {
        match affinity::pin_current_thread(core) {
            Ok(()) => tracing::info!(core, "mock server pinned"),
            Err(e) => tracing::warn!(core, error = %e, "failed to pin mock server"),
        }
    }

    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let listener = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    listener.set_reuse_address(true)?;
    listener.set_reuse_port(true)?;
    listener.bind(&SockAddr::from(addr))?;
    listener.listen(3)?;
    tracing::info!(port, "mock server listening");

    let (conn, peer) = listener.accept()?;
    tracing::info!(peer = ?peer.as_socket(), "mock server accepted a connection");
    conn.set_nodelay(true)?;
    if let Err(e) = conn.set_send_buffer_size(8 * 1024 * 1024) {
        tracing::warn!(error = %e, "failed to set SO_SNDBUF");
    }
    let mut stream: TcpStream = conn.into();

    let start = Instant::now();
    let mut sent = 0;
    for i in 0..num_messages {
        let msg = format!("Benchmark Message {}\n", i);
        if let Err(e) = stream.write_all(msg.as_bytes()) {
            tracing::error!(message = i, error = %e, "failed to send message");
            break;
        }
        sent += 1;
        if interval_us > 0 {
            std::thread::sleep(Duration::from_micros(interval_us));
        }
    }

    stream.write_all(format!("{}\n", stop_message).as_bytes())?;
    stream.flush()?;

    let elapsed = start.elapsed();
    println!("Mock server: Sent {} messages in {:.2?}", sent, elapsed);
    println!("Mock server: sent stop message and is closing connection");
    Ok(())
}
