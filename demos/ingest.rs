// In demos/ingest.rs
//
// Driver: ingests from a running data source until every worker finishes,
// then reports throughput and ingest-to-consume latency.
use ingestion_engine::Structs::Record_Structs::now_millis;
use ingestion_engine::IngestionBuilder;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Usage: ingest [ip:port] [core1,core2,...]
    let args: Vec<String> = env::args().collect();
    let endpoint = args.get(1).map(String::as_str).unwrap_or("127.0.0.1:5555");
    let (ip, port) = endpoint
        .rsplit_once(':')
        .ok_or("endpoint must look like ip:port")?;
    let port: u16 = port.parse()?;
    let cores = match args.get(2) {
        Some(list) => list
            .split(',')
            .map(|c| c.trim().parse::<usize>())
            .collect::<Result<Vec<_>, _>>()?,
        None => vec![0],
    };

    let engine = IngestionBuilder::new()
        .with_endpoint(ip, port)
        .with_affinity_cores(cores)
        .build()?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_for_handler = Arc::clone(&interrupted);

    // Handle Ctrl+C to stop ingestion early
    ctrlc::set_handler(move || {
        interrupted_for_handler.store(true, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    engine.start()?;
    let start = Instant::now();
    let mut received: u64 = 0;
    let mut latency_ms: u64 = 0;

    loop {
        match engine.get_data_timeout(Duration::from_millis(100)) {
            Some(record) => {
                received += 1;
                latency_ms += now_millis().saturating_sub(record.timestamp_ms);
            }
            None => {
                if interrupted.load(Ordering::SeqCst) || engine.active_workers() == 0 {
                    break;
                }
            }
        }
    }

    engine.stop();
    // Workers are joined; pick up anything published before they exited
    while let Some(record) = engine.get_data() {
        received += 1;
        latency_ms += now_millis().saturating_sub(record.timestamp_ms);
    }

    let elapsed = start.elapsed();
    for report in engine.worker_reports() {
        println!("{:?}", report);
    }
    println!("Total Messages Ingested: {}", received);
    println!(
        "Throughput: {:.2} messages/sec",
        received as f64 / elapsed.as_secs_f64()
    );
    if received > 0 {
        println!(
            "Mean ingest-to-consume latency: {:.3} ms",
            latency_ms as f64 / received as f64
        );
    }
    println!("{:#?}", engine.pool());
    Ok(())
}
