// In demos/publisher.rs
use shmq::{QueueFactory, QueueOptions};
use std::env;

fn main() -> shmq::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <queue_name> <message_count> [bytes_capacity]", args[0]);
        eprintln!("  bytes_capacity: optional region size in bytes (default: 65536)");
        std::process::exit(1);
    }

    let queue_name = &args[1];
    let message_count: usize = args[2].parse().expect("Invalid message count");
    let bytes_capacity: i64 = args
        .get(3)
        .and_then(|s| s.parse().ok())
        .unwrap_or(64 * 1024);

    println!("Publisher: opening queue '{queue_name}' ({bytes_capacity} bytes)");
    let publisher = QueueFactory::create_publisher(
        &QueueOptions::new(queue_name.clone()).with_bytes_capacity(bytes_capacity),
    )?;

    let start = std::time::Instant::now();
    for i in 0..message_count {
        let body = format!("message_{i}");
        while !publisher.try_enqueue(body.as_bytes())? {
            std::thread::yield_now();
        }
        if (i + 1) % 10_000 == 0 {
            println!("Publisher: sent {} messages", i + 1);
        }
    }

    let elapsed = start.elapsed();
    println!(
        "Publisher: sent {message_count} messages in {elapsed:?} ({:.0} msg/s)",
        message_count as f64 / elapsed.as_secs_f64()
    );
    Ok(())
}
