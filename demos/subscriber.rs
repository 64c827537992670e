use shmq::{CancellationToken, QueueFactory, QueueOptions};
use std::env;

fn main() -> shmq::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!(
            "Usage: {} <queue_name> [message_count] [bytes_capacity]",
            args[0]
        );
        eprintln!("  message_count: exit after this many messages (default: run forever)");
        std::process::exit(1);
    }

    let queue_name = &args[1];
    let message_count: Option<usize> = args.get(2).and_then(|s| s.parse().ok());
    let bytes_capacity: i64 = args
        .get(3)
        .and_then(|s| s.parse().ok())
        .unwrap_or(64 * 1024);

    println!("Subscriber: opening queue '{queue_name}'");
    let subscriber = QueueFactory::create_subscriber(
        &QueueOptions::new(queue_name.clone()).with_bytes_capacity(bytes_capacity),
    )?;

    let cancel = CancellationToken::new();
    let mut received = 0usize;
    loop {
        let body = subscriber.dequeue(&cancel)?;
        received += 1;
        if received % 10_000 == 0 {
            println!("Subscriber: received {received} messages");
        } else if message_count.is_none() {
            println!("Received: {}", String::from_utf8_lossy(&body));
        }
        if Some(received) == message_count {
            break;
        }
    }

    println!("Subscriber: done after {received} messages");
    Ok(())
}
