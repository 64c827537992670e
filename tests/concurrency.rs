// One publisher, several subscribers, every handle opened independently so
// the queue really runs over shared mappings rather than a shared Rust
// object. Serialized because the soak is memory- and scheduler-heavy.

use serial_test::serial;
use shmq::names::random_name;
use shmq::{CancellationToken, QueueFactory, QueueOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
#[serial]
fn every_message_reaches_exactly_one_subscriber() {
    const SUBSCRIBERS: usize = 4;
    const MESSAGES: u32 = 2_000;

    let opts = QueueOptions::new(random_name(16)).with_bytes_capacity(4096);
    let publisher = QueueFactory::create_publisher(&opts).unwrap();

    // Open all subscriber handles before any traffic; each has its own
    // mapping of the region.
    let subscribers: Vec<_> = (0..SUBSCRIBERS)
        .map(|_| QueueFactory::create_subscriber(&opts).unwrap())
        .collect();

    let received = Arc::new(AtomicUsize::new(0));
    let mut workers = Vec::new();
    for subscriber in subscribers {
        let received = received.clone();
        workers.push(thread::spawn(move || {
            let cancel = CancellationToken::new();
            let mut bodies = Vec::new();
            while received.load(Ordering::Acquire) < MESSAGES as usize {
                match subscriber.try_dequeue(&cancel).unwrap() {
                    Some(body) => {
                        received.fetch_add(1, Ordering::AcqRel);
                        bodies.push(body);
                    }
                    None => thread::yield_now(),
                }
            }
            bodies
        }));
    }

    let producer = thread::spawn(move || {
        for id in 0..MESSAGES {
            let mut body = id.to_le_bytes().to_vec();
            body.extend_from_slice(&[0xAB; 12]);
            while !publisher.try_enqueue(&body).unwrap() {
                thread::yield_now();
            }
        }
    });
    producer.join().unwrap();

    let mut ids = Vec::new();
    for worker in workers {
        for body in worker.join().unwrap() {
            assert_eq!(body.len(), 16);
            assert_eq!(&body[4..], &[0xAB; 12]);
            ids.push(u32::from_le_bytes(body[..4].try_into().unwrap()));
        }
    }

    // Exactly-once delivery: the union of all subscribers' messages is the
    // full id range with no duplicates.
    ids.sort_unstable();
    assert_eq!(ids.len(), MESSAGES as usize);
    for (expected, id) in ids.into_iter().enumerate() {
        assert_eq!(id, expected as u32);
    }
}

#[test]
#[serial]
fn blocking_subscribers_drain_a_bursty_publisher() {
    const MESSAGES: u32 = 500;

    let opts = QueueOptions::new(random_name(16)).with_bytes_capacity(2048);
    let publisher = QueueFactory::create_publisher(&opts).unwrap();
    let subscriber = QueueFactory::create_subscriber(&opts).unwrap();

    let consumer = thread::spawn(move || {
        let cancel = CancellationToken::new();
        let mut total = 0u64;
        for _ in 0..MESSAGES {
            let body = subscriber.dequeue(&cancel).unwrap();
            total += u64::from(u32::from_le_bytes(body[..4].try_into().unwrap()));
        }
        total
    });

    for id in 0..MESSAGES {
        while !publisher.try_enqueue(&id.to_le_bytes()).unwrap() {
            thread::yield_now();
        }
        if id % 64 == 0 {
            // Let the consumer fall asleep occasionally so the semaphore
            // wake-up path is exercised, not just the spin path.
            thread::sleep(std::time::Duration::from_millis(2));
        }
    }

    let expected: u64 = (0..u64::from(MESSAGES)).sum();
    assert_eq!(consumer.join().unwrap(), expected);
}

#[test]
#[serial]
fn competing_subscribers_never_duplicate_an_in_place_read() {
    const MESSAGES: u32 = 300;

    let opts = QueueOptions::new(random_name(16)).with_bytes_capacity(1024);
    let publisher = QueueFactory::create_publisher(&opts).unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    let mut workers = Vec::new();
    for _ in 0..3 {
        let subscriber = QueueFactory::create_subscriber(&opts).unwrap();
        let seen = seen.clone();
        workers.push(thread::spawn(move || {
            let cancel = CancellationToken::new();
            let mut got = 0usize;
            while seen.load(Ordering::Acquire) < MESSAGES as usize {
                let consumed = subscriber
                    .try_dequeue_in_place(|span| span.len() == 4, &cancel)
                    .unwrap();
                if consumed {
                    seen.fetch_add(1, Ordering::AcqRel);
                    got += 1;
                } else {
                    thread::yield_now();
                }
            }
            got
        }));
    }

    for id in 0..MESSAGES {
        while !publisher.try_enqueue(&id.to_le_bytes()).unwrap() {
            thread::yield_now();
        }
    }

    let total: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
    assert_eq!(total, MESSAGES as usize);
}
