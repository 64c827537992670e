// Named semaphore behavior. Every test uses a freshly generated name, so
// they are independent despite the kernel-global namespace.

use shmq::names::random_name;
use shmq::{Signal, SignalError};
use std::time::{Duration, Instant};

#[test]
fn poll_is_false_until_released() {
    let name = random_name(16);
    let signal = Signal::create_or_open(&name, 0).unwrap();

    assert!(!signal.wait(Some(Duration::ZERO)).unwrap());
    signal.release().unwrap();
    assert!(signal.wait(Some(Duration::ZERO)).unwrap());
    assert!(!signal.wait(Some(Duration::ZERO)).unwrap());
}

#[test]
fn initial_count_is_honored() {
    let name = random_name(16);
    let signal = Signal::create_or_open(&name, 2).unwrap();

    assert!(signal.wait(Some(Duration::ZERO)).unwrap());
    assert!(signal.wait(Some(Duration::ZERO)).unwrap());
    assert!(!signal.wait(Some(Duration::ZERO)).unwrap());
}

#[test]
fn timed_wait_expires_close_to_the_timeout() {
    let name = random_name(16);
    let signal = Signal::create_or_open(&name, 0).unwrap();

    let start = Instant::now();
    assert!(!signal.wait(Some(Duration::from_millis(50))).unwrap());
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(40), "woke after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "woke after {elapsed:?}");
}

#[test]
fn second_open_shares_the_count() {
    let name = random_name(16);
    let creator = Signal::create_or_open(&name, 0).unwrap();
    let opener = Signal::create_or_open(&name, 0).unwrap();

    creator.release().unwrap();
    assert!(opener.wait(Some(Duration::from_millis(500))).unwrap());
    drop(opener);
}

#[test]
fn release_wakes_a_blocked_waiter() {
    let name = random_name(16);
    let signal = std::sync::Arc::new(Signal::create_or_open(&name, 0).unwrap());

    let waiter = {
        let signal = signal.clone();
        std::thread::spawn(move || signal.wait(Some(Duration::from_secs(5))).unwrap())
    };
    std::thread::sleep(Duration::from_millis(20));
    signal.release().unwrap();
    assert!(waiter.join().unwrap());
}

#[test]
fn excessive_initial_count_is_rejected() {
    let name = random_name(16);
    match Signal::create_or_open(&name, 40_000) {
        Err(SignalError::InitialCountTooLarge(40_000)) => {}
        Err(other) => panic!("expected InitialCountTooLarge, got {other}"),
        Ok(_) => panic!("expected InitialCountTooLarge, got a semaphore"),
    }
}

#[cfg(unix)]
#[test]
fn unlink_of_a_missing_name_reports_not_found() {
    match Signal::unlink(&random_name(16)) {
        Err(SignalError::NotFound) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
}
