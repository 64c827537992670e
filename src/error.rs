use std::io;

use thiserror::Error;

use crate::sys::signal::SignalError;

pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors surfaced by queue operations.
///
/// A full queue and an empty queue are not errors: `try_enqueue` returns
/// `Ok(false)` and `try_dequeue` returns `Ok(None)`. CAS contention is
/// retried internally and never observed by callers.
#[derive(Error, Debug)]
pub enum QueueError {
    /// A bad queue name, capacity, or reservation size.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The caller's token or the participant's own source was cancelled.
    #[error("the operation was cancelled")]
    Cancelled,

    /// The coupling semaphore could not be created, opened, or waited on.
    #[error("semaphore failure: {0}")]
    Signal(#[from] SignalError),

    /// The shared memory region could not be created, opened, or mapped.
    #[error("shared region failure: {0}")]
    Region(#[from] io::Error),
}
