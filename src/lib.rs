//! A single-producer, multi-consumer inter-process message queue over named
//! shared memory.
//!
//! Multiple OS processes mapping the same named region observe one FIFO of
//! variable-length byte messages. A publisher reserves ring space with a CAS
//! on the shared tail offset, writes the body, commits the slot header, and
//! releases a named semaphore; subscribers lock the head slot with a CAS on
//! its state word, drain it, and advance the head. The semaphore is a wake-up
//! hint only — all ordering comes from atomics inside the region.
//!
//! The design assumes one active publisher per queue. Multiple subscribers
//! may consume concurrently, each message going to exactly one of them.

// The shared layout stores 64-bit offsets; a 32-bit process mapping the same
// region could not update them atomically.
#[cfg(target_pointer_width = "32")]
compile_error!("shmq requires a 64-bit target");

pub mod cancellation;
pub mod error;
pub mod names;
pub mod queue;
pub mod sys;

pub use cancellation::CancellationToken;
pub use error::{QueueError, Result};
pub use queue::buffer::CircularBuffer;
pub use queue::channel::Channel;
pub use queue::factory::QueueFactory;
pub use queue::options::QueueOptions;
pub use queue::publisher::Publisher;
pub use queue::span::{WrappedSpan, WrappedSpanMut};
pub use queue::subscriber::Subscriber;
pub use sys::signal::{Signal, SignalError};
