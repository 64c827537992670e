//! The enqueue half of a shared queue.

use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;

use crossbeam_utils::Backoff;

use crate::cancellation::CancellationToken;
use crate::error::{QueueError, Result};
use crate::queue::layout::{slot_size, SlotState, BODY_LENGTH_OFFSET, MESSAGE_HEADER_SIZE};
use crate::queue::span::WrappedSpanMut;
use crate::queue::QueueCore;

/// Appends messages to a shared queue.
///
/// The tail-advance CAS tolerates concurrent publishers, but the queue's
/// recovery model assumes a single active publisher per queue; pair two
/// queues into a [`Channel`](crate::Channel) for duplex traffic instead of
/// sharing one.
pub struct Publisher {
    core: QueueCore,
}

impl Publisher {
    pub(crate) fn new(core: QueueCore) -> Self {
        Self { core }
    }

    /// Appends `message` to the queue.
    ///
    /// Returns `Ok(false)` when the ring lacks room for the message's slot;
    /// the caller may retry after subscribers drain. Never blocks.
    pub fn try_enqueue(&self, message: &[u8]) -> Result<bool> {
        let body_length = checked_body_length(message.len())?;
        let Some(slot_offset) = self.reserve(slot_size(body_length as i64)) else {
            return Ok(false);
        };
        self.core
            .buffer()
            .write(message, slot_offset + MESSAGE_HEADER_SIZE);
        self.commit(slot_offset, body_length, SlotState::ReadyToBeConsumed);
        self.release_signal();
        Ok(true)
    }

    /// Reserves a `reserve`-byte slot and hands its body to `writer` for a
    /// zero-copy fill.
    ///
    /// `writer` must return the number of bytes it wrote: a positive count
    /// equal to `reserve` commits the message, anything else abandons the
    /// already-reserved slot (subscribers reap it silently; the ring bytes
    /// are not reclaimed early). A panic in `writer` abandons the slot
    /// the same way before resuming the panic. Returns `Ok(false)` without
    /// invoking `writer` when the ring lacks room.
    pub fn try_enqueue_reserve<F>(
        &self,
        reserve: usize,
        writer: F,
        cancel: &CancellationToken,
    ) -> Result<bool>
    where
        F: FnOnce(&mut WrappedSpanMut<'_>, &CancellationToken) -> usize,
    {
        let body_length = checked_body_length(reserve)?;
        let Some(slot_offset) = self.reserve(slot_size(body_length as i64)) else {
            return Ok(false);
        };
        let mut span = self
            .core
            .buffer()
            .wrapped_span_mut(slot_offset + MESSAGE_HEADER_SIZE, body_length as i64);

        // Whatever happens inside the writer, the slot already exists: a
        // parseable header must be left behind so subscribers can advance
        // past it.
        match catch_unwind(AssertUnwindSafe(|| writer(&mut span, cancel))) {
            Ok(written) if written == reserve && reserve > 0 => {
                self.commit(slot_offset, body_length, SlotState::ReadyToBeConsumed);
                self.release_signal();
                Ok(true)
            }
            Ok(_) => {
                self.commit(slot_offset, body_length, SlotState::Aborted);
                self.release_signal();
                Ok(false)
            }
            Err(panic) => {
                self.commit(slot_offset, body_length, SlotState::Aborted);
                self.release_signal();
                resume_unwind(panic)
            }
        }
    }

    /// Claims `size` ring bytes by advancing the tail. Returns the slot's
    /// absolute offset, or `None` when the queue is full.
    fn reserve(&self, size: i64) -> Option<i64> {
        let header = self.core.header();
        let backoff = Backoff::new();
        loop {
            let head = header.head_offset.load(Ordering::Acquire);
            let tail = header.tail_offset.load(Ordering::Acquire);
            if size > self.core.body_capacity() - (tail - head) {
                return None;
            }
            match header.tail_offset.compare_exchange_weak(
                tail,
                tail + size,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(tail),
                Err(_) => backoff.spin(),
            }
        }
    }

    /// Publishes the slot header. The body length is plain data made visible
    /// by the release store of the state word.
    fn commit(&self, slot_offset: i64, body_length: i32, state: SlotState) {
        self.core
            .buffer()
            .write_value(&body_length, slot_offset + BODY_LENGTH_OFFSET);
        self.core
            .slot_state(slot_offset)
            .store(state as i32, Ordering::Release);
    }

    /// Wakes one sleeping subscriber. A committed slot whose release fails
    /// leaves other participants silently losing progress, so this is one of
    /// the two fail-fast points.
    fn release_signal(&self) {
        if let Err(err) = self.core.signal().release() {
            log::error!("semaphore release failed after a committed message: {err}");
            std::process::abort();
        }
    }
}

fn checked_body_length(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| {
        QueueError::InvalidArgument(format!("message of {len} bytes exceeds the slot format"))
    })
}
