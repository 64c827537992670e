//! The dequeue half of a shared queue.

use std::sync::atomic::Ordering;
use std::time::Duration;

use crossbeam_utils::Backoff;

use crate::cancellation::CancellationToken;
use crate::error::{QueueError, Result};
use crate::queue::layout::{slot_size, SlotState, BODY_LENGTH_OFFSET, MESSAGE_HEADER_SIZE};
use crate::queue::span::WrappedSpan;
use crate::queue::QueueCore;
use crate::sys::signal::SignalError;

/// First timed semaphore wait after the spin phase gives up.
const INITIAL_SIGNAL_WAIT: Duration = Duration::from_millis(1);

/// Longest single sleep; bounds wake-up latency for cancellation.
const MAX_SIGNAL_WAIT: Duration = Duration::from_millis(10);

/// Consumes messages from a shared queue.
///
/// Any number of subscribers (threads or processes) may drain one queue;
/// each message goes to exactly one of them. Dropping the subscriber fires
/// its internal cancellation source.
pub struct Subscriber {
    core: QueueCore,
    local_cancel: CancellationToken,
}

impl Subscriber {
    pub(crate) fn new(core: QueueCore) -> Self {
        Self {
            core,
            local_cancel: CancellationToken::new(),
        }
    }

    /// Removes the next message, copying its body into a fresh buffer.
    /// `Ok(None)` when the queue is empty or the head slot is contended.
    pub fn try_dequeue(&self, cancel: &CancellationToken) -> Result<Option<Vec<u8>>> {
        self.check_cancelled(cancel)?;
        Ok(self.dequeue_once(|span| Some(span.to_vec())))
    }

    /// Like [`Subscriber::try_dequeue`], but copies into `dest`, truncating
    /// to its length. Returns the number of bytes copied.
    pub fn try_dequeue_into(
        &self,
        dest: &mut [u8],
        cancel: &CancellationToken,
    ) -> Result<Option<usize>> {
        self.check_cancelled(cancel)?;
        Ok(self.dequeue_once(|span| Some(copy_truncated(span, dest))))
    }

    /// Removes the next message, blocking until one arrives.
    pub fn dequeue(&self, cancel: &CancellationToken) -> Result<Vec<u8>> {
        self.dequeue_blocking(cancel, |span| Some(span.to_vec()))
    }

    /// Blocking variant of [`Subscriber::try_dequeue_into`].
    pub fn dequeue_into(&self, dest: &mut [u8], cancel: &CancellationToken) -> Result<usize> {
        self.dequeue_blocking(cancel, |span| Some(copy_truncated(span, dest)))
    }

    /// Exposes the next message's body in place. `reader` returns `true` to
    /// consume the message or `false` to leave it at the head for another
    /// attempt. `Ok(false)` when the queue is empty or `reader` rolled back.
    pub fn try_dequeue_in_place<F>(&self, reader: F, cancel: &CancellationToken) -> Result<bool>
    where
        F: FnOnce(&WrappedSpan<'_>) -> bool,
    {
        self.check_cancelled(cancel)?;
        let mut reader = Some(reader);
        let consumed = self.dequeue_once(|span| {
            let reader = reader.take().expect("reader invoked twice");
            if reader(span) {
                Some(())
            } else {
                None
            }
        });
        Ok(consumed.is_some())
    }

    /// Blocking variant of [`Subscriber::try_dequeue_in_place`]; a rollback
    /// re-offers the same message on the next attempt.
    pub fn dequeue_in_place<F>(&self, mut reader: F, cancel: &CancellationToken) -> Result<()>
    where
        F: FnMut(&WrappedSpan<'_>) -> bool,
    {
        self.dequeue_blocking(cancel, |span| if reader(span) { Some(()) } else { None })
    }

    /// One pass of the dequeue protocol.
    ///
    /// `consume` receives the locked slot's body and decides: `Some(output)`
    /// consumes the slot, `None` rolls it back. Aborted slots are reaped
    /// without consulting `consume` and the pass moves on to the next slot.
    fn dequeue_once<T, F>(&self, consume: F) -> Option<T>
    where
        F: FnOnce(&WrappedSpan<'_>) -> Option<T>,
    {
        let header = self.core.header();
        let mut consume = Some(consume);
        loop {
            let head = header.head_offset.load(Ordering::Acquire);
            let tail = header.tail_offset.load(Ordering::Acquire);
            if head == tail {
                return None;
            }

            let state = self.core.slot_state(head);
            let observed = state.load(Ordering::Acquire);
            if observed != SlotState::ReadyToBeConsumed as i32
                && observed != SlotState::Aborted as i32
            {
                // Not yet committed, or another subscriber holds the lock.
                return None;
            }
            if state
                .compare_exchange(
                    observed,
                    SlotState::LockedToBeConsumed as i32,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_err()
            {
                // Another subscriber won the slot.
                return None;
            }

            // The lock is ours; make sure the head did not move while we
            // were taking it.
            if header.head_offset.load(Ordering::Acquire) != head {
                state.store(observed, Ordering::Release);
                return None;
            }

            let body_length: i32 = self.core.buffer().read_value(head + BODY_LENGTH_OFFSET);
            let size = slot_size(body_length as i64);

            let output = if observed == SlotState::Aborted as i32 {
                // Abandoned by the publisher; the body is garbage.
                None
            } else {
                let span = self
                    .core
                    .buffer()
                    .wrapped_span(head + MESSAGE_HEADER_SIZE, body_length as i64);
                let consume = consume.take().expect("consume invoked twice");
                match consume(&span) {
                    Some(output) => Some(output),
                    None => {
                        state.store(observed, Ordering::Release);
                        return None;
                    }
                }
            };

            // Zero everything but the state word, clear the state, then
            // advance the head past the slot.
            self.core.buffer().clear(head + 4, size - 4);
            state.store(SlotState::Vacant as i32, Ordering::Release);
            if header
                .head_offset
                .compare_exchange(head, head + size, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                // Another participant advanced the head past a slot we held
                // locked; the shared state can no longer be trusted.
                log::error!("head advance failed while holding the slot lock");
                std::process::abort();
            }

            match output {
                Some(output) => return Some(output),
                None => continue, // reaped an aborted slot; look at the next
            }
        }
    }

    /// Drives [`Subscriber::dequeue_once`] until it yields, backing off from
    /// a spin to timed semaphore waits growing 1 ms to 10 ms.
    fn dequeue_blocking<T, F>(&self, cancel: &CancellationToken, mut consume: F) -> Result<T>
    where
        F: FnMut(&WrappedSpan<'_>) -> Option<T>,
    {
        let backoff = Backoff::new();
        let mut wait = INITIAL_SIGNAL_WAIT;
        loop {
            self.check_cancelled(cancel)?;
            if let Some(output) = self.dequeue_once(|span| consume(span)) {
                return Ok(output);
            }
            if backoff.is_completed() {
                self.check_cancelled(cancel)?;
                match self.core.signal().wait(Some(wait)) {
                    Ok(_) => {}
                    // A signal delivery woke us early; the cancellation poll
                    // above decides whether that matters.
                    Err(SignalError::Interrupted) => {}
                    Err(err) => return Err(err.into()),
                }
                wait = (wait * 2).min(MAX_SIGNAL_WAIT);
            } else {
                backoff.snooze();
            }
        }
    }

    fn check_cancelled(&self, cancel: &CancellationToken) -> Result<()> {
        if self.local_cancel.is_cancelled() || cancel.is_cancelled() {
            return Err(QueueError::Cancelled);
        }
        Ok(())
    }

    /// The subscriber's own cancellation source; fired on drop. Handy for
    /// unblocking a `dequeue` parked on another thread.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.local_cancel
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.local_cancel.cancel();
    }
}

fn copy_truncated(span: &WrappedSpan<'_>, dest: &mut [u8]) -> usize {
    let len = span.len().min(dest.len());
    span.slice_len(0, len).try_read(&mut dest[..len]);
    len
}
