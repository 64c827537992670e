pub mod buffer;
pub mod channel;
pub mod factory;
pub mod layout;
pub mod options;
pub mod publisher;
pub mod span;
pub mod subscriber;

use std::sync::atomic::AtomicI32;

use crate::error::Result;
use crate::queue::buffer::CircularBuffer;
use crate::queue::layout::{QueueHeader, QUEUE_HEADER_SIZE};
use crate::queue::options::QueueOptions;
use crate::sys::shared_region::SharedRegion;
use crate::sys::signal::Signal;

/// Semaphore tag for the publisher/subscriber coupling signal.
const SIGNAL_TAG: &str = "C";

/// One participant's attachment to a queue: the mapped region, a ring view
/// over its body, and the coupling semaphore.
pub(crate) struct QueueCore {
    region: SharedRegion,
    signal: Signal,
    buffer: CircularBuffer,
}

impl QueueCore {
    pub(crate) fn open(options: &QueueOptions) -> Result<Self> {
        options.validate()?;
        let region = SharedRegion::create_or_open(
            options.queue_name(),
            options.path(),
            options.bytes_capacity(),
        )?;
        let signal =
            Signal::create_or_open(&format!("{SIGNAL_TAG}{}", options.queue_name()), 0)?;
        let buffer = unsafe {
            CircularBuffer::new(
                region.as_ptr().add(QUEUE_HEADER_SIZE as usize),
                options.bytes_capacity() - QUEUE_HEADER_SIZE,
            )
        };
        Ok(Self {
            region,
            signal,
            buffer,
        })
    }

    /// The queue header at offset 0 of the region. Address stable for the
    /// lifetime of the mapping.
    #[inline]
    pub(crate) fn header(&self) -> &QueueHeader {
        unsafe { &*(self.region.as_ptr() as *const QueueHeader) }
    }

    #[inline]
    pub(crate) fn buffer(&self) -> &CircularBuffer {
        &self.buffer
    }

    #[inline]
    pub(crate) fn signal(&self) -> &Signal {
        &self.signal
    }

    #[inline]
    pub(crate) fn body_capacity(&self) -> i64 {
        self.buffer.capacity()
    }

    /// The state word of the slot at `offset`. Slot starts are 8-aligned and
    /// the state is the first field, so the word never straddles the wrap.
    #[inline]
    pub(crate) fn slot_state(&self, offset: i64) -> &AtomicI32 {
        unsafe { &*(self.buffer.get_pointer(offset) as *const AtomicI32) }
    }
}
