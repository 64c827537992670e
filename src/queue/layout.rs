//! Wire format of the shared queue region.
//!
//! ```text
//! [QueueHeader (16 bytes)]
//! [Slot at body offset 0][Slot at body offset slot_size(..)] ...
//! ```
//!
//! The body ring starts right after the queue header and wraps at
//! `bytes_capacity - QUEUE_HEADER_SIZE`. Integers are native-endian; the
//! layout is intra-host only. Both structs are `#[repr(C)]` so every process
//! mapping the region agrees on field offsets.

use std::mem::size_of;
use std::sync::atomic::{AtomicI32, AtomicI64};

/// Lifecycle of a message slot, stored in [`MessageHeader::state`].
///
/// ```text
/// Vacant -> ReadyToBeConsumed | Aborted      (publisher commit)
/// ReadyToBeConsumed | Aborted -> LockedToBeConsumed   (subscriber CAS)
/// LockedToBeConsumed -> Vacant               (drain + zero + head advance)
/// LockedToBeConsumed -> ReadyToBeConsumed    (reader rollback)
/// ```
#[repr(i32)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SlotState {
    Vacant = 0,
    ReadyToBeConsumed = 1,
    LockedToBeConsumed = 2,
    Aborted = 3,
}

/// Mutable queue state at offset 0 of the region.
///
/// Both offsets are absolute, unbounded counters; the ring position is the
/// offset modulo the body capacity. They only grow, and only under CAS.
#[repr(C)]
pub struct QueueHeader {
    /// Byte offset of the next message to consume.
    pub head_offset: AtomicI64,
    /// Byte offset at which the next message will be placed.
    pub tail_offset: AtomicI64,
}

/// Header at the start of every slot.
///
/// Only `state` is accessed atomically; `body_length` is plain data
/// published by the release store of `state` (and may itself straddle the
/// wrap point, so it goes through the circular buffer).
#[repr(C)]
pub struct MessageHeader {
    /// One of the [`SlotState`] discriminants.
    pub state: AtomicI32,
    pub reserved: i32,
    /// User bytes following the header. Doubles as the slot-size field, so
    /// aborted slots record their reservation here.
    pub body_length: i32,
    pub padding: i32,
}

pub const QUEUE_HEADER_SIZE: i64 = size_of::<QueueHeader>() as i64;
pub const MESSAGE_HEADER_SIZE: i64 = size_of::<MessageHeader>() as i64;

/// Offset of `body_length` within a slot.
pub const BODY_LENGTH_OFFSET: i64 = 8;

/// Rounds up to the next multiple of 8; slots keep the ring 8-byte aligned.
#[inline]
pub const fn align8(n: i64) -> i64 {
    (n + 7) & !7
}

/// Ring bytes occupied by a message with `body_length` body bytes.
#[inline]
pub const fn slot_size(body_length: i64) -> i64 {
    align8(MESSAGE_HEADER_SIZE + body_length)
}
