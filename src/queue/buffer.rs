//! Wrap-aware view over the body region of a shared queue.

use std::mem::size_of;
use std::ptr;

use super::span::{WrappedSpan, WrappedSpanMut};

/// Pointer-arithmetic view over a contiguous byte region interpreted as a
/// ring. Offsets are absolute monotone counters reduced modulo the capacity
/// on entry, so callers pass queue offsets directly.
///
/// All unsafe pointer work over the shared region is confined to this type;
/// [`CircularBuffer::get_pointer`] is the one escape hatch, used for atomic
/// access to header fields.
pub struct CircularBuffer {
    base: *mut u8,
    capacity: i64,
}

unsafe impl Send for CircularBuffer {}
unsafe impl Sync for CircularBuffer {}

impl CircularBuffer {
    /// Creates a view over an existing memory region.
    ///
    /// # Safety
    /// `base` must point to at least `capacity` writable bytes that stay
    /// mapped for the lifetime of the buffer.
    pub unsafe fn new(base: *mut u8, capacity: i64) -> Self {
        debug_assert!(capacity > 0);
        Self { base, capacity }
    }

    #[inline]
    pub fn capacity(&self) -> i64 {
        self.capacity
    }

    #[inline]
    fn position(&self, offset: i64) -> i64 {
        offset.rem_euclid(self.capacity)
    }

    /// Raw pointer at `offset mod capacity`.
    ///
    /// The pointee is shared with other processes; the caller must go through
    /// atomics for any field that concurrent participants mutate.
    #[inline]
    pub fn get_pointer(&self, offset: i64) -> *mut u8 {
        unsafe { self.base.add(self.position(offset) as usize) }
    }

    /// Copies `length` bytes starting at `offset` into a fresh vec.
    pub fn read(&self, offset: i64, length: i64) -> Vec<u8> {
        let mut out = vec![0u8; length.max(0) as usize];
        self.read_into(offset, length, &mut out);
        out
    }

    /// Copies up to `length` bytes into `dest`, truncating to `dest.len()`.
    /// Returns the number of bytes copied.
    pub fn read_into(&self, offset: i64, length: i64, dest: &mut [u8]) -> usize {
        let len = (length.max(0) as usize).min(dest.len());
        if len == 0 {
            return 0;
        }
        let pos = self.position(offset);
        let right = ((self.capacity - pos) as usize).min(len);
        unsafe {
            ptr::copy_nonoverlapping(self.base.add(pos as usize), dest.as_mut_ptr(), right);
            if right < len {
                ptr::copy_nonoverlapping(self.base, dest.as_mut_ptr().add(right), len - right);
            }
        }
        len
    }

    /// Writes `source` at `offset`, splitting at the wrap point if needed.
    pub fn write(&self, source: &[u8], offset: i64) {
        if source.is_empty() {
            return;
        }
        assert!(
            source.len() as i64 <= self.capacity,
            "write of {} bytes exceeds buffer capacity {}",
            source.len(),
            self.capacity
        );
        let pos = self.position(offset);
        let right = ((self.capacity - pos) as usize).min(source.len());
        unsafe {
            ptr::copy_nonoverlapping(source.as_ptr(), self.base.add(pos as usize), right);
            if right < source.len() {
                ptr::copy_nonoverlapping(source.as_ptr().add(right), self.base, source.len() - right);
            }
        }
    }

    /// Writes the raw bytes of a plain-old-data value at `offset`.
    pub fn write_value<T: Copy>(&self, value: &T, offset: i64) {
        let bytes =
            unsafe { std::slice::from_raw_parts(value as *const T as *const u8, size_of::<T>()) };
        self.write(bytes, offset);
    }

    /// Reads a plain-old-data value from `offset`.
    pub fn read_value<T: Copy + Default>(&self, offset: i64) -> T {
        let mut value = T::default();
        let dest = unsafe {
            std::slice::from_raw_parts_mut(&mut value as *mut T as *mut u8, size_of::<T>())
        };
        self.read_into(offset, size_of::<T>() as i64, dest);
        value
    }

    /// Zeroes `length` bytes starting at `offset`, with wrap.
    pub fn clear(&self, offset: i64, length: i64) {
        if length <= 0 {
            return;
        }
        assert!(
            length <= self.capacity,
            "clear of {length} bytes exceeds buffer capacity {}",
            self.capacity
        );
        let pos = self.position(offset);
        let right = (self.capacity - pos).min(length);
        unsafe {
            ptr::write_bytes(self.base.add(pos as usize), 0, right as usize);
            if right < length {
                ptr::write_bytes(self.base, 0, (length - right) as usize);
            }
        }
    }

    fn segments(&self, offset: i64, length: i64) -> (*mut u8, usize, usize) {
        assert!(
            (0..=self.capacity).contains(&length),
            "span of {length} bytes exceeds buffer capacity {}",
            self.capacity
        );
        let pos = self.position(offset);
        let right = ((self.capacity - pos) as usize).min(length as usize);
        (
            unsafe { self.base.add(pos as usize) },
            right,
            length as usize - right,
        )
    }

    /// Two contiguous spans covering `[offset, offset + length)`; the second
    /// is empty when the range does not wrap.
    pub fn wrapped_span(&self, offset: i64, length: i64) -> WrappedSpan<'_> {
        let (ptr, right, left) = self.segments(offset, length);
        unsafe {
            WrappedSpan::new(
                std::slice::from_raw_parts(ptr, right),
                std::slice::from_raw_parts(self.base, left),
            )
        }
    }

    /// Mutable counterpart of [`CircularBuffer::wrapped_span`], for slot
    /// bodies owned exclusively by the caller.
    pub fn wrapped_span_mut(&self, offset: i64, length: i64) -> WrappedSpanMut<'_> {
        let (ptr, right, left) = self.segments(offset, length);
        unsafe {
            WrappedSpanMut::new(
                std::slice::from_raw_parts_mut(ptr, right),
                std::slice::from_raw_parts_mut(self.base, left),
            )
        }
    }
}
