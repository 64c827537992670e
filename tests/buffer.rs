// CircularBuffer and WrappedSpan unit tests over a locally allocated backing.

use shmq::CircularBuffer;
use std::alloc::{alloc_zeroed, dealloc, Layout};

fn make_backing(capacity: usize) -> (*mut u8, Layout) {
    let layout = Layout::from_size_align(capacity, 8).unwrap();
    let ptr = unsafe { alloc_zeroed(layout) };
    assert!(!ptr.is_null(), "failed to allocate backing");
    (ptr, layout)
}

fn with_buffer(capacity: usize, run: impl FnOnce(&CircularBuffer)) {
    let (ptr, layout) = make_backing(capacity);
    let buffer = unsafe { CircularBuffer::new(ptr, capacity as i64) };
    run(&buffer);
    unsafe { dealloc(ptr, layout) };
}

#[test]
fn write_then_read_without_wrap() {
    with_buffer(64, |buffer| {
        buffer.write(&[1, 2, 3, 4], 10);
        assert_eq!(buffer.read(10, 4), vec![1, 2, 3, 4]);
    });
}

#[test]
fn write_and_read_split_at_the_wrap_point() {
    with_buffer(16, |buffer| {
        // 6 bytes starting 3 from the end: 3 on the right, 3 on the left.
        buffer.write(&[10, 20, 30, 40, 50, 60], 13);
        assert_eq!(buffer.read(13, 6), vec![10, 20, 30, 40, 50, 60]);
        // The left half landed at the physical start of the buffer.
        assert_eq!(buffer.read(0, 3), vec![40, 50, 60]);
    });
}

#[test]
fn absolute_offsets_reduce_modulo_capacity() {
    with_buffer(32, |buffer| {
        buffer.write(&[7, 8, 9], 32 * 5 + 4);
        assert_eq!(buffer.read(4, 3), vec![7, 8, 9]);
    });
}

#[test]
fn read_of_zero_length_is_empty() {
    with_buffer(16, |buffer| {
        assert!(buffer.read(3, 0).is_empty());
    });
}

#[test]
fn read_into_truncates_to_destination() {
    with_buffer(32, |buffer| {
        buffer.write(&[100, 110, 120], 0);
        let mut dest = [0u8; 2];
        assert_eq!(buffer.read_into(0, 3, &mut dest), 2);
        assert_eq!(dest, [100, 110]);
    });
}

#[test]
fn clear_zeroes_across_the_wrap_point() {
    with_buffer(16, |buffer| {
        buffer.write(&[0xFF; 16], 0);
        buffer.clear(12, 8);
        assert_eq!(buffer.read(12, 8), vec![0; 8]);
        assert_eq!(buffer.read(4, 8), vec![0xFF; 8]);
    });
}

#[test]
fn value_roundtrip_across_the_wrap_point() {
    with_buffer(16, |buffer| {
        let value: i32 = 0x1234_5678;
        // The 4-byte value straddles the wrap: 2 bytes right, 2 bytes left.
        buffer.write_value(&value, 14);
        assert_eq!(buffer.read_value::<i32>(14), value);
    });
}

#[test]
fn get_pointer_wraps() {
    with_buffer(16, |buffer| {
        assert_eq!(buffer.get_pointer(0), buffer.get_pointer(16));
        assert_eq!(buffer.get_pointer(3), buffer.get_pointer(19));
    });
}

#[test]
fn wrapped_span_is_contiguous_without_wrap() {
    with_buffer(16, |buffer| {
        buffer.write(&[1, 2, 3, 4], 4);
        let span = buffer.wrapped_span(4, 4);
        assert_eq!(span.len(), 4);
        assert_eq!(span.first(), &[1, 2, 3, 4]);
        assert!(span.second().is_empty());
    });
}

#[test]
fn wrapped_span_splits_and_indexes() {
    with_buffer(16, |buffer| {
        buffer.write(&[1, 2, 3, 4, 5, 6], 13);
        let span = buffer.wrapped_span(13, 6);
        assert_eq!(span.first().len(), 3);
        assert_eq!(span.second().len(), 3);
        assert_eq!(span[0], 1);
        assert_eq!(span[3], 4);
        assert_eq!(span[5], 6);
        assert_eq!(span.to_vec(), vec![1, 2, 3, 4, 5, 6]);
    });
}

#[test]
fn wrapped_span_slicing_crosses_the_split() {
    with_buffer(16, |buffer| {
        buffer.write(&[1, 2, 3, 4, 5, 6], 13);
        let span = buffer.wrapped_span(13, 6);
        assert_eq!(span.slice(2).to_vec(), vec![3, 4, 5, 6]);
        assert_eq!(span.slice_len(2, 3).to_vec(), vec![3, 4, 5]);
        assert_eq!(span.slice_len(4, 2).to_vec(), vec![5, 6]);
    });
}

#[test]
fn span_try_read_refuses_oversized_destinations() {
    with_buffer(16, |buffer| {
        buffer.write(&[9, 8, 7], 0);
        let span = buffer.wrapped_span(0, 3);
        let mut exact = [0u8; 3];
        assert!(span.try_read(&mut exact));
        assert_eq!(exact, [9, 8, 7]);
        let mut oversized = [0u8; 4];
        assert!(!span.try_read(&mut oversized));
    });
}

#[test]
fn span_try_write_fills_across_the_split() {
    with_buffer(16, |buffer| {
        let mut span = buffer.wrapped_span_mut(13, 6);
        assert!(span.try_write(&[1, 2, 3, 4, 5, 6]));
        assert!(!span.try_write(&[0u8; 7]));
        drop(span);
        assert_eq!(buffer.read(13, 6), vec![1, 2, 3, 4, 5, 6]);
    });
}
