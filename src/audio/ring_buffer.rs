//! Lock-free single-producer/single-consumer byte ring buffer.
//!
//! The buffer moves raw bytes between exactly one writer thread (the decoder)
//! and exactly one reader thread (the real-time render callback). Positions are
//! monotonic counters that are masked on access, so the number of readable
//! bytes is always `write - read` and positions never move backward.
//!
//! Each side publishes its position with `Release` and observes the other side
//! with `Acquire`, so bytes copied before an advance are visible to the peer
//! once it sees the new position.
//!
//! # Contract
//! - Only one thread may call the writer methods (`write`, `write_vector`,
//!   `advance_write_position`) at a time.
//! - Only one thread may call the reader methods (`read`, `peek`,
//!   `read_vector`, `advance_read_position`) at a time.
//! - `reset` may only be called while neither side is active.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::RingBufferError;

/// Largest capacity accepted by [`RingBuffer::allocate`]
pub const MAX_CAPACITY: usize = 1 << 31;

pub struct RingBuffer {
    buffer: Box<[UnsafeCell<u8>]>,
    capacity: usize,
    mask: usize,
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
}

// Safety: byte storage is only touched through the SPSC protocol above. The
// writer only writes the free region and the reader only reads the readable
// region, and the two never overlap.
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    /// Create an empty, unallocated ring buffer
    pub fn new() -> Self {
        Self {
            buffer: Box::new([]),
            capacity: 0,
            mask: 0,
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
        }
    }

    /// Create and allocate a ring buffer in one step
    pub fn with_capacity(byte_count: usize) -> Result<Self, RingBufferError> {
        let mut ring = Self::new();
        ring.allocate(byte_count)?;
        Ok(ring)
    }

    /// Allocate storage for at least `byte_count` bytes.
    ///
    /// The capacity is rounded up to the next power of two. Requests of 0, 1
    /// or more than 2^31 bytes are rejected. Any previous storage is released
    /// and both positions are reset.
    pub fn allocate(&mut self, byte_count: usize) -> Result<(), RingBufferError> {
        if !(2..=MAX_CAPACITY).contains(&byte_count) {
            return Err(RingBufferError::InvalidCapacity { requested: byte_count });
        }

        let capacity = byte_count.next_power_of_two();

        let mut storage: Vec<UnsafeCell<u8>> = Vec::new();
        storage
            .try_reserve_exact(capacity)
            .map_err(|_| RingBufferError::AllocationFailed { bytes: capacity })?;
        storage.resize_with(capacity, || UnsafeCell::new(0));

        self.buffer = storage.into_boxed_slice();
        self.capacity = capacity;
        self.mask = capacity - 1;
        *self.write_pos.get_mut() = 0;
        *self.read_pos.get_mut() = 0;
        Ok(())
    }

    /// Release the storage. The buffer reports a capacity of zero afterwards.
    pub fn deallocate(&mut self) {
        self.buffer = Box::new([]);
        self.capacity = 0;
        self.mask = 0;
        *self.write_pos.get_mut() = 0;
        *self.read_pos.get_mut() = 0;
    }

    /// Discard all buffered bytes. Neither side may be active.
    pub fn reset(&self) {
        self.write_pos.store(0, Ordering::Release);
        self.read_pos.store(0, Ordering::Release);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_allocated(&self) -> bool {
        self.capacity > 0
    }

    pub fn bytes_available_to_read(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    pub fn bytes_available_to_write(&self) -> usize {
        self.capacity - self.bytes_available_to_read()
    }

    /// Copy as many bytes of `src` as fit. Returns the number written.
    pub fn write(&self, src: &[u8]) -> usize {
        let count = src.len().min(self.bytes_available_to_write());
        if count == 0 {
            return 0;
        }

        let write = self.write_pos.load(Ordering::Relaxed);
        let offset = write & self.mask;
        let first = count.min(self.capacity - offset);

        // Safety: [offset, offset + count) modulo capacity lies in the free
        // region, which the reader does not touch until the position advances.
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.base_ptr().add(offset), first);
            if count > first {
                std::ptr::copy_nonoverlapping(src.as_ptr().add(first), self.base_ptr(), count - first);
            }
        }

        self.write_pos.store(write.wrapping_add(count), Ordering::Release);
        count
    }

    /// Copy up to `dst.len()` bytes out and consume them. Returns the number read.
    pub fn read(&self, dst: &mut [u8]) -> usize {
        let count = self.copy_out(dst);
        if count > 0 {
            let read = self.read_pos.load(Ordering::Relaxed);
            self.read_pos.store(read.wrapping_add(count), Ordering::Release);
        }
        count
    }

    /// Copy up to `dst.len()` bytes out without consuming them
    pub fn peek(&self, dst: &mut [u8]) -> usize {
        self.copy_out(dst)
    }

    /// Borrow the readable region as up to two contiguous spans.
    ///
    /// The second span is empty unless the readable region wraps around the
    /// end of the storage. Commit consumption with `advance_read_position`.
    pub fn read_vector(&self) -> (&[u8], &[u8]) {
        let count = self.bytes_available_to_read();
        if count == 0 {
            return (&[], &[]);
        }

        let offset = self.read_pos.load(Ordering::Relaxed) & self.mask;
        let first = count.min(self.capacity - offset);

        // Safety: the readable region is not written until the reader advances.
        unsafe {
            (
                std::slice::from_raw_parts(self.base_ptr().add(offset), first),
                std::slice::from_raw_parts(self.base_ptr(), count - first),
            )
        }
    }

    /// Borrow the free region as up to two contiguous spans.
    ///
    /// # Safety
    /// The caller must be the only writer, and must not hold the returned
    /// spans across a call to `advance_write_position` or `reset`.
    pub unsafe fn write_vector(&self) -> (&mut [u8], &mut [u8]) {
        let count = self.bytes_available_to_write();
        if count == 0 {
            return (&mut [], &mut []);
        }

        let offset = self.write_pos.load(Ordering::Relaxed) & self.mask;
        let first = count.min(self.capacity - offset);

        (
            std::slice::from_raw_parts_mut(self.base_ptr().add(offset), first),
            std::slice::from_raw_parts_mut(self.base_ptr(), count - first),
        )
    }

    /// Consume `count` readable bytes. Clamped to what is readable.
    pub fn advance_read_position(&self, count: usize) {
        let count = count.min(self.bytes_available_to_read());
        let read = self.read_pos.load(Ordering::Relaxed);
        self.read_pos.store(read.wrapping_add(count), Ordering::Release);
    }

    /// Publish `count` bytes written through `write_vector`. Clamped to the free space.
    pub fn advance_write_position(&self, count: usize) {
        let count = count.min(self.bytes_available_to_write());
        let write = self.write_pos.load(Ordering::Relaxed);
        self.write_pos.store(write.wrapping_add(count), Ordering::Release);
    }

    fn copy_out(&self, dst: &mut [u8]) -> usize {
        let (first, second) = self.read_vector();
        let from_first = first.len().min(dst.len());
        dst[..from_first].copy_from_slice(&first[..from_first]);
        let from_second = second.len().min(dst.len() - from_first);
        dst[from_first..from_first + from_second].copy_from_slice(&second[..from_second]);
        from_first + from_second
    }

    fn base_ptr(&self) -> *mut u8 {
        // UnsafeCell<u8> has the same layout as u8
        self.buffer.as_ptr() as *mut u8
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("readable", &self.bytes_available_to_read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_allocate_rounds_up_to_power_of_two() {
        let ring = RingBuffer::with_capacity(1000).unwrap();
        assert_eq!(ring.capacity(), 1024);

        let ring = RingBuffer::with_capacity(2).unwrap();
        assert_eq!(ring.capacity(), 2);

        let ring = RingBuffer::with_capacity(4096).unwrap();
        assert_eq!(ring.capacity(), 4096);
    }

    #[test]
    fn test_allocate_rejects_invalid_sizes() {
        let mut ring = RingBuffer::new();
        assert_eq!(ring.allocate(0), Err(RingBufferError::InvalidCapacity { requested: 0 }));
        assert_eq!(ring.allocate(1), Err(RingBufferError::InvalidCapacity { requested: 1 }));
        assert_eq!(
            ring.allocate(MAX_CAPACITY + 1),
            Err(RingBufferError::InvalidCapacity { requested: MAX_CAPACITY + 1 })
        );
        assert!(!ring.is_allocated());
    }

    #[test]
    fn test_unallocated_buffer_moves_nothing() {
        let ring = RingBuffer::new();
        assert_eq!(ring.capacity(), 0);
        assert_eq!(ring.write(&[1, 2, 3]), 0);
        let mut out = [0u8; 3];
        assert_eq!(ring.read(&mut out), 0);
    }

    #[test]
    fn test_write_read_round_trip() {
        let ring = RingBuffer::with_capacity(16).unwrap();
        let data: Vec<u8> = (0..10).collect();

        assert_eq!(ring.write(&data), 10);
        assert_eq!(ring.bytes_available_to_read(), 10);

        let mut out = vec![0u8; 10];
        assert_eq!(ring.read(&mut out), 10);
        assert_eq!(out, data);
        assert_eq!(ring.bytes_available_to_read(), 0);
    }

    #[test]
    fn test_capacity_law_holds() {
        let ring = RingBuffer::with_capacity(64).unwrap();
        let mut scratch = [0u8; 64];

        for step in 0..50 {
            let written = ring.write(&scratch[..(step * 7) % 40]);
            assert_eq!(
                ring.bytes_available_to_read() + ring.bytes_available_to_write(),
                ring.capacity()
            );
            ring.read(&mut scratch[..(written + step) % 33]);
            assert_eq!(
                ring.bytes_available_to_read() + ring.bytes_available_to_write(),
                ring.capacity()
            );
        }
    }

    #[test]
    fn test_partial_write_when_full() {
        let ring = RingBuffer::with_capacity(8).unwrap();
        assert_eq!(ring.write(&[7u8; 6]), 6);
        assert_eq!(ring.write(&[9u8; 6]), 2);
        assert_eq!(ring.bytes_available_to_write(), 0);
        assert_eq!(ring.write(&[1u8]), 0);
    }

    #[test]
    fn test_wraparound_preserves_order() {
        let ring = RingBuffer::with_capacity(8).unwrap();
        let mut out = [0u8; 8];

        ring.write(&[1, 2, 3, 4, 5, 6]);
        ring.read(&mut out[..4]);
        ring.write(&[7, 8, 9, 10, 11]);

        let (first, second) = ring.read_vector();
        assert_eq!(first, &[5, 6, 7, 8]);
        assert_eq!(second, &[9, 10, 11]);

        assert_eq!(ring.read(&mut out[..7]), 7);
        assert_eq!(&out[..7], &[5, 6, 7, 8, 9, 10, 11]);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let ring = RingBuffer::with_capacity(8).unwrap();
        ring.write(&[1, 2, 3]);

        let mut out = [0u8; 2];
        assert_eq!(ring.peek(&mut out), 2);
        assert_eq!(out, [1, 2]);
        assert_eq!(ring.bytes_available_to_read(), 3);
    }

    #[test]
    fn test_write_vector_and_advance() {
        let ring = RingBuffer::with_capacity(8).unwrap();
        let mut out = [0u8; 8];
        ring.write(&[0; 5]);
        ring.read(&mut out[..5]);

        let written = unsafe {
            let (first, second) = ring.write_vector();
            assert_eq!(first.len(), 3);
            assert_eq!(second.len(), 5);
            first.copy_from_slice(&[1, 2, 3]);
            second[..2].copy_from_slice(&[4, 5]);
            5
        };
        ring.advance_write_position(written);

        assert_eq!(ring.read(&mut out[..5]), 5);
        assert_eq!(&out[..5], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_advance_is_clamped() {
        let ring = RingBuffer::with_capacity(4).unwrap();
        ring.advance_write_position(100);
        assert_eq!(ring.bytes_available_to_read(), 4);
        ring.advance_read_position(100);
        assert_eq!(ring.bytes_available_to_read(), 0);
    }

    #[test]
    fn test_reset_discards_contents() {
        let ring = RingBuffer::with_capacity(16).unwrap();
        ring.write(&[1; 9]);
        ring.reset();
        assert_eq!(ring.bytes_available_to_read(), 0);
        assert_eq!(ring.bytes_available_to_write(), 16);
    }

    #[test]
    fn test_deallocate() {
        let mut ring = RingBuffer::with_capacity(16).unwrap();
        ring.write(&[1; 4]);
        ring.deallocate();
        assert_eq!(ring.capacity(), 0);
        assert_eq!(ring.bytes_available_to_read(), 0);
    }

    #[test]
    fn test_concurrent_spsc_integrity() {
        const TOTAL: usize = 1 << 20;
        let ring = Arc::new(RingBuffer::with_capacity(4096).unwrap());

        let producer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                let mut next = 0usize;
                let mut chunk = [0u8; 333];
                while next < TOTAL {
                    let len = chunk.len().min(TOTAL - next);
                    for (i, byte) in chunk[..len].iter_mut().enumerate() {
                        *byte = ((next + i) % 251) as u8;
                    }
                    let mut offset = 0;
                    while offset < len {
                        offset += ring.write(&chunk[offset..len]);
                        if offset < len {
                            thread::yield_now();
                        }
                    }
                    next += len;
                }
            })
        };

        let mut received = 0usize;
        let mut out = [0u8; 517];
        while received < TOTAL {
            let count = ring.read(&mut out);
            for (i, byte) in out[..count].iter().enumerate() {
                assert_eq!(*byte, ((received + i) % 251) as u8, "corruption at byte {}", received + i);
            }
            received += count;
            if count == 0 {
                thread::yield_now();
            }
        }

        producer.join().unwrap();
        assert_eq!(ring.bytes_available_to_read(), 0);
    }
}
