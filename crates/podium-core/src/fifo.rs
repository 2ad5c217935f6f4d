//! Lock-free single-producer single-consumer FIFO of variable-length
//! byte records.
//!
//! Records are framed with a 4-byte length header and always stored
//! contiguously: a record that would straddle the end of the buffer is
//! preceded by a zero-length pad header (or a bare tail skip when fewer
//! than four bytes remain), and the reader performs the matching skip.
//! Positions are monotonic counters; the storage index is the position
//! modulo capacity.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const HEADER_SIZE: usize = 4;

#[repr(align(64))]
struct Cursor {
    pos: AtomicU64,
}

impl Cursor {
    fn new() -> Self {
        Self {
            pos: AtomicU64::new(0),
        }
    }
}

struct Shared {
    storage: Box<[UnsafeCell<u8>]>,
    capacity: u64,
    write: Cursor,
    read: Cursor,
}

// The producer and consumer touch disjoint regions of `storage`: the
// producer only writes between the read and write positions it observed,
// and the consumer only reads below a write position published with
// release ordering.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

impl Shared {
    #[inline]
    unsafe fn region_mut(&self, start: usize, len: usize) -> &mut [u8] {
        let base = self.storage.as_ptr() as *mut u8;
        std::slice::from_raw_parts_mut(base.add(start), len)
    }

    #[inline]
    unsafe fn region(&self, start: usize, len: usize) -> &[u8] {
        let base = self.storage.as_ptr() as *const u8;
        std::slice::from_raw_parts(base.add(start), len)
    }
}

/// Create a FIFO with a fixed backing store of `capacity` bytes and
/// return its two halves. Neither half can be cloned, so the
/// single-producer single-consumer contract holds by construction.
pub fn byte_fifo(capacity: usize) -> (ByteFifoProducer, ByteFifoConsumer) {
    assert!(capacity > HEADER_SIZE, "fifo capacity must exceed the record header");

    let storage = (0..capacity).map(|_| UnsafeCell::new(0)).collect();
    let shared = Arc::new(Shared {
        storage,
        capacity: capacity as u64,
        write: Cursor::new(),
        read: Cursor::new(),
    });

    (
        ByteFifoProducer {
            shared: Arc::clone(&shared),
        },
        ByteFifoConsumer { shared },
    )
}

/// Producer half: push variable-length records without blocking or
/// allocating.
pub struct ByteFifoProducer {
    shared: Arc<Shared>,
}

impl ByteFifoProducer {
    /// Reserve `size` payload bytes plus the header, fill them via
    /// `writer`, and publish the record. Returns `false` when the record
    /// is empty or there is not enough free space; the record is dropped
    /// and nothing is written.
    pub fn push(&mut self, size: usize, writer: impl FnOnce(&mut [u8])) -> bool {
        if size == 0 {
            return false;
        }

        let cap = self.shared.capacity;
        let needed = (HEADER_SIZE + size) as u64;

        let write = self.shared.write.pos.load(Ordering::Relaxed);
        let read = self.shared.read.pos.load(Ordering::Acquire);
        let free = cap - (write - read);

        let index = (write % cap) as usize;
        let room_to_end = cap as usize - index;

        // Pad to the start of the buffer when the record would wrap.
        let (pad, start) = if room_to_end < HEADER_SIZE + size {
            (room_to_end as u64, 0)
        } else {
            (0, index)
        };

        if pad + needed > free {
            return false;
        }

        unsafe {
            if pad != 0 && room_to_end >= HEADER_SIZE {
                self.shared
                    .region_mut(index, HEADER_SIZE)
                    .copy_from_slice(&0u32.to_ne_bytes());
            }

            self.shared
                .region_mut(start, HEADER_SIZE)
                .copy_from_slice(&(size as u32).to_ne_bytes());
            writer(self.shared.region_mut(start + HEADER_SIZE, size));
        }

        self.shared
            .write
            .pos
            .store(write + pad + needed, Ordering::Release);
        true
    }
}

/// Consumer half: drain records in FIFO order.
pub struct ByteFifoConsumer {
    shared: Arc<Shared>,
}

impl ByteFifoConsumer {
    /// Invoke `reader` once per record that was published before this
    /// call, in push order. Space is handed back to the producer record
    /// by record.
    pub fn drain(&mut self, mut reader: impl FnMut(&[u8])) {
        let cap = self.shared.capacity;
        let write = self.shared.write.pos.load(Ordering::Acquire);
        let mut read = self.shared.read.pos.load(Ordering::Relaxed);

        while read < write {
            let index = (read % cap) as usize;
            let room_to_end = cap as usize - index;

            if room_to_end < HEADER_SIZE {
                read += room_to_end as u64;
                self.shared.read.pos.store(read, Ordering::Release);
                continue;
            }

            let mut header = [0u8; HEADER_SIZE];
            header.copy_from_slice(unsafe { self.shared.region(index, HEADER_SIZE) });
            let size = u32::from_ne_bytes(header) as usize;

            if size == 0 {
                // Pad marker: the record continues at the buffer start.
                read += room_to_end as u64;
                self.shared.read.pos.store(read, Ordering::Release);
                continue;
            }

            reader(unsafe { self.shared.region(index + HEADER_SIZE, size) });

            read += (HEADER_SIZE + size) as u64;
            self.shared.read.pos.store(read, Ordering::Release);
        }
    }
}
