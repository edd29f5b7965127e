// Lock-free record pool: an arena of fixed-size segments plus a tagged free list

use crate::Structs::Record;
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};
use std::sync::atomic::{AtomicIsize, AtomicPtr, AtomicU32, AtomicU64, AtomicUsize};
use std::sync::Arc;

/// Number of slots added each time the free list runs dry.
pub const DEFAULT_GROWTH_BATCH: usize = 10_000;

/// Largest accepted growth batch.
pub const MAX_GROWTH_BATCH: usize = 1 << 24;

/// Index value marking the end of the free list.
const NIL: u32 = u32::MAX;

/// Segment pointers held by the first directory bucket; bucket `b` holds
/// `DIR_BASE << b`.
const DIR_BASE: usize = 64;

/// Enough buckets to address every segment of a pool with `batch == 1`.
const DIR_BUCKETS: usize = 27;

#[inline]
fn pack(tag: u32, index: u32) -> u64 {
    ((tag as u64) << 32) | index as u64
}

#[inline]
fn unpack(word: u64) -> (u32, u32) {
    ((word >> 32) as u32, word as u32)
}

/// Map a segment number to its directory bucket and the offset inside it.
#[inline]
fn locate(segment: usize) -> (usize, usize) {
    let biased = segment + DIR_BASE;
    let bucket = (biased.ilog2() - DIR_BASE.ilog2()) as usize;
    (bucket, biased - (DIR_BASE << bucket))
}

/// A single slot in a pool segment.
///
/// `next` is only meaningful while the slot sits on the free list. It is
/// atomic because a popping thread may read it after another thread already
/// took the slot; the generation tag on the head rejects such stale reads.
struct Slot {
    record: UnsafeCell<Record>,
    next: AtomicU32,
}

pub(crate) struct PoolShared {
    /// Free-list head: generation tag in the high half, slot index in the low half.
    head: CachePadded<AtomicU64>,
    /// Segment directory in doubling buckets. Buckets and their entries are
    /// written once, under `grow_lock`, and freed only when the pool drops.
    directory: [AtomicPtr<AtomicPtr<Slot>>; DIR_BUCKETS],
    segment_count: AtomicUsize,
    /// Segments that fit in the `u32` index space, `NIL` excluded.
    max_segments: usize,
    batch: usize,
    /// Signed: a pop may land before the matching push bumps the count.
    free: CachePadded<AtomicIsize>,
    grow_lock: Mutex<()>,
}

// Slots are handed out to exactly one `PooledRecord` at a time.
unsafe impl Send for PoolShared {}
unsafe impl Sync for PoolShared {}

impl PoolShared {
    fn new(batch: usize) -> Self {
        let batch = batch.clamp(1, MAX_GROWTH_BATCH);
        Self {
            head: CachePadded::new(AtomicU64::new(pack(0, NIL))),
            directory: std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
            segment_count: AtomicUsize::new(0),
            max_segments: (NIL as usize) / batch,
            batch,
            free: CachePadded::new(AtomicIsize::new(0)),
            grow_lock: Mutex::new(()),
        }
    }

    #[inline]
    fn slot(&self, index: u32) -> &Slot {
        let index = index as usize;
        let (bucket, offset) = locate(index / self.batch);
        let entries = self.directory[bucket].load(Acquire);
        debug_assert!(!entries.is_null());
        // Safety: an index only circulates after its bucket and segment were
        // published, and both outlive every handle holding an `Arc<PoolShared>`.
        unsafe {
            let base = (*entries.add(offset)).load(Acquire);
            debug_assert!(!base.is_null());
            &*base.add(index % self.batch)
        }
    }

    fn pop(&self) -> Option<u32> {
        let mut head = self.head.load(Acquire);
        loop {
            let (tag, index) = unpack(head);
            if index == NIL {
                return None;
            }
            // May be stale if another thread popped `index` meanwhile; the tag
            // bump on every successful CAS makes the exchange below fail then.
            let next = self.slot(index).next.load(Relaxed);
            match self.head.compare_exchange_weak(
                head,
                pack(tag.wrapping_add(1), next),
                AcqRel,
                Acquire,
            ) {
                Ok(_) => {
                    self.free.fetch_sub(1, Relaxed);
                    return Some(index);
                }
                Err(current) => head = current,
            }
        }
    }

    /// Push the chain `first ..= last` (already linked through `next`).
    fn push_chain(&self, first: u32, last: u32, len: usize) {
        let mut head = self.head.load(Relaxed);
        loop {
            let (tag, index) = unpack(head);
            self.slot(last).next.store(index, Relaxed);
            match self.head.compare_exchange_weak(
                head,
                pack(tag.wrapping_add(1), first),
                Release,
                Relaxed,
            ) {
                Ok(_) => {
                    self.free.fetch_add(len as isize, Relaxed);
                    return;
                }
                Err(current) => head = current,
            }
        }
    }

    #[inline]
    fn push(&self, index: u32) {
        self.push_chain(index, index, 1);
    }

    /// Add one segment to the arena unless another thread already refilled
    /// the free list while we waited for the lock.
    fn grow(&self) {
        let _guard = self.grow_lock.lock();
        if unpack(self.head.load(Acquire)).1 != NIL {
            return;
        }

        let seg = self.segment_count.load(Relaxed);
        if seg >= self.max_segments {
            panic!(
                "record pool exhausted: {} more slots would exceed the u32 index space ({} slots in use)",
                self.batch,
                seg * self.batch
            );
        }

        let (bucket, offset) = locate(seg);
        let mut entries = self.directory[bucket].load(Acquire);
        if entries.is_null() {
            let fresh: Box<[AtomicPtr<Slot>]> = (0..DIR_BASE << bucket)
                .map(|_| AtomicPtr::new(ptr::null_mut()))
                .collect();
            entries = Box::into_raw(fresh) as *mut AtomicPtr<Slot>;
            self.directory[bucket].store(entries, Release);
        }

        let base = (seg * self.batch) as u32;
        let slots: Box<[Slot]> = (0..self.batch)
            .map(|i| Slot {
                record: UnsafeCell::new(Record::default()),
                next: AtomicU32::new(base + i as u32 + 1),
            })
            .collect();
        let raw = Box::into_raw(slots) as *mut Slot;

        // Safety: `offset` is within the bucket, which lives until drop.
        unsafe { (*entries.add(offset)).store(raw, Release) };
        self.segment_count.store(seg + 1, Release);
        tracing::debug!(segment = seg, slots = self.batch, "record pool grew");

        self.push_chain(base, base + self.batch as u32 - 1, self.batch);
    }

    fn acquire_index(&self) -> u32 {
        loop {
            if let Some(index) = self.pop() {
                return index;
            }
            self.grow();
        }
    }
}

impl Drop for PoolShared {
    fn drop(&mut self) {
        let count = *self.segment_count.get_mut();
        for seg in 0..count {
            let (bucket, offset) = locate(seg);
            let entries = *self.directory[bucket].get_mut();
            // Safety: every segment below `count` was published in its bucket,
            // and came from `Box::<[Slot]>::into_raw` with `batch` elements.
            unsafe {
                let raw = (*entries.add(offset)).load(Relaxed);
                drop(Box::from_raw(ptr::slice_from_raw_parts_mut(raw, self.batch)));
            }
        }
        for (bucket, entry) in self.directory.iter_mut().enumerate() {
            let entries = *entry.get_mut();
            if !entries.is_null() {
                // Safety: allocated in `grow` as a boxed slice of `DIR_BASE << bucket`.
                unsafe {
                    drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
                        entries,
                        DIR_BASE << bucket,
                    )));
                }
            }
        }
    }
}

/// A lock-free pool of reusable [`Record`] slots.
///
/// `acquire` pops the free list and grows the arena by one segment when the
/// list is empty, so it never fails. Cloning a `RecordPool` yields another
/// handle to the same pool.
#[derive(Clone)]
pub struct RecordPool {
    pub(crate) shared: Arc<PoolShared>,
}

impl Default for RecordPool {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordPool {
    /// Create a pool pre-filled with [`DEFAULT_GROWTH_BATCH`] slots.
    pub fn new() -> Self {
        Self::with_batch_size(DEFAULT_GROWTH_BATCH)
    }

    /// Create a pool that grows `batch` slots at a time, pre-filled with one batch.
    pub fn with_batch_size(batch: usize) -> Self {
        let shared = PoolShared::new(batch);
        shared.grow();
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Take a slot from the pool. Its previous contents are left in place;
    /// the caller is expected to overwrite every field (see [`Record::fill`]).
    pub fn acquire(&self) -> PooledRecord {
        PooledRecord {
            index: self.shared.acquire_index(),
            pool: Arc::clone(&self.shared),
        }
    }

    /// Return a slot to the pool. Equivalent to dropping the handle.
    pub fn release(&self, record: PooledRecord) {
        drop(record);
    }

    /// Total number of slots allocated so far.
    pub fn capacity(&self) -> usize {
        self.shared.segment_count.load(Acquire) * self.shared.batch
    }

    /// Approximate number of slots on the free list.
    pub fn available(&self) -> usize {
        self.shared.free.load(Relaxed).max(0) as usize
    }

    /// Approximate number of slots held by live handles.
    pub fn in_use(&self) -> usize {
        self.capacity().saturating_sub(self.available())
    }

    /// Number of slots added per growth step.
    pub fn batch_size(&self) -> usize {
        self.shared.batch
    }

    /// Number of segments allocated so far.
    pub fn segments(&self) -> usize {
        self.shared.segment_count.load(Acquire)
    }
}

impl fmt::Debug for RecordPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_record_pool(self, f)
    }
}

/// Exclusive handle to a pooled [`Record`].
///
/// Dropping the handle puts the slot back on its pool's free list. The handle
/// keeps the pool's storage alive, so it may outlive every `RecordPool`.
pub struct PooledRecord {
    pool: Arc<PoolShared>,
    index: u32,
}

impl PooledRecord {
    /// Position of the slot inside its pool.
    pub fn slot_index(&self) -> u32 {
        self.index
    }
}

impl Deref for PooledRecord {
    type Target = Record;

    #[inline]
    fn deref(&self) -> &Record {
        // Safety: this handle is the only owner of the slot until dropped.
        unsafe { &*self.pool.slot(self.index).record.get() }
    }
}

impl DerefMut for PooledRecord {
    #[inline]
    fn deref_mut(&mut self) -> &mut Record {
        // Safety: as above, and `&mut self` rules out other borrows.
        unsafe { &mut *self.pool.slot(self.index).record.get() }
    }
}

impl Drop for PooledRecord {
    fn drop(&mut self) {
        self.pool.push(self.index);
    }
}

impl fmt::Debug for PooledRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledRecord")
            .field("slot", &self.index)
            .field("record", &**self)
            .finish()
    }
}
