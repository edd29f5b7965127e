// Unbounded lock-free MPSC queue (linked list with a permanent dummy head)

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use std::fmt;
use std::ptr;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};
use std::sync::atomic::{AtomicPtr, AtomicUsize};

struct Node<T> {
    value: Option<T>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn boxed(value: Option<T>) -> *mut Self {
        Box::into_raw(Box::new(Node {
            value,
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

/// A multi-producer, single-consumer FIFO queue.
///
/// ### Concurrency Design:
/// - **Producers**: `enqueue` swaps the new node in as `tail`, then links the
///   previous tail to it. Between the two steps the node is the tail but not
///   yet reachable; `dequeue` reports that window as empty.
/// - **Consumer**: `dequeue` advances `head` past the dummy node, takes the
///   value out of the new head (which becomes the next dummy) and frees the old
///   one. A producer never touches a node again after linking it, and the
///   dummy is only freed once its `next` is set, so no node is freed while a
///   producer can still reach it.
///
/// Producers are lock-free. The consumer side sits behind an uncontended
/// mutex so `dequeue` stays sound if it is ever called from two threads.
pub struct MpscQueue<T> {
    tail: CachePadded<AtomicPtr<Node<T>>>,
    head: CachePadded<Mutex<*mut Node<T>>>,
    len: CachePadded<AtomicUsize>,
}

unsafe impl<T: Send> Send for MpscQueue<T> {}
unsafe impl<T: Send> Sync for MpscQueue<T> {}

impl<T> Default for MpscQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MpscQueue<T> {
    pub fn new() -> Self {
        let dummy = Node::boxed(None);
        Self {
            tail: CachePadded::new(AtomicPtr::new(dummy)),
            head: CachePadded::new(Mutex::new(dummy)),
            len: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Publish the already linked chain `first ..= last`.
    #[inline]
    fn link(&self, first: *mut Node<T>, last: *mut Node<T>, count: usize) {
        // Counted before publication so `len` can never underflow.
        self.len.fetch_add(count, Relaxed);
        let prev = self.tail.swap(last, AcqRel);
        // Safety: `prev` stays allocated until its `next` is non-null, which
        // only this store makes true.
        unsafe { (*prev).next.store(first, Release) };
    }

    /// Append one value. Never fails.
    pub fn enqueue(&self, value: T) {
        let node = Node::boxed(Some(value));
        self.link(node, node, 1);
    }

    /// Append every value of `values` as one contiguous run: no other
    /// producer's items can land between them. Returns how many were added.
    pub fn enqueue_batch<I>(&self, values: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        let mut values = values.into_iter();
        let Some(first_value) = values.next() else {
            return 0;
        };

        let first = Node::boxed(Some(first_value));
        let mut last = first;
        let mut count = 1;
        for value in values {
            let node = Node::boxed(Some(value));
            // Safety: the chain is private until `link` publishes it.
            unsafe { (*last).next.store(node, Relaxed) };
            last = node;
            count += 1;
        }

        self.link(first, last, count);
        count
    }

    /// Take the oldest value, or `None` if nothing is visible yet.
    pub fn dequeue(&self) -> Option<T> {
        let mut head = self.head.lock();
        let dummy = *head;
        // Safety: the dummy is owned by the consumer side and never null.
        let next = unsafe { (*dummy).next.load(Acquire) };
        if next.is_null() {
            return None;
        }

        *head = next;
        // Safety: `next` is now the dummy; producers never read `value`.
        let value = unsafe { (*next).value.take() };
        drop(unsafe { Box::from_raw(dummy) });
        self.len.fetch_sub(1, Relaxed);
        value
    }

    /// True when no linked value is waiting.
    pub fn is_empty(&self) -> bool {
        let head = self.head.lock();
        unsafe { (**head).next.load(Acquire).is_null() }
    }

    /// Approximate number of queued values. May briefly count values whose
    /// producer has not finished linking them.
    pub fn len(&self) -> usize {
        self.len.load(Relaxed)
    }
}

impl<T> Drop for MpscQueue<T> {
    fn drop(&mut self) {
        let mut node = *self.head.get_mut();
        while !node.is_null() {
            // Safety: `&mut self` means no producer or consumer is active.
            let boxed = unsafe { Box::from_raw(node) };
            node = boxed.next.load(Relaxed);
        }
    }
}

impl<T> fmt::Debug for MpscQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_mpsc_queue(self, f)
    }
}
