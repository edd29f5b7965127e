use ingestion_engine::Core::MpscQueue;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn empty_queue_returns_none() {
    let queue: MpscQueue<u64> = MpscQueue::new();
    assert!(queue.is_empty());
    assert_eq!(queue.len(), 0);
    assert_eq!(queue.dequeue(), None);
    assert_eq!(queue.dequeue(), None);
}

#[test]
fn single_producer_is_fifo() {
    let queue = MpscQueue::new();
    for i in 0..1000u64 {
        queue.enqueue(i);
    }
    assert_eq!(queue.len(), 1000);

    for i in 0..1000u64 {
        assert_eq!(queue.dequeue(), Some(i));
    }
    assert_eq!(queue.dequeue(), None);
    assert!(queue.is_empty());
}

#[test]
fn interleaved_enqueue_dequeue() {
    let queue = MpscQueue::new();
    queue.enqueue("a");
    queue.enqueue("b");
    assert_eq!(queue.dequeue(), Some("a"));
    queue.enqueue("c");
    assert_eq!(queue.dequeue(), Some("b"));
    assert_eq!(queue.dequeue(), Some("c"));
    assert_eq!(queue.dequeue(), None);
    queue.enqueue("d");
    assert_eq!(queue.dequeue(), Some("d"));
}

#[test]
fn enqueue_batch_keeps_order() {
    let queue = MpscQueue::new();
    assert_eq!(queue.enqueue_batch(Vec::<u32>::new()), 0);
    assert!(queue.is_empty());

    queue.enqueue(0);
    assert_eq!(queue.enqueue_batch(1..=5), 5);
    queue.enqueue(6);

    let drained: Vec<u32> = std::iter::from_fn(|| queue.dequeue()).collect();
    assert_eq!(drained, vec![0, 1, 2, 3, 4, 5, 6]);
}

#[test]
fn concurrent_producers_no_loss_no_duplication() {
    let producers = 8;
    let per_producer = 20_000u64;
    let queue = Arc::new(MpscQueue::new());
    let barrier = Arc::new(Barrier::new(producers + 1));

    let mut handles = vec![];
    for p in 0..producers as u64 {
        let queue = queue.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            let mut i = 0;
            while i < per_producer {
                // Mix single and batched enqueues
                let batch = fastrand::u64(1..=16).min(per_producer - i);
                if batch == 1 {
                    queue.enqueue((p, i));
                } else {
                    queue.enqueue_batch((i..i + batch).map(|n| (p, n)));
                }
                i += batch;
            }
        }));
    }

    barrier.wait();
    let total = producers as u64 * per_producer;
    let mut last_seen = vec![None::<u64>; producers];
    let mut seen = HashSet::new();
    let mut received = 0u64;
    while received < total {
        match queue.dequeue() {
            Some((p, n)) => {
                // Per-producer order must be preserved
                if let Some(prev) = last_seen[p as usize] {
                    assert_eq!(n, prev + 1, "producer {} out of order", p);
                } else {
                    assert_eq!(n, 0);
                }
                last_seen[p as usize] = Some(n);
                assert!(seen.insert((p, n)), "duplicate item ({}, {})", p, n);
                received += 1;
            }
            None => thread::yield_now(),
        }
    }

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(queue.dequeue(), None);
    for last in last_seen {
        assert_eq!(last, Some(per_producer - 1));
    }
}

#[test]
fn batches_are_contiguous_under_contention() {
    let producers = 4;
    let batches = 2_000;
    let batch_len = 8u32;
    let queue = Arc::new(MpscQueue::new());

    let handles: Vec<_> = (0..producers as u32)
        .map(|p| {
            let queue = queue.clone();
            thread::spawn(move || {
                for b in 0..batches {
                    queue.enqueue_batch((0..batch_len).map(|k| (p, b, k)));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let items: Vec<_> = std::iter::from_fn(|| queue.dequeue()).collect();
    assert_eq!(items.len(), producers * batches as usize * batch_len as usize);
    for run in items.chunks(batch_len as usize) {
        let (p, b, _) = run[0];
        for (k, item) in run.iter().enumerate() {
            assert_eq!(*item, (p, b, k as u32));
        }
    }
}

#[test]
fn drop_releases_queued_values() {
    struct Tracked(Arc<AtomicUsize>);
    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let dropped = Arc::new(AtomicUsize::new(0));
    {
        let queue = MpscQueue::new();
        for _ in 0..10 {
            queue.enqueue(Tracked(dropped.clone()));
        }
        drop(queue.dequeue());
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }
    assert_eq!(dropped.load(Ordering::SeqCst), 10);
}
