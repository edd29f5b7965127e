use ingestion_engine::Core::pool::{PooledRecord, RecordPool};
use ingestion_engine::Structs::Record;
use std::collections::HashSet;
use std::thread;

fn addr(record: &PooledRecord) -> usize {
    &**record as *const Record as usize
}

#[test]
fn new_pool_is_prefilled() {
    let pool = RecordPool::with_batch_size(16);
    assert_eq!(pool.batch_size(), 16);
    assert_eq!(pool.segments(), 1);
    assert_eq!(pool.capacity(), 16);
    assert_eq!(pool.available(), 16);
    assert_eq!(pool.in_use(), 0);
}

#[test]
fn acquire_grows_when_exhausted() {
    let pool = RecordPool::with_batch_size(4);
    let held: Vec<_> = (0..10).map(|_| pool.acquire()).collect();

    // 10 live records need three segments of four
    assert_eq!(pool.segments(), 3);
    assert_eq!(pool.capacity(), 12);
    assert_eq!(pool.in_use(), 10);

    let unique: HashSet<_> = held.iter().map(addr).collect();
    assert_eq!(unique.len(), 10, "live records must not alias");
    let slots: HashSet<_> = held.iter().map(|r| r.slot_index()).collect();
    assert_eq!(slots.len(), 10);

    drop(held);
    assert_eq!(pool.available(), 12);
}

#[test]
fn single_slot_batches_grow_past_thousands_of_segments() {
    let pool = RecordPool::with_batch_size(1);
    let held: Vec<_> = (0..5000u32)
        .map(|i| {
            let mut r = pool.acquire();
            r.fill(u64::from(i), &i.to_le_bytes());
            r
        })
        .collect();

    assert_eq!(pool.segments(), 5000);
    assert_eq!(pool.capacity(), 5000);
    assert_eq!(pool.in_use(), 5000);
    for (i, r) in held.iter().enumerate() {
        assert_eq!(r.timestamp_ms, i as u64);
        assert_eq!(r.payload(), &(i as u32).to_le_bytes());
    }
    let slots: HashSet<_> = held.iter().map(|r| r.slot_index()).collect();
    assert_eq!(slots.len(), 5000);

    drop(held);
    assert_eq!(pool.available(), 5000);
    // Recycled slots satisfy the next round without growing
    let again: Vec<_> = (0..5000).map(|_| pool.acquire()).collect();
    assert_eq!(pool.segments(), 5000);
    drop(again);
}

#[test]
fn released_slot_is_reused() {
    let pool = RecordPool::with_batch_size(8);
    let mut record = pool.acquire();
    record.fill(42, b"hello");
    let first = addr(&record);
    let index = record.slot_index();
    pool.release(record);

    // The free list is LIFO, so the same slot comes straight back
    let again = pool.acquire();
    assert_eq!(addr(&again), first);
    assert_eq!(again.slot_index(), index);
    // Contents are not cleared on acquire
    assert_eq!(again.timestamp_ms, 42);
    assert_eq!(again.payload(), b"hello");
    assert_eq!(pool.segments(), 1);
}

#[test]
fn fill_overwrites_previous_contents() {
    let pool = RecordPool::with_batch_size(1);
    {
        let mut r = pool.acquire();
        r.fill(1, b"a much longer payload than the next one");
    }
    let mut r = pool.acquire();
    r.fill(2, b"short");
    assert_eq!(r.timestamp_ms, 2);
    assert_eq!(r.payload_str(), Some("short"));
    assert_eq!(r.len(), 5);
}

#[test]
fn handle_outlives_pool() {
    let record = {
        let pool = RecordPool::with_batch_size(2);
        let mut r = pool.acquire();
        r.fill(7, b"kept");
        r
    };
    assert_eq!(record.payload(), b"kept");
    drop(record);
}

#[test]
fn concurrent_acquire_release_never_aliases() {
    let pool = RecordPool::with_batch_size(32);
    let threads = 8;
    let rounds = 2_000;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let pool = pool.clone();
            thread::spawn(move || {
                let mut held: Vec<PooledRecord> = Vec::new();
                for round in 0..rounds {
                    if held.is_empty() || fastrand::bool() {
                        let mut r = pool.acquire();
                        let tag = format!("{}:{}", t, round);
                        r.fill(t as u64, tag.as_bytes());
                        held.push(r);
                    } else {
                        let i = fastrand::usize(..held.len());
                        held.swap_remove(i);
                    }
                    // Nobody else may have written into a record we still hold
                    for r in &held {
                        assert_eq!(r.timestamp_ms, t as u64);
                        assert!(r.payload_str().unwrap().starts_with(&format!("{}:", t)));
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    // Every thread's leftovers were dropped on exit
    assert_eq!(pool.available(), pool.capacity());
    assert_eq!(pool.in_use(), 0);
}

#[test]
fn live_records_are_distinct_across_threads() {
    let pool = RecordPool::with_batch_size(64);
    let per_thread = 500;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pool = pool.clone();
            thread::spawn(move || (0..per_thread).map(|_| pool.acquire()).collect::<Vec<_>>())
        })
        .collect();

    let all: Vec<PooledRecord> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    let unique: HashSet<_> = all.iter().map(|r| r.slot_index()).collect();
    assert_eq!(unique.len(), 4 * per_thread);
    assert!(pool.capacity() >= 4 * per_thread);

    drop(all);
    assert_eq!(pool.in_use(), 0);
}
