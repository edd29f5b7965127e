// Allocation tracking for record recycling
//
// The dhat profiler is global to the process, so this file holds a single
// test and it runs serialised.
//
// cargo test --test allocation_tracking -- --nocapture

use ingestion_engine::Core::pool::RecordPool;
use ingestion_engine::Core::MpscQueue;

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

#[test]
#[serial_test::serial]
fn test_recycled_records_do_not_allocate() {
    let _profiler = dhat::Profiler::builder().testing().build();

    let payload = b"Benchmark Message 0123456789";
    let pool = RecordPool::with_batch_size(64);

    // Warm every slot so its payload buffer has capacity
    let warm: Vec<_> = (0..64)
        .map(|i| {
            let mut r = pool.acquire();
            r.fill(i, payload);
            r
        })
        .collect();
    drop(warm);

    let before = dhat::HeapStats::get();
    for i in 0..10_000u64 {
        let mut r = pool.acquire();
        r.fill(i, payload);
        assert_eq!(r.len(), payload.len());
    }
    let after = dhat::HeapStats::get();
    println!(
        "pool recycling: {} blocks before, {} after",
        before.total_blocks, after.total_blocks
    );
    dhat::assert_eq!(before.total_blocks, after.total_blocks);

    // The queue allocates exactly one node per enqueued value
    let queue = MpscQueue::new();
    let before = dhat::HeapStats::get();
    queue.enqueue_batch((0..32).map(|_| pool.acquire()));
    let after = dhat::HeapStats::get();
    dhat::assert_eq!(after.total_blocks - before.total_blocks, 32);
    while queue.dequeue().is_some() {}
    dhat::assert_eq!(pool.in_use(), 0);
}
