// Layout checks for Record: cache-line alignment keeps records touched by
// different threads on separate lines.
use ingestion_engine::Structs::Record;
use memoffset::offset_of;
use std::mem::{align_of, size_of};

#[test]
fn test_record_layout() {
    let size = size_of::<Record>();
    let align = align_of::<Record>();
    let off_timestamp = offset_of!(Record, timestamp_ms);
    let off_payload = offset_of!(Record, payload);

    println!(
        "Record => size: {size}, align: {align}, offsets: [timestamp_ms:{off_timestamp}, payload:{off_payload}]"
    );

    assert_eq!(align, 64);
    assert_eq!(size % 64, 0);
    assert_eq!(size, 64);
    assert_eq!(off_timestamp, 0);
    assert_eq!(off_payload, 8);
}

#[test]
fn test_record_array_stride() {
    let records = [Record::default(), Record::default()];
    let a = &records[0] as *const Record as usize;
    let b = &records[1] as *const Record as usize;
    assert_eq!(a % 64, 0);
    assert_eq!(b - a, 64);
}
