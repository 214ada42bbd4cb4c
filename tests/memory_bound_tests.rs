use serde_json::json;
use streamdecode::fixtures::RepeatedElementSource;
use streamdecode::profiler::{tracking_active, CountingAllocator, MeasurementSession};
use streamdecode::{PathKey, Selector};

#[global_allocator]
static ALLOC: CountingAllocator = CountingAllocator;

const ELEMENT: &str = r#"{"id": 123456, "name": "a fairly long name to make each element weigh something", "tags": ["x", "y", "z"], "nested": {"deep": [1.5, 2.5, {"deeper": null}]}}"#;

/// Peak bytes allocated while selecting `/target` out of `count` siblings.
fn peak_for_target(count: usize) -> u64 {
    let session = MeasurementSession::start();
    let source = RepeatedElementSource::new(ELEMENT, count, r#"{"found": true}"#);
    let items: Vec<_> = Selector::open(source, "/target")
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(items, vec![(PathKey::from("target"), json!({"found": true}))]);
    drop(items);
    session.finish().peak_memory
}

#[test]
fn test_allocator_is_counting() {
    assert!(tracking_active());
}

#[test]
fn test_peak_memory_does_not_grow_with_sibling_count() {
    let small = peak_for_target(10);
    let large = peak_for_target(50_000);
    let document_size = RepeatedElementSource::new(ELEMENT, 50_000, "1").total_len() as u64;

    assert!(small > 0, "allocations should be observed");
    assert!(large <= small + 1024, "peak grew from {small} to {large} bytes");
    assert!(large * 100 < document_size, "peak {large} is not small next to {document_size} bytes of input");
}

#[test]
fn test_wildcard_selection_is_bounded_by_largest_item() {
    let measure = |count: usize| {
        let session = MeasurementSession::start();
        let source = RepeatedElementSource::new(ELEMENT, count, "0");
        let mut seen = 0;
        for item in Selector::open(source, "/items/*").unwrap() {
            let (_, value) = item.unwrap();
            assert_eq!(value["id"], json!(123456));
            seen += 1;
        }
        assert_eq!(seen, count);
        session.finish().peak_memory
    };
    let small = measure(10);
    let large = measure(20_000);
    assert!(large <= small + 1024, "peak grew from {small} to {large} bytes");
}

#[test]
fn test_nested_session_keeps_outer_peak() {
    const BLOCK: usize = 4 * 1024 * 1024;
    let outer = MeasurementSession::start();
    drop(std::hint::black_box(vec![0u8; BLOCK]));

    let inner = MeasurementSession::start();
    let small = std::hint::black_box(vec![0u8; 64]);
    let inner_peak = inner.finish().peak_memory;
    drop(small);

    let outer_peak = outer.finish().peak_memory;
    assert!(outer_peak >= BLOCK as u64, "outer peak {outer_peak} lost the {BLOCK} byte block");
    assert!(inner_peak < BLOCK as u64, "inner peak {inner_peak} saw an allocation made before it started");
}

#[test]
fn test_overlapping_sessions_finish_in_any_order() {
    let first = MeasurementSession::start();
    let second = MeasurementSession::start();
    drop(std::hint::black_box(vec![0u8; 1024 * 1024]));

    let first_peak = first.finish().peak_memory;
    drop(std::hint::black_box(vec![0u8; 2 * 1024 * 1024]));
    let second_peak = second.finish().peak_memory;

    assert!(first_peak >= 1024 * 1024);
    assert!(second_peak >= 2 * 1024 * 1024);
}
