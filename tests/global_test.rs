/*!
 * Default Context Tests
 * The process-wide heap shared behind a mutex
 */

use modheap::global;
use pretty_assertions::assert_eq;
use serial_test::serial;

const HEAP_SIZE: usize = 64 * 1024;

fn reset() {
    global::init(vec![0u8; HEAP_SIZE], 8).unwrap();
}

#[test]
#[serial]
fn init_binds_a_buffer_to_the_default_context() {
    reset();
    assert!(global::is_initialized());
    assert_eq!(global::stats().heap_size, HEAP_SIZE);
}

#[test]
#[serial]
fn allocate_and_free_through_the_default_context() {
    reset();
    let ptr = global::allocate(256, Some("core")).unwrap();
    assert_eq!(ptr % 8, 0);

    global::free(ptr, true).unwrap();
    global::unregister_module("core");
    global::concatenate_free_blocks();

    let stats = global::stats();
    assert_eq!(stats.used_blocks, 0);
    assert_eq!(stats.free_blocks, 1);
}

#[test]
#[serial]
fn module_lifecycle_through_the_default_context() {
    reset();
    global::register_module("svc").unwrap();
    let a = global::allocate(128, Some("svc")).unwrap();
    let b = global::reallocate(Some(a), 512, Some("svc")).unwrap();
    assert_ne!(a, b);

    global::unregister_module("svc");
    assert_eq!(global::stats().registered_modules, 0);
    assert_eq!(global::stats().used_blocks, 0);
}

#[test]
#[serial]
fn with_heap_runs_multiple_steps_under_one_lock() {
    reset();
    let (ptr, size) = global::with_heap(|heap| {
        let ptr = heap.allocate(64, Some("batch")).unwrap();
        heap.payload_mut(ptr).unwrap().fill(7);
        (ptr, heap.block_size(ptr).unwrap())
    });
    assert_eq!(size, 64);
    assert!(global::with_heap(|heap| heap
        .payload(ptr)
        .unwrap()
        .iter()
        .all(|&b| b == 7)));
}

#[test]
#[serial]
fn concurrent_callers_are_serialized() {
    use std::thread;

    reset();
    let mut handles = Vec::new();
    for i in 0..8 {
        handles.push(thread::spawn(move || {
            let name = format!("worker_{}", i);
            for _ in 0..50 {
                let ptr = global::allocate(64, Some(name.as_str())).unwrap();
                global::free(ptr, false).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // every worker's scratch blocks are gone, only registry records remain
    let stats = global::stats();
    assert_eq!(stats.registered_modules, 8);
    assert_eq!(stats.used_blocks, 8);
    assert_eq!(stats.used_bytes + stats.free_bytes, stats.heap_size);
}
