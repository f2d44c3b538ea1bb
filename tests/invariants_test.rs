/*!
 * Invariant Tests
 * Property-based checks over random operation sequences
 *
 * Whatever sequence of allocate / free / reallocate / unregister /
 * concatenate calls runs against a heap, the block lists must keep tiling
 * the buffer exactly, live payloads must stay aligned, in bounds, and
 * disjoint, and releasing everything must recover the whole buffer.
 */

use modheap::{Address, Heap, Size};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

const HEAP_SIZE: usize = 16 * 1024;
const MODULES: [&str; 3] = ["alpha", "beta", "gamma"];

#[derive(Debug, Clone)]
enum Op {
    Allocate { size: Size, module: usize },
    AllocateAligned { alignment: Size, size: Size, module: usize },
    Free { index: usize, concatenate: bool },
    Reallocate { index: usize, size: Size },
    Unregister { module: usize },
    Concatenate,
}

// module index 3 means anonymous
fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1usize..512, 0usize..4).prop_map(|(size, module)| Op::Allocate { size, module }),
        (0usize..4, 1usize..256, 0usize..4).prop_map(|(pick, size, module)| {
            Op::AllocateAligned {
                alignment: [8, 16, 32, 64][pick],
                size,
                module,
            }
        }),
        (0usize..64, proptest::bool::ANY)
            .prop_map(|(index, concatenate)| Op::Free { index, concatenate }),
        (0usize..64, 1usize..512).prop_map(|(index, size)| Op::Reallocate { index, size }),
        (0usize..3).prop_map(|module| Op::Unregister { module }),
        Just(Op::Concatenate),
    ]
}

fn module_name(module: usize) -> Option<&'static str> {
    MODULES.get(module).copied()
}

/// One tracked live allocation: payload address and owning module index.
struct Live {
    ptr: Address,
    owner: Option<usize>,
}

fn check_invariants(heap: &Heap, live: &[Live]) -> Result<(), TestCaseError> {
    let stats = heap.stats();
    prop_assert_eq!(stats.used_bytes + stats.free_bytes, stats.heap_size);

    let mut regions: Vec<(Address, Size)> = Vec::with_capacity(live.len());
    for entry in live {
        prop_assert!(heap.is_valid(entry.ptr));
        prop_assert_eq!(entry.ptr % 8, 0);
        let size = heap.block_size(entry.ptr).unwrap();
        prop_assert!(entry.ptr + size <= HEAP_SIZE);
        regions.push((entry.ptr, size));
    }

    regions.sort_unstable();
    for pair in regions.windows(2) {
        prop_assert!(pair[0].0 + pair[0].1 <= pair[1].0);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn random_operation_sequences_preserve_heap_invariants(
        ops in prop::collection::vec(op_strategy(), 1..64)
    ) {
        let mut heap = Heap::with_buffer(vec![0u8; HEAP_SIZE], 8).unwrap();
        for name in MODULES {
            heap.register_module(name).unwrap();
        }

        let mut live: Vec<Live> = Vec::new();
        for op in ops {
            match op {
                Op::Allocate { size, module } => {
                    if let Ok(ptr) = heap.allocate(size, module_name(module)) {
                        prop_assert_eq!(ptr % 8, 0);
                        live.push(Live { ptr, owner: module_name(module).map(|_| module) });
                    }
                }
                Op::AllocateAligned { alignment, size, module } => {
                    if let Ok(ptr) = heap.allocate_aligned(alignment, size, module_name(module)) {
                        prop_assert_eq!(ptr % alignment, 0);
                        live.push(Live { ptr, owner: module_name(module).map(|_| module) });
                    }
                }
                Op::Free { index, concatenate } => {
                    if !live.is_empty() {
                        let entry = live.swap_remove(index % live.len());
                        heap.free(entry.ptr, concatenate).unwrap();
                    }
                }
                Op::Reallocate { index, size } => {
                    if !live.is_empty() {
                        let slot = index % live.len();
                        let module = live[slot].owner.and_then(module_name);
                        // a failed grow leaves the original allocation intact
                        if let Ok(ptr) = heap.reallocate(Some(live[slot].ptr), size, module) {
                            live[slot].ptr = ptr;
                        }
                    }
                }
                Op::Unregister { module } => {
                    heap.unregister_module(MODULES[module]);
                    // a block stays live (untracked) when the registry was
                    // too full to carve its module's record at allocation
                    live.retain_mut(|entry| {
                        if entry.owner != Some(module) {
                            return true;
                        }
                        if heap.is_valid(entry.ptr) {
                            entry.owner = None;
                            true
                        } else {
                            false
                        }
                    });
                }
                Op::Concatenate => heap.concatenate_free_blocks(),
            }
            check_invariants(&heap, &live)?;
        }

        // releasing everything recovers the whole buffer as one free block
        for entry in &live {
            heap.free(entry.ptr, false).unwrap();
        }
        for name in MODULES {
            heap.unregister_module(name);
        }
        heap.concatenate_free_blocks();

        let stats = heap.stats();
        prop_assert_eq!(stats.used_blocks, 0);
        prop_assert_eq!(stats.free_blocks, 1);
        prop_assert_eq!(stats.free_bytes, HEAP_SIZE);
        prop_assert_eq!(stats.registered_modules, 0);
    }

    #[test]
    fn allocations_round_trip_through_any_alignment(
        sizes in prop::collection::vec(1usize..256, 1..32),
        pick in 0usize..4,
    ) {
        let alignment = [8, 16, 32, 64][pick];
        let mut heap = Heap::with_buffer(vec![0u8; HEAP_SIZE], 8).unwrap();

        let mut ptrs = Vec::new();
        for size in &sizes {
            if let Ok(ptr) = heap.allocate_aligned(alignment, *size, Some("burst")) {
                prop_assert_eq!(ptr % alignment, 0);
                ptrs.push(ptr);
            }
        }
        prop_assert!(!ptrs.is_empty());

        for ptr in ptrs {
            heap.free(ptr, true).unwrap();
        }
        heap.unregister_module("burst");
        heap.concatenate_free_blocks();

        let stats = heap.stats();
        prop_assert_eq!(stats.free_blocks, 1);
        prop_assert_eq!(stats.free_bytes, HEAP_SIZE);
    }
}
