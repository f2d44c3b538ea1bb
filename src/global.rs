/*!
 * Default Context
 * Process-wide heap shared behind a mutex
 *
 * Explicit [`Heap`] values are the primary API: testable and supporting
 * multiple independent heaps. This layer is a thin convenience for code
 * that wants one heap reachable without plumbing a context through every
 * call. Each wrapper brackets its operation in the lock, so the whole
 * context is serialized: no two mutating calls execute concurrently.
 * Re-entrant use from a thread already holding the lock deadlocks and is
 * unsupported.
 */

use crate::heap::Heap;
use crate::types::{Address, HeapResult, HeapStats, Size};
use parking_lot::Mutex;
use std::sync::OnceLock;

static DEFAULT_HEAP: OnceLock<Mutex<Heap>> = OnceLock::new();

fn default_heap() -> &'static Mutex<Heap> {
    DEFAULT_HEAP.get_or_init(|| Mutex::new(Heap::new()))
}

/// Run `f` against the default context under a single lock acquisition.
pub fn with_heap<R>(f: impl FnOnce(&mut Heap) -> R) -> R {
    f(&mut default_heap().lock())
}

/// Initialize (or reset) the default context over `buffer`.
pub fn init(buffer: Vec<u8>, alignment: Size) -> HeapResult<()> {
    with_heap(|heap| heap.init(buffer, alignment))
}

/// True once the default context has a buffer bound.
pub fn is_initialized() -> bool {
    with_heap(|heap| heap.is_initialized())
}

/// Register a module by name; idempotent on an existing name.
pub fn register_module(name: &str) -> HeapResult<()> {
    with_heap(|heap| heap.register_module(name))
}

/// Release every block the module owns, then the module itself.
pub fn unregister_module(name: &str) {
    with_heap(|heap| heap.unregister_module(name))
}

/// Allocate at the default context's default alignment.
pub fn allocate(size: Size, module: Option<&str>) -> HeapResult<Address> {
    with_heap(|heap| heap.allocate(size, module))
}

/// Allocate with an explicit alignment.
pub fn allocate_aligned(alignment: Size, size: Size, module: Option<&str>) -> HeapResult<Address> {
    with_heap(|heap| heap.allocate_aligned(alignment, size, module))
}

/// Resize an allocation; `None` behaves as a fresh allocation.
pub fn reallocate(ptr: Option<Address>, size: Size, module: Option<&str>) -> HeapResult<Address> {
    with_heap(|heap| heap.reallocate(ptr, size, module))
}

/// Return a payload to the free list, optionally merging with neighbors.
pub fn free(ptr: Address, concatenate: bool) -> HeapResult<()> {
    with_heap(|heap| heap.free(ptr, concatenate))
}

/// Run the global coalescing pass on the default context.
pub fn concatenate_free_blocks() {
    with_heap(|heap| heap.concatenate_free_blocks())
}

/// Occupancy snapshot of the default context.
pub fn stats() -> HeapStats {
    with_heap(|heap| heap.stats())
}
