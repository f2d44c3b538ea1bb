/*!
 * modheap
 * Module-owning heap allocator over a caller-supplied flat buffer
 *
 * Carves allocations out of one flat byte buffer with first-fit placement,
 * block splitting, and pairwise or global coalescing, and tags every block
 * with the named module that owns it so a module's entire footprint can be
 * released in one call. The buffer is the only memory the heap ever uses;
 * even the module registry records are carved from it.
 *
 * ```
 * use modheap::Heap;
 *
 * let mut heap = Heap::with_buffer(vec![0u8; 64 * 1024], 8).unwrap();
 * let ptr = heap.allocate(256, Some("render")).unwrap();
 * heap.payload_mut(ptr).unwrap()[0] = 42;
 * heap.unregister_module("render"); // releases the allocation too
 * ```
 */

pub mod global;
pub mod heap;
pub mod traits;
pub mod types;

// Re-exports
pub use heap::{Heap, BLOCK_HEADER_SIZE, MODULE_NAME_MAX};
pub use traits::{Allocator, HeapInfo, ModuleOwnership};
pub use types::{Address, BlockInfo, HeapError, HeapResult, HeapStats, Size};
