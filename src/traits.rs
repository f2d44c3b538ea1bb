/*!
 * Heap Traits
 * Allocation and ownership abstractions
 */

use crate::types::{Address, BlockInfo, HeapResult, HeapStats, Size};

/// Allocator interface over a managed buffer
///
/// Operations take `&mut self`: a context is not internally synchronized,
/// callers serialize access (the default context wraps one in a mutex).
pub trait Allocator {
    /// Allocate `size` bytes at the context default alignment
    fn allocate(&mut self, size: Size, module: Option<&str>) -> HeapResult<Address>;

    /// Allocate `size` bytes whose payload offset is a multiple of `alignment`
    fn allocate_aligned(
        &mut self,
        alignment: Size,
        size: Size,
        module: Option<&str>,
    ) -> HeapResult<Address>;

    /// Resize an allocation; `None` behaves as a fresh allocation
    fn reallocate(
        &mut self,
        ptr: Option<Address>,
        size: Size,
        module: Option<&str>,
    ) -> HeapResult<Address>;

    /// Return a payload to the free list, optionally merging with its neighbors
    fn free(&mut self, ptr: Address, concatenate: bool) -> HeapResult<()>;

    /// Check if an offset is a live allocation
    fn is_valid(&self, ptr: Address) -> bool;

    /// Get the payload size of a live allocation
    fn block_size(&self, ptr: Address) -> Option<Size>;
}

/// Module ownership interface for bulk release
pub trait ModuleOwnership {
    /// Register a module by name; idempotent on an existing name
    fn register_module(&mut self, name: &str) -> HeapResult<()>;

    /// Release every block the module owns, then the module itself
    fn unregister_module(&mut self, name: &str);

    /// Payload bytes currently owned by a module
    fn module_memory(&self, name: &str) -> Size;

    /// Live allocations owned by a module
    fn module_allocations(&self, name: &str) -> Vec<BlockInfo>;
}

/// Heap statistics provider
pub trait HeapInfo {
    /// Get a detailed occupancy snapshot
    fn stats(&self) -> HeapStats;

    /// Get heap info as (total, used, available)
    fn info(&self) -> (Size, Size, Size);
}
