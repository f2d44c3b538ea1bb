/*!
 * Heap Context
 *
 * One independent heap instance: the caller-supplied buffer, the default
 * alignment, the free/used block lists, and the module registry.
 *
 * ## Placement
 *
 * - **First-fit**: the first free block large enough wins (deliberately not
 *   best-fit; fragmentation behavior is part of the contract)
 * - **Block splitting**: oversized blocks are split, the tail returns to
 *   the free list
 * - **Coalescing**: pairwise on free (opt-in) or a global sweep via
 *   [`Heap::concatenate_free_blocks`]
 * - **Module ownership**: blocks are tagged with a named owner so a whole
 *   module's footprint can be released in one call
 */

mod allocator;
mod ledger;
mod registry;

pub use ledger::BLOCK_HEADER_SIZE;
pub use registry::MODULE_NAME_MAX;

use crate::traits::{Allocator, HeapInfo, ModuleOwnership};
use crate::types::{Address, BlockInfo, HeapError, HeapResult, HeapStats, Size};
use ahash::RandomState;
use ledger::{BlockNode, List};
use log::{error, info};
use registry::{ModuleId, ModuleRecord};
use std::collections::HashMap;

/// A heap carved out of one flat buffer.
///
/// Not internally synchronized: one logical operation at a time across the
/// whole context is the caller's responsibility (see [`crate::global`] for
/// a mutex-wrapped default context).
#[derive(Debug)]
pub struct Heap {
    buffer: Vec<u8>,
    alignment: Size,
    blocks: HashMap<Address, BlockNode, RandomState>,
    free_head: Option<Address>,
    used_head: Option<Address>,
    modules: HashMap<ModuleId, ModuleRecord, RandomState>,
    module_head: Option<ModuleId>,
}

impl Heap {
    /// An uninitialized context; every operation fails until [`Heap::init`].
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            alignment: 0,
            blocks: HashMap::default(),
            free_head: None,
            used_head: None,
            modules: HashMap::default(),
            module_head: None,
        }
    }

    /// Construct and initialize in one step.
    pub fn with_buffer(buffer: Vec<u8>, alignment: Size) -> HeapResult<Self> {
        let mut heap = Self::new();
        heap.init(buffer, alignment)?;
        Ok(heap)
    }

    /// Initialize (or reset) the context over `buffer`.
    ///
    /// The whole buffer becomes a single free block; any previous lists and
    /// registrations are discarded, so repeated init is the supported
    /// clean-slate reset. Rejecting an invalid buffer mutates nothing: a
    /// previously initialized context stays intact.
    pub fn init(&mut self, buffer: Vec<u8>, alignment: Size) -> HeapResult<()> {
        if buffer.is_empty() {
            error!("init called with an empty buffer");
            return Err(HeapError::InvalidArgument("buffer is empty"));
        }
        if buffer.len() <= BLOCK_HEADER_SIZE {
            error!("init called with a buffer smaller than one block header");
            return Err(HeapError::InvalidArgument(
                "buffer cannot hold a block header",
            ));
        }

        let size = buffer.len();
        self.buffer = buffer;
        self.alignment = alignment;
        self.blocks.clear();
        self.modules.clear();
        self.used_head = None;
        self.module_head = None;
        let whole = self.carve(0, size);
        self.free_head = Some(whole);

        info!(
            "heap initialized over a {} byte buffer, default alignment {}",
            size, alignment
        );
        Ok(())
    }

    /// True once a buffer is bound to the context.
    pub fn is_initialized(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Default alignment bound at init time.
    pub fn alignment(&self) -> Size {
        self.alignment
    }

    /// Total managed bytes.
    pub fn heap_size(&self) -> Size {
        self.buffer.len()
    }

    /// Read access to a live payload.
    pub fn payload(&self, ptr: Address) -> HeapResult<&[u8]> {
        let block = self
            .find_by_payload(ptr)
            .ok_or(HeapError::UnknownPointer(ptr))?;
        let size = self.node(block).size;
        Ok(&self.buffer[ptr..ptr + size])
    }

    /// Write access to a live payload.
    pub fn payload_mut(&mut self, ptr: Address) -> HeapResult<&mut [u8]> {
        let block = self
            .find_by_payload(ptr)
            .ok_or(HeapError::UnknownPointer(ptr))?;
        let size = self.node(block).size;
        Ok(&mut self.buffer[ptr..ptr + size])
    }

    /// True when `ptr` is a live allocation.
    pub fn is_valid(&self, ptr: Address) -> bool {
        self.find_by_payload(ptr).is_some()
    }

    /// Payload size of a live allocation.
    pub fn block_size(&self, ptr: Address) -> Option<Size> {
        self.find_by_payload(ptr).map(|block| self.node(block).size)
    }

    /// Occupancy snapshot.
    pub fn stats(&self) -> HeapStats {
        let (used_blocks, used_bytes) = self.account(List::Used);
        let (free_blocks, free_bytes) = self.account(List::Free);
        HeapStats {
            heap_size: self.buffer.len(),
            used_bytes,
            free_bytes,
            used_blocks,
            free_blocks,
            registered_modules: self.modules.len(),
        }
    }

    /// Heap info as (total, used, available).
    pub fn info(&self) -> (Size, Size, Size) {
        let stats = self.stats();
        (stats.heap_size, stats.used_bytes, stats.free_bytes)
    }

    /// Payload bytes currently owned by `name`.
    pub fn module_memory(&self, name: &str) -> Size {
        let Some(id) = self.find_module(name) else {
            return 0;
        };
        self.list_blocks(List::Used)
            .into_iter()
            .filter(|&block| self.node(block).owner == Some(id))
            .map(|block| self.node(block).size)
            .sum()
    }

    /// Live allocations owned by `name`.
    pub fn module_allocations(&self, name: &str) -> Vec<BlockInfo> {
        let Some(id) = self.find_module(name) else {
            return Vec::new();
        };
        self.list_blocks(List::Used)
            .into_iter()
            .filter(|&block| self.node(block).owner == Some(id))
            .map(|block| {
                let node = self.node(block);
                BlockInfo {
                    address: node.payload,
                    size: node.size,
                    module: self
                        .modules
                        .get(&id)
                        .map(|record| record.name.clone()),
                }
            })
            .collect()
    }

    fn account(&self, list: List) -> (usize, Size) {
        let blocks = self.list_blocks(list);
        let bytes = blocks
            .iter()
            .map(|&block| BLOCK_HEADER_SIZE + self.node(block).size)
            .sum();
        (blocks.len(), bytes)
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocator for Heap {
    fn allocate(&mut self, size: Size, module: Option<&str>) -> HeapResult<Address> {
        Heap::allocate(self, size, module)
    }

    fn allocate_aligned(
        &mut self,
        alignment: Size,
        size: Size,
        module: Option<&str>,
    ) -> HeapResult<Address> {
        Heap::allocate_aligned(self, alignment, size, module)
    }

    fn reallocate(
        &mut self,
        ptr: Option<Address>,
        size: Size,
        module: Option<&str>,
    ) -> HeapResult<Address> {
        Heap::reallocate(self, ptr, size, module)
    }

    fn free(&mut self, ptr: Address, concatenate: bool) -> HeapResult<()> {
        Heap::free(self, ptr, concatenate)
    }

    fn is_valid(&self, ptr: Address) -> bool {
        Heap::is_valid(self, ptr)
    }

    fn block_size(&self, ptr: Address) -> Option<Size> {
        Heap::block_size(self, ptr)
    }
}

impl ModuleOwnership for Heap {
    fn register_module(&mut self, name: &str) -> HeapResult<()> {
        Heap::register_module(self, name)
    }

    fn unregister_module(&mut self, name: &str) {
        Heap::unregister_module(self, name)
    }

    fn module_memory(&self, name: &str) -> Size {
        Heap::module_memory(self, name)
    }

    fn module_allocations(&self, name: &str) -> Vec<BlockInfo> {
        Heap::module_allocations(self, name)
    }
}

impl HeapInfo for Heap {
    fn stats(&self) -> HeapStats {
        Heap::stats(self)
    }

    fn info(&self) -> (Size, Size, Size) {
        Heap::info(self)
    }
}
