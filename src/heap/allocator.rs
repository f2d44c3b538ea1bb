/*!
 * Alignment Engine
 * Aligned allocation, realloc, free, and coalescing over the block ledger
 */

use super::ledger::{List, BLOCK_HEADER_SIZE};
use super::Heap;
use crate::types::{Address, HeapError, HeapResult, Size};
use log::error;

/// Round a value up to the next multiple of `alignment`.
///
/// `alignment` is trusted to be a power of two and is never validated;
/// behavior for anything else is undefined. Callers keep both operands
/// bounded by the buffer size, so the sum cannot overflow.
pub(crate) fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

impl Heap {
    /// Allocate `size` bytes at the context default alignment.
    pub fn allocate(&mut self, size: Size, module: Option<&str>) -> HeapResult<Address> {
        self.allocate_aligned(self.alignment, size, module)
    }

    /// Allocate `size` bytes whose payload offset is a multiple of `alignment`.
    ///
    /// The returned offset points at `size` usable bytes that overlap no
    /// other live block. Failure is total: every failing branch restores the
    /// candidate block to the free list unchanged and never leaves a
    /// fragment unlinked.
    pub fn allocate_aligned(
        &mut self,
        alignment: Size,
        size: Size,
        module: Option<&str>,
    ) -> HeapResult<Address> {
        if !self.is_initialized() {
            return Err(HeapError::InvalidArgument("heap is not initialized"));
        }
        // bound both operands by the buffer before any rounding arithmetic;
        // anything larger cannot fit and would overflow align_up
        if size > self.heap_size() || alignment > self.heap_size() {
            error!(
                "unable to allocate {} bytes with alignment {}: exceeds heap size {}",
                size,
                alignment,
                self.heap_size()
            );
            return Err(HeapError::OutOfMemory {
                requested: size,
                alignment,
            });
        }

        let aligned_size = align_up(size, alignment);
        let Some(mut block) = self.find_suitable(aligned_size, alignment) else {
            error!(
                "unable to allocate {} bytes with alignment {} for module {:?}",
                size, alignment, module
            );
            return Err(HeapError::OutOfMemory {
                requested: size,
                alignment,
            });
        };

        self.remove(List::Free, block);

        let payload = self.node(block).payload;
        let padding = align_up(payload, alignment) - payload;
        if padding > 0 {
            if padding >= BLOCK_HEADER_SIZE {
                // split so the tail's payload begins exactly at the aligned
                // address; the leading fragment keeps the padding region
                match self.split(block, padding - BLOCK_HEADER_SIZE) {
                    Some(usable) => {
                        self.add_front(List::Free, block);
                        block = usable;
                    }
                    None => {
                        // find_suitable guaranteed room for this split
                        self.add_front(List::Free, block);
                        error!(
                            "unable to allocate {} bytes with alignment {} for module {:?}: split failed",
                            size, alignment, module
                        );
                        return Err(HeapError::OutOfMemory {
                            requested: size,
                            alignment,
                        });
                    }
                }
            } else {
                // gap too small to host a header: advance to the next
                // boundary with at least a header of leading space
                let search_start = payload + BLOCK_HEADER_SIZE;
                let new_padding = align_up(search_start, alignment) - payload;
                let capacity = self.node(block).size;
                if new_padding >= BLOCK_HEADER_SIZE
                    && capacity >= new_padding - BLOCK_HEADER_SIZE + aligned_size
                {
                    match self.split(block, new_padding - BLOCK_HEADER_SIZE) {
                        Some(usable) => {
                            self.add_front(List::Free, block);
                            block = usable;
                        }
                        None => {
                            self.add_front(List::Free, block);
                            error!(
                                "unable to allocate {} bytes with alignment {} for module {:?}: insufficient padding",
                                size, alignment, module
                            );
                            return Err(HeapError::OutOfMemory {
                                requested: size,
                                alignment,
                            });
                        }
                    }
                } else {
                    self.add_front(List::Free, block);
                    error!(
                        "unable to allocate {} bytes with alignment {} for module {:?}: insufficient space",
                        size, alignment, module
                    );
                    return Err(HeapError::OutOfMemory {
                        requested: size,
                        alignment,
                    });
                }
            }
        }

        if self.node(block).size > aligned_size + BLOCK_HEADER_SIZE + 1 {
            if let Some(tail) = self.split(block, aligned_size) {
                self.add_front(List::Free, tail);
            }
        }

        // a missing registry record leaves the block untracked rather than
        // failing an allocation that already has its memory
        let owner = match module {
            Some(name) => self.get_or_create(name),
            None => None,
        };
        self.node_mut(block).owner = owner;
        self.add_front(List::Used, block);

        Ok(self.node(block).payload)
    }

    /// Resize an allocation.
    ///
    /// `None` behaves as a fresh allocation at the context default
    /// alignment. A size equal to the current payload size returns the
    /// offset unchanged; a smaller one shrinks in place and keeps the
    /// offset. Growth always moves to a fresh block (no in-place extension
    /// into an adjacent free block), copies the surviving bytes, and frees
    /// the old block; a failed growth leaves the original untouched.
    pub fn reallocate(
        &mut self,
        ptr: Option<Address>,
        size: Size,
        module: Option<&str>,
    ) -> HeapResult<Address> {
        let Some(ptr) = ptr else {
            return self.allocate_aligned(self.alignment, size, module);
        };
        let Some(block) = self.find_by_payload(ptr) else {
            error!(
                "realloc called with unknown pointer 0x{:x} from module {:?}",
                ptr, module
            );
            return Err(HeapError::UnknownPointer(ptr));
        };

        let old_size = self.node(block).size;
        if size < old_size {
            self.remove(List::Used, block);
            if let Some(tail) = self.split(block, size) {
                self.add_front(List::Free, tail);
            }
            self.add_front(List::Used, block);
            Ok(ptr)
        } else if size > old_size {
            let new_ptr = self.allocate_aligned(self.alignment, size, module)?;
            self.buffer.copy_within(ptr..ptr + old_size, new_ptr);
            self.remove(List::Used, block);
            self.add_front(List::Free, block);
            Ok(new_ptr)
        } else {
            Ok(ptr)
        }
    }

    /// Return a payload to the free list.
    ///
    /// With `concatenate`, attempt pairwise merges between the freed block
    /// and every other current free-list entry, in both directions. This
    /// merges only blocks adjacent to the one just freed and is strictly
    /// weaker than [`Heap::concatenate_free_blocks`], which sweeps the whole
    /// list.
    pub fn free(&mut self, ptr: Address, concatenate: bool) -> HeapResult<()> {
        let Some(block) = self.find_by_payload(ptr) else {
            error!("free called with unknown pointer 0x{:x}", ptr);
            return Err(HeapError::UnknownPointer(ptr));
        };

        self.remove(List::Used, block);
        self.add_front(List::Free, block);

        if concatenate {
            let mut target = block;
            for other in self.list_blocks(List::Free) {
                if other == target {
                    continue;
                }
                if self.mergeable(target, other) {
                    self.remove(List::Free, other);
                    self.merge(target, other);
                } else if self.mergeable(other, target) {
                    self.remove(List::Free, target);
                    self.merge(other, target);
                    target = other;
                }
            }
        }
        Ok(())
    }

    /// Global defragmentation pass: for every free block, keep absorbing any
    /// other free block that starts where it ends, then advance.
    ///
    /// Worst case O(n²) in the number of free fragments, an accepted
    /// tradeoff. Terminates (every merge removes a block) and is idempotent:
    /// a second consecutive call performs no merges.
    pub fn concatenate_free_blocks(&mut self) {
        let mut current = self.free_head;
        while let Some(block) = current {
            loop {
                let victim = self
                    .list_blocks(List::Free)
                    .into_iter()
                    .find(|&other| other != block && self.mergeable(block, other));
                let Some(victim) = victim else {
                    break;
                };
                self.remove(List::Free, victim);
                self.merge(block, victim);
            }
            current = self.node(block).next;
        }
    }
}
