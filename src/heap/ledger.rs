/*!
 * Block Ledger
 * Block side table and the free/used singly-linked lists
 *
 * Block metadata lives in a typed side table keyed by the block's header
 * offset instead of being written into the buffer itself, but every block
 * still reserves [`BLOCK_HEADER_SIZE`] bytes ahead of its payload so the
 * split/merge/padding arithmetic is byte-identical to an embedded-header
 * layout. Free and used blocks together always tile the whole buffer.
 */

use super::allocator::align_up;
use super::Heap;
use crate::types::{Address, Size};

/// Bytes reserved ahead of every payload, charged against the buffer.
/// Matches an embedded header of four pointer-sized fields: next link,
/// payload address, payload size, owner reference.
pub const BLOCK_HEADER_SIZE: Size = 32;

/// One block record, keyed in the side table by its header offset.
#[derive(Debug, Clone)]
pub(crate) struct BlockNode {
    pub next: Option<Address>,
    pub payload: Address,
    pub size: Size,
    pub owner: Option<Address>,
}

/// Which singly-linked list an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum List {
    Free,
    Used,
}

impl Heap {
    pub(crate) fn head(&self, list: List) -> Option<Address> {
        match list {
            List::Free => self.free_head,
            List::Used => self.used_head,
        }
    }

    fn set_head(&mut self, list: List, head: Option<Address>) {
        match list {
            List::Free => self.free_head = head,
            List::Used => self.used_head = head,
        }
    }

    /// Look up a block record that a list link points at.
    ///
    /// A dangling link is structural corruption; continuing with it risks
    /// silent data loss, so this is fatal rather than recoverable.
    pub(crate) fn node(&self, block: Address) -> &BlockNode {
        self.blocks
            .get(&block)
            .unwrap_or_else(|| panic!("corruption detected: no block record at 0x{:x}", block))
    }

    pub(crate) fn node_mut(&mut self, block: Address) -> &mut BlockNode {
        self.blocks
            .get_mut(&block)
            .unwrap_or_else(|| panic!("corruption detected: no block record at 0x{:x}", block))
    }

    /// Set a block's next link. A block linking to itself is structural
    /// corruption and is fatal.
    pub(crate) fn set_next(&mut self, block: Address, next: Option<Address>) {
        assert!(
            next != Some(block),
            "corruption detected: block 0x{:x} links to itself",
            block
        );
        if let Some(node) = self.blocks.get_mut(&block) {
            node.next = next;
        }
    }

    /// Write a fresh block record covering `span` bytes at header offset `at`.
    /// The payload starts one header past `at` and the header bytes are
    /// deducted from the usable size.
    pub(crate) fn carve(&mut self, at: Address, span: Size) -> Address {
        let node = BlockNode {
            next: None,
            payload: at + BLOCK_HEADER_SIZE,
            size: span - BLOCK_HEADER_SIZE,
            owner: None,
        };
        self.blocks.insert(at, node);
        at
    }

    /// Split a block so its payload shrinks to `size`, rounded up to the
    /// context alignment, and return the tail carved from the remainder.
    ///
    /// The tail inherits the block's owner and next link; the caller places
    /// it on whichever list is appropriate. Returns `None`, leaving the
    /// block untouched, when the remainder cannot hold a header plus at
    /// least one byte. Rounding the split size keeps the tail's payload
    /// itself alignment-friendly.
    pub(crate) fn split(&mut self, block: Address, size: Size) -> Option<Address> {
        let aligned = align_up(size, self.alignment);
        let node = self.node(block);
        if node.size < aligned + BLOCK_HEADER_SIZE + 1 {
            return None;
        }
        let (payload, old_size, owner, next) = (node.payload, node.size, node.owner, node.next);

        let tail = self.carve(payload + aligned, old_size - aligned);
        self.set_next(tail, next);
        self.node_mut(tail).owner = owner;
        self.set_next(block, Some(tail));
        self.node_mut(block).size = aligned;
        Some(tail)
    }

    /// True when `second`'s header sits exactly at the end of `first`'s
    /// payload; only such blocks may be merged.
    pub(crate) fn mergeable(&self, first: Address, second: Address) -> bool {
        match (self.blocks.get(&first), self.blocks.get(&second)) {
            (Some(a), Some(_)) => a.payload + a.size == second,
            _ => false,
        }
    }

    /// Merge `second` into `first`. Succeeds only when the blocks are
    /// address-adjacent; `first` absorbs `second`'s header and payload and
    /// `second`'s record ceases to exist. The caller must already have
    /// unlinked `second` from its list (the link is reconciled when `second`
    /// still directly follows `first`).
    pub(crate) fn merge(&mut self, first: Address, second: Address) -> bool {
        if first == second || !self.mergeable(first, second) {
            return false;
        }
        let Some(absorbed) = self.blocks.remove(&second) else {
            return false;
        };
        if self.node(first).next == Some(second) {
            self.set_next(first, absorbed.next);
        }
        self.node_mut(first).size += BLOCK_HEADER_SIZE + absorbed.size;
        true
    }

    /// Unlink a block from a list. A block not on the list is a no-op.
    pub(crate) fn remove(&mut self, list: List, block: Address) {
        let Some(head) = self.head(list) else {
            return;
        };
        if head == block {
            let next = self.blocks.get(&block).and_then(|n| n.next);
            self.set_head(list, next);
            self.set_next(block, None);
            return;
        }
        let mut current = head;
        while let Some(next) = self.node(current).next {
            if next == block {
                let after = self.node(block).next;
                self.set_next(current, after);
                self.set_next(block, None);
                return;
            }
            current = next;
        }
    }

    /// Push a block on the front of a list.
    pub(crate) fn add_front(&mut self, list: List, block: Address) {
        if !self.blocks.contains_key(&block) {
            return;
        }
        let head = self.head(list);
        self.set_next(block, head);
        self.set_head(list, Some(block));
    }

    /// First-fit scan of the free list: the first candidate whose capacity
    /// covers `size` plus the padding needed to reach `alignment` from its
    /// payload start (plus a header when padding is nonzero) wins, even if a
    /// later block fits more tightly. This favors allocation speed over
    /// fragmentation and is a deliberate policy, not an oversight.
    pub(crate) fn find_suitable(&self, size: Size, alignment: Size) -> Option<Address> {
        let mut current = self.free_head;
        while let Some(block) = current {
            let node = self.node(block);
            let padding = align_up(node.payload, alignment) - node.payload;
            let mut min_size = size;
            if padding > 0 {
                min_size += padding + BLOCK_HEADER_SIZE;
            }
            if node.size > min_size {
                return Some(block);
            }
            current = node.next;
        }
        None
    }

    /// Resolve a payload offset back to its block, O(n) over the used list.
    pub(crate) fn find_by_payload(&self, ptr: Address) -> Option<Address> {
        let mut current = self.used_head;
        while let Some(block) = current {
            let node = self.node(block);
            if node.payload == ptr {
                return Some(block);
            }
            current = node.next;
        }
        None
    }

    /// Snapshot of a list's members in link order.
    pub(crate) fn list_blocks(&self, list: List) -> Vec<Address> {
        let mut blocks = Vec::new();
        let mut current = self.head(list);
        while let Some(block) = current {
            blocks.push(block);
            current = self.node(block).next;
        }
        blocks
    }
}
