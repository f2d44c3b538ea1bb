/*!
 * Module Registry
 * Named ownership records, themselves carved from the heap
 *
 * Registering a module consumes heap space: each record is backed by a used
 * block competing with user data, so a full heap can refuse registrations.
 */

use super::ledger::{List, BLOCK_HEADER_SIZE};
use super::Heap;
use crate::types::{Address, HeapError, HeapResult, Size};
use log::{error, info, warn};

/// Maximum module identifier length in bytes; longer names are silently
/// truncated.
pub const MODULE_NAME_MAX: usize = 32;

/// Heap footprint of one registry record: the bounded identifier plus a
/// next link, matching the embedded layout the record would occupy.
pub(crate) const MODULE_RECORD_SIZE: Size = MODULE_NAME_MAX + 8;

/// Identifier of a module record: the payload offset of its backing block.
pub(crate) type ModuleId = Address;

#[derive(Debug, Clone)]
pub(crate) struct ModuleRecord {
    pub name: String,
    pub next: Option<ModuleId>,
}

/// Bound an identifier to [`MODULE_NAME_MAX`], backing off to the nearest
/// char boundary so truncation never splits a code point.
pub(crate) fn bounded_name(name: &str) -> String {
    if name.len() < MODULE_NAME_MAX {
        return name.to_owned();
    }
    let mut end = MODULE_NAME_MAX - 1;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_owned()
}

impl Heap {
    /// Resolve a name to a live record.
    ///
    /// A module-list link with no backing record is structural corruption,
    /// fatal like a dangling block link.
    pub(crate) fn find_module(&self, name: &str) -> Option<ModuleId> {
        let name = bounded_name(name);
        let mut current = self.module_head;
        while let Some(id) = current {
            let record = self
                .modules
                .get(&id)
                .unwrap_or_else(|| panic!("corruption detected: no module record at 0x{:x}", id));
            if record.name == name {
                return Some(id);
            }
            current = record.next;
        }
        None
    }

    /// Carve a registry record out of the heap and link it in.
    fn create_module(&mut self, name: &str) -> Option<ModuleId> {
        let Some(block) = self.find_suitable(MODULE_RECORD_SIZE, self.alignment) else {
            error!("unable to allocate registry record for module {}", name);
            return None;
        };
        self.remove(List::Free, block);
        if self.node(block).size > MODULE_RECORD_SIZE + BLOCK_HEADER_SIZE + self.alignment {
            if let Some(tail) = self.split(block, MODULE_RECORD_SIZE) {
                self.add_front(List::Free, tail);
            }
        }

        let id = self.node(block).payload;
        self.modules.insert(
            id,
            ModuleRecord {
                name: bounded_name(name),
                next: self.module_head,
            },
        );
        self.module_head = Some(id);
        self.add_front(List::Used, block);
        Some(id)
    }

    /// Resolve a name to a record, registering it on first sight.
    pub(crate) fn get_or_create(&mut self, name: &str) -> Option<ModuleId> {
        self.find_module(name).or_else(|| self.create_module(name))
    }

    /// Register a module by name.
    ///
    /// Idempotent: an existing registration is kept and reported as success.
    pub fn register_module(&mut self, name: &str) -> HeapResult<()> {
        if self.find_module(name).is_some() {
            warn!("module {} is already registered", name);
            return Ok(());
        }
        match self.create_module(name) {
            Some(_) => {
                info!("module {} registered", name);
                Ok(())
            }
            None => Err(HeapError::OutOfMemory {
                requested: MODULE_RECORD_SIZE,
                alignment: self.alignment,
            }),
        }
    }

    /// Unregister a module: every block it owns returns to the free list,
    /// then the record's own backing block, then the record is unlinked.
    /// Unknown names are a no-op.
    pub fn unregister_module(&mut self, name: &str) {
        // owned, bounded copy before any mutation: in the embedded layout
        // the caller's string may live inside memory this call frees
        let name = bounded_name(name);
        let Some(id) = self.find_module(&name) else {
            warn!("module {} is not registered", name);
            return;
        };

        self.release_module_memory(id);
        self.unlink_module(id);
        if let Some(backing) = self.find_by_payload(id) {
            self.remove(List::Used, backing);
            self.add_front(List::Free, backing);
        }
        self.modules.remove(&id);
        info!("module {} unregistered", name);
    }

    /// Move every used block owned by `id` to the free list in one scan.
    fn release_module_memory(&mut self, id: ModuleId) {
        let mut owned = Vec::new();
        let mut current = self.used_head;
        while let Some(block) = current {
            let node = self.node(block);
            if node.owner == Some(id) {
                owned.push(block);
            }
            current = node.next;
        }
        for block in owned {
            self.remove(List::Used, block);
            self.add_front(List::Free, block);
        }
    }

    fn unlink_module(&mut self, id: ModuleId) {
        if self.module_head == Some(id) {
            self.module_head = self.modules.get(&id).and_then(|m| m.next);
            return;
        }
        let mut current = self.module_head;
        while let Some(at) = current {
            let next = self.modules.get(&at).and_then(|m| m.next);
            if next == Some(id) {
                let after = self.modules.get(&id).and_then(|m| m.next);
                if let Some(record) = self.modules.get_mut(&at) {
                    record.next = after;
                }
                return;
            }
            current = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn short_names_pass_through() {
        assert_eq!(bounded_name("render"), "render");
        assert_eq!(bounded_name(""), "");
    }

    #[test]
    fn long_names_truncate_to_bound() {
        let long = "a".repeat(100);
        let bounded = bounded_name(&long);
        assert_eq!(bounded.len(), MODULE_NAME_MAX - 1);
        assert!(long.starts_with(&bounded));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // multibyte code points straddling the bound
        let name = "é".repeat(20);
        let bounded = bounded_name(&name);
        assert!(bounded.len() < MODULE_NAME_MAX);
        assert!(name.starts_with(&bounded));
    }

    #[test]
    #[should_panic(expected = "corruption detected")]
    fn dangling_module_link_is_fatal() {
        let mut heap = Heap::with_buffer(vec![0u8; 4096], 8).unwrap();
        let id = heap.get_or_create("m").unwrap();
        heap.modules.remove(&id);
        let _ = heap.find_module("m");
    }

    #[test]
    fn names_equal_after_truncation_resolve_to_one_module() {
        let mut heap = Heap::with_buffer(vec![0u8; 4096], 8).unwrap();
        let long_a = format!("{}_a", "x".repeat(40));
        let long_b = format!("{}_b", "x".repeat(40));
        let first = heap.get_or_create(&long_a).unwrap();
        let second = heap.get_or_create(&long_b).unwrap();
        assert_eq!(first, second);
    }
}
