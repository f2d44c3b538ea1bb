/*!
 * Heap Types
 * Common types for the buffer-backed allocator
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Byte offset into the managed buffer
pub type Address = usize;

/// Size type for heap operations
pub type Size = usize;

/// Heap operation result
pub type HeapResult<T> = Result<T, HeapError>;

/// Heap errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("out of memory: requested {requested} bytes with alignment {alignment}")]
    OutOfMemory { requested: usize, alignment: usize },

    #[error("unknown pointer: offset 0x{0:x} is not a live payload")]
    UnknownPointer(usize),
}

/// Heap occupancy snapshot
///
/// Byte counts include the per-block header charge, so `used_bytes`
/// plus `free_bytes` always equals `heap_size`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapStats {
    pub heap_size: usize,
    pub used_bytes: usize,
    pub free_bytes: usize,
    pub used_blocks: usize,
    pub free_blocks: usize,
    pub registered_modules: usize,
}

/// Metadata for one live allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub address: Address,
    pub size: Size,
    pub module: Option<String>,
}
