//! stride-hashmap: a single-threaded, open-addressing hash table over
//! fixed-stride byte entries, built on a pluggable allocation
//! capability.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: embed a low-overhead associative array into systems code
//!   where the caller controls memory provenance (heap, arena, custom
//!   pools), in layers that can be reasoned about independently.
//! - Layers:
//!   - Allocator capability (`alloc`): six operations behind one
//!     `dispatch` point, selected by a closed `AllocOp` enum; providers
//!     are the process heap (`SystemAllocator`, with injectable byte
//!     accounting) and a chunked bump arena (`StackAllocator`, LIFO
//!     deallocation).
//!   - RawHashMap: the engine. One allocation holds a variable-stride
//!     probe index plus dense key and value rows; keys and values are
//!     opaque byte blobs of fixed stride. A structural `Table` core
//!     does probing and row surgery; the shell owns the allocator and
//!     the growth policy (independent load and grow factors).
//!   - TypedHashMap: a thin `Copy`-typed facade with `size_of` strides.
//!
//! Constraints
//! - Single-threaded: providers use `Cell`/`RefCell`, tables hand out
//!   raw-block-backed borrows; nothing here is `Send` or `Sync`.
//! - One allocation per table: index and rows share a block; growth
//!   allocates a replacement, re-inserts every row (probe positions
//!   depend on the index size), then returns the old block.
//! - Rows are dense in `[0, count)`: deletion swaps the last row into
//!   the gap and leaves a tombstone in the probe index. Lookups stop at
//!   tombstones as well as empty slots; see the probe loop for the
//!   consequences and the pinned tests for the exact behavior.
//! - Contract violations (LIFO misuse, use after release, stride
//!   mismatches) fail fast with a panic; allocation failures are
//!   ordinary `Err` values and leave the table untouched.
//!
//! Why this split?
//! - Localize invariants: the `Table` core never allocates, the shell
//!   never probes, providers never see table layout.
//! - Minimize unsafe: raw-pointer handling is confined to the region
//!   accessors in `raw_hash_map`, the bump arithmetic in `stack_alloc`,
//!   and the `std::alloc` calls in `system_alloc`; everything above
//!   works with slices.
//! - Observability stays at the seams: every allocator call can emit a
//!   `log` trace line; the table itself is silent.

pub mod alloc;
pub mod key_ops;
mod layout;
mod raw_hash_map;
mod raw_hash_map_proptest;
mod stack_alloc;
mod system_alloc;
mod typed_hash_map;

// Public surface
pub use alloc::{AllocError, AllocOp, AllocReply, Allocator, RawBlock, BLOCK_ALIGN};
pub use key_ops::{ByteKeys, HasherKeys, KeyOps};
pub use raw_hash_map::{
    MapError, RawHashMap, SetOutcome, DEFAULT_GROW_FACTOR, DEFAULT_LOAD_FACTOR,
};
pub use stack_alloc::StackAllocator;
pub use system_alloc::{AllocStats, SystemAllocator};
pub use typed_hash_map::TypedHashMap;
