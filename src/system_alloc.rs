//! System allocator: process-heap provider with byte accounting.

use core::cell::Cell;
use core::ptr::NonNull;
use std::alloc::{alloc, dealloc, realloc, Layout};
use std::rc::Rc;

use crate::alloc::{AllocError, AllocOp, AllocReply, Allocator, RawBlock, BLOCK_ALIGN};

/// Byte counters for leak auditing.
///
/// One instance per run (or per test), shared by whichever providers
/// should be audited on the same balance sheet. Counters are plain
/// `Cell`s; this is single-threaded instrumentation, not a concurrency
/// primitive.
#[derive(Debug, Default)]
pub struct AllocStats {
    allocated: Cell<u64>,
    reallocated: Cell<i64>,
    deallocated: Cell<u64>,
}

impl AllocStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_allocate(&self, size: usize) {
        self.allocated.set(self.allocated.get() + size as u64);
    }

    pub fn record_reallocate(&self, old_size: usize, new_size: usize) {
        let delta = new_size as i64 - old_size as i64;
        self.reallocated.set(self.reallocated.get() + delta);
    }

    pub fn record_deallocate(&self, size: usize) {
        self.deallocated.set(self.deallocated.get() + size as u64);
    }

    pub fn allocated(&self) -> u64 {
        self.allocated.get()
    }

    pub fn deallocated(&self) -> u64 {
        self.deallocated.get()
    }

    /// Net size drift from reallocations; negative when blocks shrank.
    pub fn reallocated(&self) -> i64 {
        self.reallocated.get()
    }

    /// Bytes currently live: allocated − deallocated + realloc drift.
    pub fn live_bytes(&self) -> i64 {
        self.allocated.get() as i64 - self.deallocated.get() as i64 + self.reallocated.get()
    }

    pub fn reset(&self) {
        self.allocated.set(0);
        self.reallocated.set(0);
        self.deallocated.set(0);
    }

    /// Checked-shutdown audit: panics with the counter breakdown when
    /// any bytes are still live.
    pub fn assert_balanced(&self) {
        let live = self.live_bytes();
        assert!(
            live == 0,
            "memory leak detected:\n   +{} bytes allocated\n   -{} bytes deallocated\n   {:+} bytes reallocated\n   = {} bytes",
            self.allocated.get(),
            self.deallocated.get(),
            self.reallocated.get(),
            live
        );
    }
}

/// Process-heap provider.
///
/// Allocate/Reallocate/Deallocate map onto `std::alloc` at
/// [`BLOCK_ALIGN`]. The whole-region operations (`reserve_all`,
/// `reset_all`, `release`) are meaningless for the heap and report
/// [`AllocError::Unsupported`].
#[derive(Clone, Debug)]
pub struct SystemAllocator {
    stats: Rc<AllocStats>,
}

impl SystemAllocator {
    pub fn new() -> Self {
        Self::with_stats(Rc::new(AllocStats::new()))
    }

    /// Audit through a caller-owned counter set, so several consumers
    /// can share one balance sheet for the run.
    pub fn with_stats(stats: Rc<AllocStats>) -> Self {
        Self { stats }
    }

    pub fn stats(&self) -> &Rc<AllocStats> {
        &self.stats
    }

    fn layout(size: usize) -> Result<Layout, AllocError> {
        Layout::from_size_align(size, BLOCK_ALIGN).map_err(|_| AllocError::OutOfMemory { size })
    }
}

impl Default for SystemAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocator for SystemAllocator {
    fn dispatch(&self, op: AllocOp) -> Result<AllocReply, AllocError> {
        match op {
            AllocOp::Allocate { size } => {
                assert!(size > 0, "system: allocate needs a non-zero size");
                let layout = Self::layout(size)?;
                let ptr = unsafe { alloc(layout) };
                let ptr = NonNull::new(ptr).ok_or(AllocError::OutOfMemory { size })?;
                self.stats.record_allocate(size);
                Ok(AllocReply::Block(RawBlock::new(ptr, size)))
            }
            AllocOp::Reallocate { block, new_size } => {
                assert!(new_size > 0, "system: reallocate needs a non-zero size");
                let old_size = block.size();
                // A zero-length block has no heap storage to hand to
                // `realloc`; it resizes as a fresh allocation.
                let ptr = if old_size == 0 {
                    let layout = Self::layout(new_size)?;
                    unsafe { alloc(layout) }
                } else {
                    let layout = Self::layout(old_size)?;
                    unsafe { realloc(block.as_ptr(), layout, new_size) }
                };
                let ptr = NonNull::new(ptr).ok_or(AllocError::OutOfMemory { size: new_size })?;
                self.stats.record_reallocate(old_size, new_size);
                Ok(AllocReply::Block(RawBlock::new(ptr, new_size)))
            }
            AllocOp::Deallocate { block } => {
                let size = block.size();
                assert!(size > 0, "system: deallocate needs the block's size");
                let layout = Self::layout(size)?;
                unsafe { dealloc(block.as_ptr(), layout) };
                self.stats.record_deallocate(size);
                Ok(AllocReply::Bytes(size))
            }
            AllocOp::ReserveAll | AllocOp::ResetAll | AllocOp::Release => {
                log::error!(
                    "system-0 cannot {}: the process heap has no region to manage",
                    op.tag()
                );
                Err(AllocError::Unsupported {
                    provider: "system",
                    op: op.tag(),
                })
            }
        }
    }

    fn name(&self) -> &'static str {
        "system"
    }

    // 0 is reserved for the system allocator.
    fn id(&self) -> u32 {
        0
    }
}
