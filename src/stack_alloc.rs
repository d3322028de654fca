//! Stack allocator: chunked bump allocation with LIFO deallocation.

use core::cell::{Cell, RefCell};
use core::ptr::NonNull;

use crate::alloc::{next_allocator_id, AllocError, AllocOp, AllocReply, Allocator, RawBlock};
use crate::system_alloc::SystemAllocator;

struct Chunk {
    block: RawBlock,
    used: usize,
    previous: Option<Box<Chunk>>,
}

/// Chunked bump allocator over a parent [`Allocator`].
///
/// Hands out sequential offsets from the top chunk; when a request does
/// not fit, a fresh `max_size` chunk is taken from the parent and
/// pushed on the chain. Deallocation is strictly last-in-first-out:
/// returning bytes unwinds the bump offset, and a chunk whose offset
/// reaches zero is popped and returned to the parent (the oldest chunk
/// is kept for reuse).
///
/// Blocks handed out by the arena point into its chunks; they die with
/// the chunk chain (`reset_all`, `release`, drop). Single-threaded.
pub struct StackAllocator<P: Allocator = SystemAllocator> {
    parent: P,
    top: RefCell<Option<Box<Chunk>>>,
    max_size: usize,
    released: Cell<bool>,
    id: u32,
}

impl<P: Allocator> StackAllocator<P> {
    /// Build an arena with `max_size`-byte chunks. The first chunk is
    /// taken from the parent eagerly, so construction fails when the
    /// parent cannot provide it.
    pub fn new(parent: P, max_size: usize) -> Result<Self, AllocError> {
        assert!(max_size > 0, "stack: chunk capacity must be non-zero");
        let block = parent.allocate(max_size)?;
        Ok(Self {
            parent,
            top: RefCell::new(Some(Box::new(Chunk {
                block,
                used: 0,
                previous: None,
            }))),
            max_size,
            released: Cell::new(false),
            id: next_allocator_id(),
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn parent(&self) -> &P {
        &self.parent
    }

    /// Number of chunks currently on the chain.
    pub fn chunk_count(&self) -> usize {
        let top = self.top.borrow();
        let mut n = 0;
        let mut cur = top.as_deref();
        while let Some(chunk) = cur {
            n += 1;
            cur = chunk.previous.as_deref();
        }
        n
    }

    /// Bytes in use across every chunk.
    pub fn used_bytes(&self) -> usize {
        let top = self.top.borrow();
        let mut total = 0;
        let mut cur = top.as_deref();
        while let Some(chunk) = cur {
            total += chunk.used;
            cur = chunk.previous.as_deref();
        }
        total
    }

    /// Return every chunk to the parent, oldest last.
    fn unwind(&self) -> Result<usize, AllocError> {
        let mut total = 0;
        let mut cur = self.top.borrow_mut().take();
        while let Some(chunk) = cur {
            let Chunk {
                block, previous, ..
            } = *chunk;
            total += self.parent.deallocate(block)?;
            cur = previous;
        }
        Ok(total)
    }
}

impl<P: Allocator> Allocator for StackAllocator<P> {
    fn dispatch(&self, op: AllocOp) -> Result<AllocReply, AllocError> {
        assert!(
            !self.released.get(),
            "stack allocator used after release"
        );
        match op {
            AllocOp::Allocate { size } => {
                assert!(size > 0, "stack: allocate needs a non-zero size");
                let mut top = self.top.borrow_mut();
                let chunk = top.as_mut().expect("live arena has a chunk");
                if chunk.used + size >= self.max_size {
                    if size > self.max_size {
                        log::warn!(
                            "stack-{} cannot allocate {} bytes ({} byte chunk capacity)",
                            self.id,
                            size,
                            self.max_size
                        );
                        return Err(AllocError::ChunkOverflow {
                            size,
                            max_size: self.max_size,
                        });
                    }
                    let block = self.parent.allocate(self.max_size)?;
                    let previous = top.take();
                    *top = Some(Box::new(Chunk {
                        block,
                        used: 0,
                        previous,
                    }));
                }
                let chunk = top.as_mut().expect("live arena has a chunk");
                let ptr = unsafe { chunk.block.as_ptr().add(chunk.used) };
                chunk.used += size;
                let ptr = NonNull::new(ptr).expect("bump pointer is in-bounds and non-null");
                Ok(AllocReply::Block(RawBlock::new(ptr, size)))
            }
            AllocOp::Deallocate { block } => {
                let old_size = block.size();
                assert!(old_size > 0, "stack: deallocate needs the block's size");
                let mut top = self.top.borrow_mut();
                let chunk = top.as_mut().expect("live arena has a chunk");
                assert!(
                    chunk.used >= old_size,
                    "stack: deallocate of {} bytes exceeds the {} bytes in use",
                    old_size,
                    chunk.used
                );
                debug_assert_eq!(
                    block.as_ptr() as usize,
                    chunk.block.as_ptr() as usize + chunk.used - old_size,
                    "stack: deallocation must be last-in-first-out"
                );
                chunk.used -= old_size;
                if chunk.used == 0 && chunk.previous.is_some() {
                    let spent = top.take().expect("live arena has a chunk");
                    let Chunk {
                        block: spent_block,
                        previous,
                        ..
                    } = *spent;
                    *top = previous;
                    drop(top);
                    self.parent.deallocate(spent_block)?;
                }
                Ok(AllocReply::Bytes(old_size))
            }
            AllocOp::ResetAll => {
                let mut top = self.top.borrow_mut();
                let mut total = 0;
                let mut cur = top.as_deref_mut();
                while let Some(chunk) = cur {
                    total += chunk.used;
                    chunk.used = 0;
                    cur = chunk.previous.as_deref_mut();
                }
                Ok(AllocReply::Bytes(total))
            }
            AllocOp::Release => {
                let total = self.unwind()?;
                self.released.set(true);
                Ok(AllocReply::Bytes(total))
            }
            AllocOp::Reallocate { .. } | AllocOp::ReserveAll => {
                log::error!("stack-{} does not implement {}", self.id, op.tag());
                Err(AllocError::Unsupported {
                    provider: "stack",
                    op: op.tag(),
                })
            }
        }
    }

    fn name(&self) -> &'static str {
        "stack"
    }

    fn id(&self) -> u32 {
        self.id
    }
}

impl<P: Allocator> Drop for StackAllocator<P> {
    fn drop(&mut self) {
        if self.released.get() {
            return;
        }
        if let Err(err) = self.unwind() {
            log::error!("stack-{} failed to return a chunk on drop: {err}", self.id);
        }
    }
}
