//! Allocator capability: six operations behind one dispatch point.

use core::fmt;
use core::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

/// Alignment guaranteed for blocks handed out by the built-in providers.
///
/// Table storage is accessed bytewise, so consumers of this crate never
/// rely on it, but custom providers layering on the built-ins may.
pub const BLOCK_ALIGN: usize = 16;

/// A block of memory handed out by an [`Allocator`].
///
/// The block stays valid until it is returned to its provider, or until
/// the provider reclaims the backing region wholesale (`reset_all`,
/// `release`, arena drop). The provider is the sole owner of the bytes;
/// a `RawBlock` is a loan, not an ownership transfer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RawBlock {
    ptr: NonNull<u8>,
    size: usize,
}

impl RawBlock {
    pub fn new(ptr: NonNull<u8>, size: usize) -> Self {
        Self { ptr, size }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// The closed set of allocator operations.
///
/// Every operation funnels through [`Allocator::dispatch`]; the variant
/// is the discriminant. Reply shapes are fixed per operation:
///
/// - `Allocate`, `Reallocate`, `ReserveAll` -> [`AllocReply::Block`]
/// - `Deallocate` -> [`AllocReply::Bytes`] echoing the block's size
/// - `ResetAll`, `Release` -> [`AllocReply::Bytes`] reclaimed/released
///
/// `Allocate` with `size == 0` and `Deallocate` of a zero-sized block
/// are contract violations and panic in the providers. Reallocating a
/// zero-sized block is valid and behaves as a fresh allocation.
#[derive(Copy, Clone, Debug)]
pub enum AllocOp {
    Allocate { size: usize },
    Reallocate { block: RawBlock, new_size: usize },
    Deallocate { block: RawBlock },
    /// Pre-commit the provider's whole backing region.
    ReserveAll,
    /// Reclaim every outstanding allocation at once, keeping the
    /// backing region.
    ResetAll,
    /// Return all held memory to the parent; the provider is unusable
    /// afterwards.
    Release,
}

impl AllocOp {
    pub fn tag(&self) -> &'static str {
        match self {
            AllocOp::Allocate { .. } => "allocate",
            AllocOp::Reallocate { .. } => "reallocate",
            AllocOp::Deallocate { .. } => "deallocate",
            AllocOp::ReserveAll => "reserve_all",
            AllocOp::ResetAll => "reset_all",
            AllocOp::Release => "release",
        }
    }
}

/// Successful dispatch result. See [`AllocOp`] for which operation
/// produces which shape.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AllocReply {
    Block(RawBlock),
    Bytes(usize),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AllocError {
    /// The provider could not satisfy an allocation of `size` bytes.
    OutOfMemory { size: usize },
    /// The request exceeds a chunked provider's per-chunk capacity.
    ChunkOverflow { size: usize, max_size: usize },
    /// The provider does not implement this operation.
    Unsupported { provider: &'static str, op: &'static str },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::OutOfMemory { size } => {
                write!(f, "allocation of {size} bytes failed")
            }
            AllocError::ChunkOverflow { size, max_size } => {
                write!(f, "requested {size} bytes, chunk capacity is {max_size}")
            }
            AllocError::Unsupported { provider, op } => {
                write!(f, "{provider} allocator does not support {op}")
            }
        }
    }
}

impl std::error::Error for AllocError {}

/// Hands out instance ids for trace output. 0 is reserved for the
/// system allocator.
static NEXT_ALLOCATOR_ID: AtomicU32 = AtomicU32::new(1);

pub(crate) fn next_allocator_id() -> u32 {
    NEXT_ALLOCATOR_ID.fetch_add(1, Ordering::Relaxed)
}

/// An allocation capability: opaque provider state behind one dispatch
/// function.
///
/// `dispatch` takes `&self` so one provider can back several consumers;
/// providers use interior mutability and are single-threaded. Blanket
/// impls forward through `&A` and `Rc<A>` for sharing.
///
/// Callers go through the convenience wrappers, which destructure the
/// reply and emit a trace line per call. A provider returning the wrong
/// reply shape for an operation is a broken contract and panics there.
pub trait Allocator {
    fn dispatch(&self, op: AllocOp) -> Result<AllocReply, AllocError>;

    /// Short provider name used in trace output.
    fn name(&self) -> &'static str;

    /// Provider instance id used in trace output.
    fn id(&self) -> u32;

    fn allocate(&self, size: usize) -> Result<RawBlock, AllocError> {
        let block = expect_block(self, "allocate", self.dispatch(AllocOp::Allocate { size })?);
        log::trace!(
            "{}-{} allocated {} at {:p}",
            self.name(),
            self.id(),
            size,
            block.as_ptr()
        );
        Ok(block)
    }

    fn reallocate(&self, block: RawBlock, new_size: usize) -> Result<RawBlock, AllocError> {
        let old_size = block.size();
        let old_ptr = block.as_ptr();
        let new = expect_block(
            self,
            "reallocate",
            self.dispatch(AllocOp::Reallocate { block, new_size })?,
        );
        log::trace!(
            "{}-{} reallocated {} -> {} at {:p} -> {:p}",
            self.name(),
            self.id(),
            old_size,
            new_size,
            old_ptr,
            new.as_ptr()
        );
        Ok(new)
    }

    fn deallocate(&self, block: RawBlock) -> Result<usize, AllocError> {
        let old_size = block.size();
        let old_ptr = block.as_ptr();
        let echoed = expect_bytes(
            self,
            "deallocate",
            self.dispatch(AllocOp::Deallocate { block })?,
        );
        log::trace!(
            "{}-{} deallocated {} at {:p}",
            self.name(),
            self.id(),
            old_size,
            old_ptr
        );
        Ok(echoed)
    }

    fn reserve_all(&self) -> Result<RawBlock, AllocError> {
        let block = expect_block(self, "reserve_all", self.dispatch(AllocOp::ReserveAll)?);
        log::trace!(
            "{}-{} reserved all at {:p}",
            self.name(),
            self.id(),
            block.as_ptr()
        );
        Ok(block)
    }

    fn reset_all(&self) -> Result<usize, AllocError> {
        let reclaimed = expect_bytes(self, "reset_all", self.dispatch(AllocOp::ResetAll)?);
        log::trace!(
            "{}-{} reset all ({} bytes)",
            self.name(),
            self.id(),
            reclaimed
        );
        Ok(reclaimed)
    }

    fn release(&self) -> Result<usize, AllocError> {
        let released = expect_bytes(self, "release", self.dispatch(AllocOp::Release)?);
        log::trace!(
            "{}-{} released all ({} bytes)",
            self.name(),
            self.id(),
            released
        );
        Ok(released)
    }
}

fn expect_block<A: Allocator + ?Sized>(a: &A, op: &'static str, reply: AllocReply) -> RawBlock {
    match reply {
        AllocReply::Block(block) => block,
        other => panic!("{}: {op} must reply with a block, got {other:?}", a.name()),
    }
}

fn expect_bytes<A: Allocator + ?Sized>(a: &A, op: &'static str, reply: AllocReply) -> usize {
    match reply {
        AllocReply::Bytes(n) => n,
        other => panic!("{}: {op} must reply with a byte count, got {other:?}", a.name()),
    }
}

impl<A: Allocator + ?Sized> Allocator for &A {
    fn dispatch(&self, op: AllocOp) -> Result<AllocReply, AllocError> {
        (**self).dispatch(op)
    }
    fn name(&self) -> &'static str {
        (**self).name()
    }
    fn id(&self) -> u32 {
        (**self).id()
    }
}

impl<A: Allocator + ?Sized> Allocator for std::rc::Rc<A> {
    fn dispatch(&self, op: AllocOp) -> Result<AllocReply, AllocError> {
        (**self).dispatch(op)
    }
    fn name(&self) -> &'static str {
        (**self).name()
    }
    fn id(&self) -> u32 {
        (**self).id()
    }
}
