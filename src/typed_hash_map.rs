//! Typed facade over the raw engine for `Copy` key/value types.

use core::marker::PhantomData;
use core::mem::size_of;
use core::ptr;
use core::slice;

use crate::alloc::Allocator;
use crate::key_ops::{ByteKeys, KeyOps};
use crate::raw_hash_map::{MapError, RawHashMap, SetOutcome, DEFAULT_LOAD_FACTOR};

fn bytes_of<T: Copy>(value: &T) -> &[u8] {
    unsafe { slice::from_raw_parts(value as *const T as *const u8, size_of::<T>()) }
}

fn read<T: Copy>(bytes: &[u8]) -> T {
    debug_assert_eq!(bytes.len(), size_of::<T>());
    // Rows are packed bytes with no alignment guarantee.
    unsafe { ptr::read_unaligned(bytes.as_ptr() as *const T) }
}

/// Typed map over [`RawHashMap`] with `size_of` strides.
///
/// Keys and values cross the boundary as their raw object
/// representation: no destructors run, values are copied out whole, and
/// keys are hashed and compared bytewise. Key types must not contain
/// padding bytes (primitives, byte arrays, or `#[repr(C)]` structs of
/// uniformly sized fields); padding would take part in hashing with
/// unspecified contents.
pub struct TypedHashMap<K: Copy, V: Copy, A: Allocator, O: KeyOps = ByteKeys> {
    raw: RawHashMap<A, O>,
    _entry: PhantomData<(K, V)>,
}

impl<K: Copy, V: Copy, A: Allocator> TypedHashMap<K, V, A, ByteKeys> {
    /// Table with the default load factor.
    pub fn new(allocator: A, capacity: usize) -> Result<Self, MapError> {
        Self::with_load_factor(allocator, capacity, DEFAULT_LOAD_FACTOR)
    }

    pub fn with_load_factor(
        allocator: A,
        capacity: usize,
        load_factor: f32,
    ) -> Result<Self, MapError> {
        Ok(Self {
            raw: RawHashMap::new(
                allocator,
                capacity,
                load_factor,
                size_of::<K>(),
                size_of::<V>(),
            )?,
            _entry: PhantomData,
        })
    }
}

impl<K: Copy, V: Copy, A: Allocator, O: KeyOps> TypedHashMap<K, V, A, O> {
    pub fn with_key_ops(
        allocator: A,
        capacity: usize,
        load_factor: f32,
        key_ops: O,
    ) -> Result<Self, MapError> {
        Ok(Self {
            raw: RawHashMap::with_key_ops(
                allocator,
                capacity,
                load_factor,
                size_of::<K>(),
                size_of::<V>(),
                key_ops,
            )?,
            _entry: PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.raw.count()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.raw.get(bytes_of(key)).map(read)
    }

    pub fn set(&mut self, key: K, value: V) -> Result<SetOutcome, MapError> {
        self.raw.set(bytes_of(&key), bytes_of(&value))
    }

    pub fn del(&mut self, key: &K) -> Option<V> {
        self.raw.del(bytes_of(key)).map(|bytes| read(&bytes[..]))
    }

    pub fn set_load_factor(&mut self, load_factor: f32) -> Result<(), MapError> {
        self.raw.set_load_factor(load_factor)
    }

    pub fn set_grow_factor(&mut self, grow_factor: f32) -> Result<(), MapError> {
        self.raw.set_grow_factor(grow_factor)
    }

    /// Keys in row order (insertion-compacted, not probe order).
    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.raw.keys().map(|bytes| read(bytes))
    }

    /// Values in row order.
    pub fn values(&self) -> impl Iterator<Item = V> + '_ {
        self.raw.values().map(|bytes| read(bytes))
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, V)> + '_ {
        self.raw.iter().map(|(k, v)| (read(k), read(v)))
    }

    /// Escape hatch to the untyped engine.
    pub fn raw(&self) -> &RawHashMap<A, O> {
        &self.raw
    }
}
