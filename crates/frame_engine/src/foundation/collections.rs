//! Specialized collection types
//!
//! [`GrowableBuffer`] is the contiguous container behind every dynamically
//! sized list in the renderer: layout bindings, pending descriptor writes and
//! the descriptor allocator's sub-pool arrays.
//!
//! Growth is strictly geometric. A buffer starts at [`INITIAL_CAPACITY`]
//! elements and doubles whenever an insertion would exceed its capacity, so the
//! capacity is always `INITIAL_CAPACITY * 2^k` for the smallest `k` that fits
//! the largest count the buffer has held. Capacity never shrinks implicitly.
//!
//! Every index-taking operation uses the same out-of-range policy: reads return
//! `None`, mutations return [`BufferError::OutOfRange`]. Nothing is silently
//! ignored.

use std::ops::{Deref, DerefMut};
use thiserror::Error;

/// Capacity of a freshly allocated buffer, in elements
pub const INITIAL_CAPACITY: usize = 8;

/// Growable buffer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Growing the backing allocation failed; the buffer is unchanged
    #[error("Failed to allocate room for {requested} elements")]
    AllocationFailed {
        /// Capacity (in elements) that could not be allocated
        requested: usize,
    },

    /// Index outside the valid range for the operation
    #[error("Index {index} out of range for buffer of {count} elements")]
    OutOfRange {
        /// The index that was passed in
        index: usize,
        /// Logical element count at the time of the call
        count: usize,
    },
}

/// Contiguous, geometrically growing element buffer
///
/// Unlike `Vec`, the buffer tracks its own logical capacity so the growth
/// policy is exact and observable: `capacity()` reports what the buffer asked
/// for, not what the allocator happened to hand back.
///
/// # Ownership
/// The buffer is mutated only through `&mut self`; there is no interior
/// mutability and no shared writer.
#[derive(Debug, Clone)]
pub struct GrowableBuffer<T> {
    data: Vec<T>,
    capacity: usize,
}

impl<T> GrowableBuffer<T> {
    /// Create an empty buffer with [`INITIAL_CAPACITY`] slots
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(INITIAL_CAPACITY),
            capacity: INITIAL_CAPACITY,
        }
    }

    /// Create an empty buffer, reporting allocation failure instead of aborting
    pub fn try_new() -> Result<Self, BufferError> {
        let mut data = Vec::new();
        data.try_reserve_exact(INITIAL_CAPACITY)
            .map_err(|_| BufferError::AllocationFailed { requested: INITIAL_CAPACITY })?;

        Ok(Self {
            data,
            capacity: INITIAL_CAPACITY,
        })
    }

    /// Number of live elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer holds no elements
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Physical capacity in elements (always `>= len()`)
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size of one element in bytes
    pub const fn stride(&self) -> usize {
        std::mem::size_of::<T>()
    }

    /// Grow capacity by doubling until `required` elements fit
    ///
    /// On failure the buffer keeps its previous allocation and contents.
    fn grow_to(&mut self, required: usize) -> Result<(), BufferError> {
        if required <= self.capacity {
            return Ok(());
        }

        let mut new_capacity = self.capacity.max(1);
        while new_capacity < required {
            new_capacity = new_capacity
                .checked_mul(2)
                .ok_or(BufferError::AllocationFailed { requested: required })?;
        }

        self.data
            .try_reserve_exact(new_capacity - self.data.len())
            .map_err(|_| BufferError::AllocationFailed { requested: new_capacity })?;
        self.capacity = new_capacity;
        Ok(())
    }

    /// Logical count after adding `extra` elements
    fn count_after(&self, extra: usize) -> Result<usize, BufferError> {
        self.data
            .len()
            .checked_add(extra)
            .ok_or(BufferError::AllocationFailed { requested: usize::MAX })
    }

    /// Append one element at the end
    pub fn push(&mut self, element: T) -> Result<(), BufferError> {
        self.grow_to(self.count_after(1)?)?;
        self.data.push(element);
        Ok(())
    }

    /// Insert `element` at `index`, shifting later elements one slot right
    ///
    /// `index == len()` appends. Anything larger is rejected.
    pub fn insert(&mut self, element: T, index: usize) -> Result<(), BufferError> {
        let count = self.data.len();
        if index > count {
            return Err(BufferError::OutOfRange { index, count });
        }

        self.grow_to(self.count_after(1)?)?;
        self.data.insert(index, element);
        Ok(())
    }

    /// Remove and return the element at `index`, shifting later elements left
    pub fn remove(&mut self, index: usize) -> Result<T, BufferError> {
        let count = self.data.len();
        if index >= count {
            return Err(BufferError::OutOfRange { index, count });
        }

        Ok(self.data.remove(index))
    }

    /// Remove and return the last element
    pub fn pop(&mut self) -> Option<T> {
        self.data.pop()
    }

    /// Element at `index`, or `None` when there is no such element
    pub fn get(&self, index: usize) -> Option<&T> {
        self.data.get(index)
    }

    /// Mutable element at `index`, or `None` when there is no such element
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.data.get_mut(index)
    }

    /// Overwrite the element at `index`
    pub fn set(&mut self, index: usize, element: T) -> Result<(), BufferError> {
        let count = self.data.len();
        match self.data.get_mut(index) {
            Some(slot) => {
                *slot = element;
                Ok(())
            }
            None => Err(BufferError::OutOfRange { index, count }),
        }
    }

    /// Drop every element; capacity is kept for reuse
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Remove every element, yielding them in order
    pub fn drain_all(&mut self) -> std::vec::Drain<'_, T> {
        self.data.drain(..)
    }

    /// Live elements as a slice
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Live elements as a mutable slice
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T: Clone> GrowableBuffer<T> {
    /// Append a run of elements, growing once to fit all of them
    pub fn append(&mut self, elements: &[T]) -> Result<(), BufferError> {
        self.grow_to(self.count_after(elements.len())?)?;
        self.data.extend_from_slice(elements);
        Ok(())
    }
}

impl<T: Default> GrowableBuffer<T> {
    /// Extend the logical count by `count` default elements
    ///
    /// Returns the newly exposed region so a producer can fill it in place
    /// before anyone reads it.
    pub fn reserve(&mut self, count: usize) -> Result<&mut [T], BufferError> {
        let old_count = self.data.len();
        let new_count = self.count_after(count)?;
        self.grow_to(new_count)?;
        self.data.resize_with(new_count, T::default);
        Ok(&mut self.data[old_count..])
    }

    /// Set the logical count, growing geometrically or truncating
    pub fn set_len(&mut self, count: usize) -> Result<(), BufferError> {
        if count <= self.data.len() {
            self.data.truncate(count);
            return Ok(());
        }

        self.grow_to(count)?;
        self.data.resize_with(count, T::default);
        Ok(())
    }
}

impl<T> Default for GrowableBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deref for GrowableBuffer<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<T> DerefMut for GrowableBuffer<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<'a, T> IntoIterator for &'a GrowableBuffer<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected_capacity(count: usize) -> usize {
        let mut capacity = INITIAL_CAPACITY;
        while capacity < count {
            capacity *= 2;
        }
        capacity
    }

    #[test]
    fn test_new_buffer_starts_at_initial_capacity() {
        let buffer: GrowableBuffer<u32> = GrowableBuffer::new();
        assert_eq!(buffer.capacity(), INITIAL_CAPACITY);
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.stride(), 4);

        let buffer: GrowableBuffer<u64> = GrowableBuffer::try_new().unwrap();
        assert_eq!(buffer.capacity(), INITIAL_CAPACITY);
        assert_eq!(buffer.stride(), 8);
    }

    #[test]
    fn test_capacity_is_smallest_doubling_that_fits() {
        let mut buffer = GrowableBuffer::new();
        for i in 0..100u32 {
            if i % 3 == 0 {
                buffer.insert(i, buffer.len() / 2).unwrap();
            } else {
                buffer.push(i).unwrap();
            }
            assert!(buffer.len() <= buffer.capacity());
            assert_eq!(buffer.capacity(), expected_capacity(buffer.len()));
        }
    }

    #[test]
    fn test_append_grows_in_one_step() {
        let mut buffer = GrowableBuffer::new();
        buffer.append(&[1u8; 5]).unwrap();
        assert_eq!(buffer.capacity(), 8);

        buffer.append(&[2u8; 30]).unwrap();
        assert_eq!(buffer.len(), 35);
        assert_eq!(buffer.capacity(), 64);
        assert_eq!(buffer[4], 1);
        assert_eq!(buffer[5], 2);
    }

    #[test]
    fn test_capacity_never_shrinks() {
        let mut buffer = GrowableBuffer::new();
        buffer.append(&[0u16; 20]).unwrap();
        assert_eq!(buffer.capacity(), 32);

        buffer.clear();
        assert_eq!(buffer.capacity(), 32);
        buffer.set_len(2).unwrap();
        assert_eq!(buffer.capacity(), 32);
    }

    #[test]
    fn test_insert_then_remove_restores_contents() {
        let original: Vec<i32> = (0..11).collect();
        for index in 0..=original.len() {
            let mut buffer = GrowableBuffer::new();
            buffer.append(&original).unwrap();

            buffer.insert(-1, index).unwrap();
            assert_eq!(buffer[index], -1);
            assert_eq!(buffer.remove(index).unwrap(), -1);
            assert_eq!(buffer.as_slice(), original.as_slice());
        }
    }

    #[test]
    fn test_insert_rejects_index_past_end() {
        let mut buffer = GrowableBuffer::new();
        buffer.append(&[1, 2, 3]).unwrap();
        assert_eq!(
            buffer.insert(9, 4),
            Err(BufferError::OutOfRange { index: 4, count: 3 })
        );
        assert_eq!(buffer.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_remove_out_of_range_is_an_error() {
        let mut buffer = GrowableBuffer::new();
        buffer.push(7).unwrap();
        assert_eq!(
            buffer.remove(1),
            Err(BufferError::OutOfRange { index: 1, count: 1 })
        );
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_get_after_set() {
        let mut buffer = GrowableBuffer::new();
        buffer.append(&[0u32; 12]).unwrap();
        for i in 0..12 {
            buffer.set(i, i as u32 * 10).unwrap();
            assert_eq!(buffer.get(i), Some(&(i as u32 * 10)));
        }
    }

    #[test]
    fn test_get_at_or_past_count_is_none() {
        let mut buffer = GrowableBuffer::new();
        buffer.append(&[1, 2]).unwrap();
        assert_eq!(buffer.get(2), None);
        assert_eq!(buffer.get(7), None);
        assert_eq!(buffer.set(2, 5), Err(BufferError::OutOfRange { index: 2, count: 2 }));
    }

    #[test]
    fn test_reserve_exposes_new_region() {
        let mut buffer = GrowableBuffer::new();
        buffer.append(&[1u32, 2, 3]).unwrap();

        let region = buffer.reserve(10).unwrap();
        assert_eq!(region.len(), 10);
        for (i, slot) in region.iter_mut().enumerate() {
            *slot = 100 + i as u32;
        }

        assert_eq!(buffer.len(), 13);
        assert_eq!(buffer.capacity(), 16);
        assert_eq!(buffer[2], 3);
        assert_eq!(buffer[3], 100);
        assert_eq!(buffer[12], 109);
    }

    #[test]
    fn test_oversized_growth_fails_without_touching_contents() {
        let mut buffer = GrowableBuffer::new();
        buffer.push(1u32).unwrap();

        assert!(matches!(
            buffer.reserve(usize::MAX),
            Err(BufferError::AllocationFailed { .. })
        ));
        assert!(matches!(
            buffer.reserve(usize::MAX / 2),
            Err(BufferError::AllocationFailed { .. })
        ));
        assert!(buffer.set_len(usize::MAX).is_err());

        assert_eq!(buffer.as_slice(), &[1]);
        assert_eq!(buffer.capacity(), INITIAL_CAPACITY);
        buffer.push(2).unwrap();
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_drain_and_pop() {
        let mut buffer = GrowableBuffer::new();
        buffer.append(&["a", "b", "c"]).unwrap();
        assert_eq!(buffer.pop(), Some("c"));

        let drained: Vec<_> = buffer.drain_all().collect();
        assert_eq!(drained, vec!["a", "b"]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.pop(), None);
    }
}
