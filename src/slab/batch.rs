//! Batches: the unit of ownership transfer between a [`super::cache::Cache`]
//! and the [`super::allocator::Allocator`] it belongs to.
//!
//! A batch is a linked-list fragment carrying a target count. No list is
//! ever partially owned by two places at once — this is what lets the fast
//! paths in `Cache::alloc`/`Cache::free` run without touching the allocator
//! lock.

use crate::freelist::FreeList;
use std::ptr::NonNull;

pub struct Batch {
    chain: FreeList,
    target: usize,
}

impl Batch {
    pub fn new(target: usize) -> Self {
        Self {
            chain: FreeList::empty(),
            target,
        }
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// True once the batch holds at least `target` objects.
    pub fn met_target(&self) -> bool {
        self.chain.len() >= self.target
    }

    /// Moves up to `target - current_count` nodes from `source` into the
    /// batch, splicing in O(1). Returns how many were taken.
    pub fn load(&mut self, source: &mut FreeList) -> usize {
        let remaining = self.target.saturating_sub(self.chain.len());
        if remaining == 0 {
            return 0;
        }
        match source.take_chain(remaining) {
            Some((head, tail, n)) => {
                unsafe { self.chain.prepend_chain(head, tail, n) };
                n
            }
            None => 0,
        }
    }

    /// Prepends the entire batch onto `dest` in O(1) and empties the batch.
    pub fn unload(&mut self, dest: &mut FreeList) {
        if self.chain.is_empty() {
            return;
        }
        if let Some((head, tail, n)) = self.chain.take_chain(self.chain.len()) {
            unsafe { dest.prepend_chain(head, tail, n) };
        }
    }

    /// Removes and returns one object from the batch, for code that must
    /// process objects individually (the free slow path, which routes each
    /// object back to the slab it came from).
    pub fn take_one(&mut self) -> Option<NonNull<u8>> {
        self.chain.alloc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_respects_target_and_availability() {
        let mut buf = vec![0u8; 16 * 10];
        let mut source = unsafe { FreeList::init(buf.as_mut_ptr(), 16, 10) };
        let mut batch = Batch::new(4);

        let took = batch.load(&mut source);
        assert_eq!(took, 4);
        assert!(batch.met_target());
        assert_eq!(source.len(), 6);

        let took_again = batch.load(&mut source);
        assert_eq!(took_again, 0);
    }

    #[test]
    fn unload_moves_everything_and_empties_batch() {
        let mut buf = vec![0u8; 16 * 10];
        let mut source = unsafe { FreeList::init(buf.as_mut_ptr(), 16, 10) };
        let mut dest = FreeList::empty();
        let mut batch = Batch::new(5);
        batch.load(&mut source);

        batch.unload(&mut dest);
        assert!(batch.is_empty());
        assert_eq!(dest.len(), 5);
        assert_eq!(source.len(), 5);
    }
}
