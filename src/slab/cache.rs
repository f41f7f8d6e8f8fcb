//! Thread-local cache (C1): a bag of unused objects belonging to exactly
//! one allocator, used by exactly one thread.
//!
//! `Cache<'a>` borrows its allocator for its entire lifetime. This is a
//! deliberate departure from the reference design, which only required the
//! caller to guarantee the allocator was quiescent before destroying it;
//! here the borrow checker enforces that no `Cache` can outlive its
//! `Allocator`, turning a runtime discipline into a compile-time one.

use super::allocator::Allocator;
use super::batch::Batch;
use crate::error::Result;
use crate::freelist::FreeList;
use std::ptr::NonNull;

pub struct Cache<'a> {
    alloc: &'a Allocator,
    free: FreeList,
}

impl<'a> Cache<'a> {
    /// Pairs a new cache with `alloc`. A cache starts empty; its first
    /// `alloc()` call takes the slow path.
    pub fn new(alloc: &'a Allocator) -> Self {
        Self {
            alloc,
            free: FreeList::empty(),
        }
    }

    /// Fast path pops the free list; when empty, takes the slow path under
    /// the allocator's lock.
    pub fn alloc(&mut self) -> Result<NonNull<u8>> {
        if let Some(ptr) = self.free.alloc() {
            return Ok(ptr);
        }
        let mut batch = self.alloc.alloc_slow(self.alloc.cache_config.acquire)?;
        batch.unload(&mut self.free);
        Ok(self
            .free
            .alloc()
            .expect("alloc slow path must fill at least one object"))
    }

    /// Fast path pushes onto the free list; when it reaches `cache_cap`,
    /// the slow path drains `cache_release` objects back to the allocator
    /// under the lock.
    ///
    /// # Safety
    /// `ptr` must have been returned by this cache's `alloc` and not
    /// already freed.
    pub fn free(&mut self, ptr: NonNull<u8>) {
        unsafe { self.free.free(ptr) };
        if self.free.len() >= self.alloc.cache_config.cap {
            let mut batch = Batch::new(self.alloc.cache_config.release);
            batch.load(&mut self.free);
            self.alloc.free_slow(&mut batch);
        }
    }

    /// Releases everything the cache holds and acquires a fresh batch of
    /// size `cache_acquire`.
    pub fn refresh(&mut self) -> Result<()> {
        self.full_release();
        let mut batch = self.alloc.alloc_slow(self.alloc.cache_config.acquire)?;
        batch.unload(&mut self.free);
        Ok(())
    }

    /// Drains the cache entirely back to the allocator.
    pub fn full_release(&mut self) {
        if self.free.is_empty() {
            return;
        }
        let mut batch = Batch::new(self.free.len());
        batch.load(&mut self.free);
        self.alloc.free_slow(&mut batch);
    }

    /// Number of objects currently held by this cache, not yet handed out.
    pub fn acquired_count(&self) -> usize {
        self.free.len()
    }
}

impl Drop for Cache<'_> {
    fn drop(&mut self) {
        self.full_release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slab::config::{CacheConfig, SlabConfig};

    #[test]
    fn cache_drop_releases_everything() {
        let alloc = Allocator::new(
            SlabConfig::new(16, 8).with_pages_per_slab(1),
            CacheConfig {
                cap: 8,
                acquire: 4,
                release: 4,
            },
        )
        .unwrap();
        {
            let mut cache = Cache::new(&alloc);
            let _ = cache.alloc().unwrap();
            let _ = cache.alloc().unwrap();
        }
        // Dropped: all acquired objects returned to slabs.
        assert_eq!(alloc.used_objs(), 0);
    }

    #[test]
    fn two_caches_do_not_hand_out_overlapping_objects() {
        let alloc = Allocator::new(
            SlabConfig::new(16, 8).with_pages_per_slab(1),
            CacheConfig {
                cap: 8,
                acquire: 4,
                release: 4,
            },
        )
        .unwrap();
        let mut a = Cache::new(&alloc);
        let mut b = Cache::new(&alloc);

        let pa = a.alloc().unwrap();
        let pb = b.alloc().unwrap();
        assert_ne!(pa.as_ptr(), pb.as_ptr());
        a.free(pa);
        b.free(pb);
    }
}
