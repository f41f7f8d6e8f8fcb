//! The thread-safe slab allocator (C1): exclusive state behind one mutex,
//! consumed through per-thread [`super::cache::Cache`]s.

use super::batch::Batch;
use super::config::{CacheConfig, SlabConfig};
use super::header::{Geometry, SlabHeader};
use crate::error::{Error, Result};
use std::ptr::NonNull;
use std::sync::Mutex;

struct Inner {
    /// Head of the singly linked list of active slabs.
    active: *mut SlabHeader,
    active_count: usize,
    used_objs: usize,
}

// SAFETY: all access to `Inner` goes through `Allocator::lock`, which holds
// the mutex for the duration; the raw pointers inside never escape it
// without the lock held.
unsafe impl Send for Inner {}

/// Owns every slab it has ever mapped. Construct one [`super::cache::Cache`]
/// per thread that borrows it; the allocator must outlive every cache.
pub struct Allocator {
    inner: Mutex<Inner>,
    geometry: Geometry,
    retire_threshold: usize,
    retire_percent: f32,
    pub(crate) cache_config: CacheConfig,
}

impl Allocator {
    /// Builds an allocator. Config defaults fill in the documented batch
    /// sizes and retirement tuning; `slab_config.obj_size`/`obj_align` are
    /// mandatory.
    pub fn new(slab_config: SlabConfig, cache_config: CacheConfig) -> Result<Self> {
        cache_config.validate()?;
        let geometry = Geometry::compute(&slab_config)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                active: std::ptr::null_mut(),
                active_count: 0,
                used_objs: 0,
            }),
            geometry,
            retire_threshold: slab_config.retire_threshold,
            retire_percent: slab_config.retire_percent,
            cache_config,
        })
    }

    pub fn used_objs(&self) -> usize {
        self.inner.lock().unwrap().used_objs
    }

    pub fn active_slab_count(&self) -> usize {
        self.inner.lock().unwrap().active_count
    }

    pub fn objects_per_slab(&self) -> usize {
        self.geometry.n
    }

    fn add_slab(&self, inner: &mut Inner) -> Result<()> {
        let header = SlabHeader::create(&self.geometry)?;
        unsafe {
            (*header.as_ptr()).next = inner.active;
        }
        inner.active = header.as_ptr();
        inner.active_count += 1;
        Ok(())
    }

    /// Alloc slow path: fills `batch` up to `target` objects under the
    /// lock, creating slabs as needed, then retires if warranted. Returns
    /// the filled batch for the caller to `unload` into its cache's free
    /// list outside the lock.
    pub(crate) fn alloc_slow(&self, target: usize) -> Result<Batch> {
        let mut batch = Batch::new(target);
        let mut inner = self.inner.lock().unwrap();

        let available = Self::count_free(&inner);
        if available < target {
            let shortfall = target - available;
            let slabs_needed = shortfall.div_ceil(self.geometry.n);
            for _ in 0..slabs_needed {
                self.add_slab(&mut inner)?;
            }
        }

        let mut cursor = inner.active;
        while !batch.met_target() && !cursor.is_null() {
            let slab = unsafe { &mut *cursor };
            let remaining = target.saturating_sub(batch.len());
            if remaining > 0 {
                let took = batch.load(&mut slab.free);
                slab.used_count += took;
                inner.used_objs += took;
            }
            cursor = slab.next;
        }

        if self.ready_for_retire(&inner) {
            self.retire_slabs(&mut inner);
        }

        Ok(batch)
    }

    /// Free slow path: routes each object in `batch` back to its owning
    /// slab, destroying any retired slab that drains to zero.
    pub(crate) fn free_slow(&self, batch: &mut Batch) {
        let mut inner = self.inner.lock().unwrap();
        while let Some(obj) = batch.take_one() {
            let header = SlabHeader::of(obj, &self.geometry);
            let slab = unsafe { &mut *header.as_ptr() };
            unsafe { slab.free.free(obj) };
            slab.used_count -= 1;
            inner.used_objs -= 1;

            if slab.retired && slab.used_count == 0 {
                unsafe { SlabHeader::destroy(header, &self.geometry) };
            }
        }
    }

    fn count_free(inner: &Inner) -> usize {
        let mut cursor = inner.active;
        let mut total = 0;
        while !cursor.is_null() {
            let slab = unsafe { &*cursor };
            total += slab.free.len();
            cursor = slab.next;
        }
        total
    }

    fn ready_for_retire(&self, inner: &Inner) -> bool {
        if inner.active_count == 0 {
            return false;
        }
        let capacity = (inner.active_count * self.geometry.n) as f32;
        (inner.used_objs as f32 / capacity) <= self.retire_percent
    }

    /// Triggers a retirement scan regardless of current occupancy.
    pub fn explicit_retire(&self) {
        let mut inner = self.inner.lock().unwrap();
        self.retire_slabs(&mut inner);
    }

    fn retire_slabs(&self, inner: &mut Inner) {
        let threshold = self.retire_threshold;
        let mut cursor = inner.active;
        let mut prev: *mut SlabHeader = std::ptr::null_mut();
        log::debug!(
            "slab: retirement scan over {} active slabs ({} used objects)",
            inner.active_count,
            inner.used_objs
        );

        while !cursor.is_null() {
            let slab = unsafe { &mut *cursor };
            let next = slab.next;

            if slab.used_count == 0 {
                Self::unlink(inner, prev, cursor);
                inner.active_count -= 1;
                unsafe { SlabHeader::destroy(NonNull::new_unchecked(cursor), &self.geometry) };
            } else if slab.used_count <= threshold {
                Self::unlink(inner, prev, cursor);
                inner.active_count -= 1;
                slab.retired = true;
                slab.next = std::ptr::null_mut();
                log::debug!(
                    "slab: retired slab at {:p} ({} objects still live)",
                    cursor,
                    slab.used_count
                );
                // prev stays the same; cursor has been unlinked.
            } else {
                prev = cursor;
            }

            cursor = next;
        }
    }

    fn unlink(inner: &mut Inner, prev: *mut SlabHeader, node: *mut SlabHeader) {
        let next = unsafe { (*node).next };
        if prev.is_null() {
            inner.active = next;
        } else {
            unsafe { (*prev).next = next };
        }
    }
}

impl Drop for Allocator {
    fn drop(&mut self) {
        // Caller contract: the allocator is quiescent (no cache can reach
        // it). Any slab still retired-but-live at this point was kept
        // alive by a cache the caller failed to fully release first; this
        // is a caller error, not something the allocator can detect.
        let mut inner = self.inner.lock().unwrap();
        let mut cursor = inner.active;
        inner.active = std::ptr::null_mut();
        inner.active_count = 0;
        while !cursor.is_null() {
            let next = unsafe { (*cursor).next };
            unsafe { SlabHeader::destroy(NonNull::new_unchecked(cursor), &self.geometry) };
            cursor = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slab::cache::Cache;

    fn alloc_for_test() -> Allocator {
        Allocator::new(
            SlabConfig::new(16, 8)
                .with_pages_per_slab(1)
                .with_retire_threshold(2),
            CacheConfig {
                cap: 8,
                acquire: 4,
                release: 4,
            },
        )
        .unwrap()
    }

    #[test]
    fn slab_roundtrip_scenario() {
        let alloc = alloc_for_test();
        let mut cache = Cache::new(&alloc);

        let mut ptrs = Vec::new();
        for i in 0..20u32 {
            let p = cache.alloc().unwrap();
            unsafe { (p.as_ptr() as *mut u32).write(i) };
            ptrs.push(p);
        }
        for (i, p) in ptrs.iter().enumerate() {
            let v = unsafe { *(p.as_ptr() as *const u32) };
            assert_eq!(v, i as u32);
        }
        for p in ptrs.into_iter().rev() {
            cache.free(p);
        }

        cache.full_release();
        alloc.explicit_retire();
        drop(cache);
        drop(alloc);
    }

    #[test]
    fn batch_discipline_after_new_slab() {
        let alloc = alloc_for_test();
        let mut cache = Cache::new(&alloc);
        let _p = cache.alloc().unwrap();
        assert_eq!(alloc.active_slab_count(), 1);
        assert_eq!(alloc.used_objs(), cache.acquired_count());
    }
}
