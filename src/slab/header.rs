//! Slab geometry and the header embedded at the front of every slab
//! mapping.

use super::config::SlabConfig;
use super::platform;
use crate::error::{Error, Result};
use crate::freelist::FreeList;
use crate::layout::round_up;
use std::ptr::NonNull;

/// System page size, read once via `sysconf`.
pub(crate) fn page_size() -> usize {
    static PAGE_SIZE: std::sync::OnceLock<usize> = std::sync::OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if sz <= 0 { 4096 } else { sz as usize }
    })
}

/// Derived geometry for a given [`SlabConfig`]: total slab size, the
/// object region's padded stride, the object count per slab, and the byte
/// offset the object region starts at.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Geometry {
    pub s: usize,
    pub slab_offset: usize,
    pub padded_obj_size: usize,
    pub n: usize,
}

impl Geometry {
    pub fn compute(config: &SlabConfig) -> Result<Self> {
        config.validate()?;
        let s = config.pages_per_slab * page_size();
        let padded_obj_size =
            round_up(config.obj_size, config.obj_align).max(std::mem::size_of::<usize>());
        let slab_offset = round_up(std::mem::size_of::<SlabHeader>(), config.obj_align);
        if slab_offset >= s {
            return Err(Error::BadConf);
        }
        let n = (s - slab_offset) / padded_obj_size;
        if n <= config.retire_threshold {
            return Err(Error::BadConf);
        }
        Ok(Self {
            s,
            slab_offset,
            padded_obj_size,
            n,
        })
    }
}

/// The header occupying the first `slab_offset` bytes of every slab.
///
/// `obj_ptr & ~(S-1)` always recovers a pointer to this struct: the slab
/// mapping is obtained `S`-aligned for exactly that reason.
#[repr(C)]
pub(crate) struct SlabHeader {
    pub used_count: usize,
    pub free: FreeList,
    pub next: *mut SlabHeader,
    pub retired: bool,
    pub capacity: usize,
}

impl SlabHeader {
    /// Maps a fresh `S`-aligned slab and threads its object region into a
    /// free list. Returns a pointer to the header at the front of the
    /// mapping.
    pub fn create(geometry: &Geometry) -> Result<NonNull<SlabHeader>> {
        let region = unsafe { platform::slab_map(geometry.s) };
        if region.is_null() {
            return Err(Error::Sys(std::io::Error::last_os_error()));
        }
        let header_ptr = region as *mut SlabHeader;
        let free = unsafe {
            FreeList::init(
                region.add(geometry.slab_offset),
                geometry.padded_obj_size,
                geometry.n,
            )
        };
        unsafe {
            header_ptr.write(SlabHeader {
                used_count: 0,
                free,
                next: std::ptr::null_mut(),
                retired: false,
                capacity: geometry.n,
            });
        }
        log::debug!(
            "slab: mapped new slab at {:p} ({} objects, {} bytes)",
            header_ptr,
            geometry.n,
            geometry.s
        );
        Ok(unsafe { NonNull::new_unchecked(header_ptr) })
    }

    /// Unmaps the slab. Caller must ensure `used_count == 0` and the header
    /// has already been unlinked from every list.
    ///
    /// # Safety
    /// `header` must be a live slab created by [`SlabHeader::create`] with
    /// the same `geometry.s`, not reachable from anywhere else afterward.
    pub unsafe fn destroy(header: NonNull<SlabHeader>, geometry: &Geometry) {
        log::debug!("slab: unmapping slab at {:p}", header.as_ptr());
        unsafe {
            std::ptr::drop_in_place(header.as_ptr());
            platform::slab_unmap(header.as_ptr() as *mut u8, geometry.s);
        }
    }

    /// Recovers the owning slab header from an object pointer handed out by
    /// this slab.
    pub fn of(obj: NonNull<u8>, geometry: &Geometry) -> NonNull<SlabHeader> {
        let mask = !(geometry.s - 1);
        let header_addr = obj.as_ptr() as usize & mask;
        unsafe { NonNull::new_unchecked(header_addr as *mut SlabHeader) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_respects_retire_threshold() {
        let config = SlabConfig::new(16, 8).with_pages_per_slab(1);
        let geometry = Geometry::compute(&config).unwrap();
        assert!(geometry.n > config.retire_threshold);
        assert_eq!(geometry.s, page_size());
    }

    #[test]
    fn create_and_destroy_roundtrip() {
        let config = SlabConfig::new(16, 8).with_pages_per_slab(1);
        let geometry = Geometry::compute(&config).unwrap();
        let header = SlabHeader::create(&geometry).unwrap();
        unsafe {
            assert_eq!((*header.as_ptr()).used_count, 0);
            assert_eq!((*header.as_ptr()).capacity, geometry.n);
            SlabHeader::destroy(header, &geometry);
        }
    }

    #[test]
    fn of_recovers_header_from_object_pointer() {
        let config = SlabConfig::new(16, 8).with_pages_per_slab(1);
        let geometry = Geometry::compute(&config).unwrap();
        let header = SlabHeader::create(&geometry).unwrap();
        unsafe {
            let obj = (*header.as_ptr()).free.alloc().unwrap();
            let recovered = SlabHeader::of(obj, &geometry);
            assert_eq!(recovered.as_ptr(), header.as_ptr());
            (*header.as_ptr()).free.free(obj);
            SlabHeader::destroy(header, &geometry);
        }
    }
}
