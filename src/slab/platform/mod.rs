//! OS abstraction for obtaining `S`-aligned slab mappings.

#[cfg(unix)]
mod unix;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        /// Maps an `s`-byte, `s`-aligned anonymous region (`s` must be a power
        /// of two and a multiple of the system page size). Returns null on
        /// failure.
        ///
        /// # Safety
        /// Caller must eventually pass the returned pointer and the same `s`
        /// to [`slab_unmap`].
        #[inline]
        pub unsafe fn slab_map(s: usize) -> *mut u8 {
            unsafe { unix::slab_map(s) }
        }

        /// Unmaps a region previously returned by [`slab_map`].
        ///
        /// # Safety
        /// `ptr`/`s` must match a live [`slab_map`] allocation.
        #[inline]
        pub unsafe fn slab_unmap(ptr: *mut u8, s: usize) {
            unsafe { unix::slab_unmap(ptr, s) };
        }
    } else {
        /// No slab-mapping backend is available on this platform.
        #[inline]
        pub unsafe fn slab_map(_s: usize) -> *mut u8 {
            std::ptr::null_mut()
        }

        #[inline]
        pub unsafe fn slab_unmap(_ptr: *mut u8, _s: usize) {}
    }
}
