//! Allocator and cache configuration, with defaults matching the batch
//! sizes and retirement threshold the original slab design shipped with.

use crate::error::{Error, Result};

/// Configuration for a [`super::allocator::Allocator`].
///
/// `obj_size`/`obj_align` have no sensible default and must be supplied;
/// everything else defaults the way the reference design tuned it.
#[derive(Debug, Clone, Copy)]
pub struct SlabConfig {
    pub obj_size: usize,
    pub obj_align: usize,
    pub pages_per_slab: usize,
    /// A slab with `0 < used_count <= retire_threshold` is retired rather
    /// than kept active.
    pub retire_threshold: usize,
    /// Retirement triggers when `used_objs / (active_count * N) <= retire_percent`.
    pub retire_percent: f32,
}

impl SlabConfig {
    /// `pages_per_slab = 8`, `retire_threshold = 1`, `retire_percent = 0.1`.
    pub fn new(obj_size: usize, obj_align: usize) -> Self {
        Self {
            obj_size,
            obj_align,
            pages_per_slab: 8,
            retire_threshold: 1,
            retire_percent: 0.1,
        }
    }

    pub fn with_pages_per_slab(mut self, pages: usize) -> Self {
        self.pages_per_slab = pages;
        self
    }

    pub fn with_retire_threshold(mut self, threshold: usize) -> Self {
        self.retire_threshold = threshold;
        self
    }

    pub fn with_retire_percent(mut self, percent: f32) -> Self {
        self.retire_percent = percent;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let pow2 = |n: usize| n != 0 && (n & (n - 1)) == 0;
        if self.obj_size == 0 || !pow2(self.obj_align) || !pow2(self.pages_per_slab) {
            return Err(Error::BadConf);
        }
        if !(0.0..=1.0).contains(&self.retire_percent) || self.retire_percent <= 0.0 {
            return Err(Error::BadConf);
        }
        Ok(())
    }
}

/// Per-thread cache tuning: how many objects it holds before/after the
/// slow paths fire.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub cap: usize,
    pub acquire: usize,
    pub release: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cap: 64,
            acquire: 32,
            release: 32,
        }
    }
}

impl CacheConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.cap == 0 || self.acquire == 0 || self.release == 0 || self.release > self.cap {
            return Err(Error::BadConf);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cache_config_matches_documented_defaults() {
        let cfg = CacheConfig::default();
        assert_eq!(cfg.cap, 64);
        assert_eq!(cfg.acquire, 32);
        assert_eq!(cfg.release, 32);
    }

    #[test]
    fn rejects_bad_alignment() {
        let cfg = SlabConfig::new(16, 3);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_non_power_of_two_pages_per_slab() {
        let cfg = SlabConfig::new(16, 8).with_pages_per_slab(3);
        assert!(cfg.validate().is_err());
    }
}
