//! Uniform register-space allocators: a bidirectional bump scheme per
//! sub-allocator (global grows up from `start`, local/array grows down from
//! `end`), two bundles (default and geometry-shader).

use crate::error::{AssembleError, Result};

fn capacity_err(file: &str, line: u32, message: impl Into<String>) -> AssembleError {
    AssembleError::Capacity {
        file: file.to_string(),
        line,
        message: message.into(),
    }
}

/// One class's bump allocator: `[start, bound)` is unclaimed, globals take
/// from the bottom, locals take from the top and lower `bound` to match.
#[derive(Debug, Clone, Copy)]
pub struct BumpAllocator {
    range_start: u16,
    start: u16,
    end: u16,
    bound: u16,
}

impl BumpAllocator {
    #[must_use]
    pub fn new(range_start: u16, range_end: u16) -> Self {
        Self {
            range_start,
            start: range_start,
            end: range_end,
            bound: range_end,
        }
    }

    /// Allocate `n` contiguous slots from the low (global) end.
    pub fn alloc_global(&mut self, n: u16, file: &str, line: u32) -> Result<u16> {
        if self.start + n > self.bound {
            return Err(capacity_err(file, line, "uniform slots exhausted"));
        }
        let pos = self.start;
        self.start += n;
        Ok(pos)
    }

    /// Allocate `n` contiguous slots from the high (local/array) end.
    pub fn alloc_local(&mut self, n: u16, file: &str, line: u32) -> Result<u16> {
        if self.end < self.start + n {
            return Err(capacity_err(file, line, "uniform slots exhausted"));
        }
        self.end -= n;
        self.bound = self.bound.min(self.end);
        Ok(self.end)
    }

    /// Reset the local high-water mark between input files; globals persist.
    pub fn clear_local(&mut self, range_end: u16) {
        self.end = range_end;
        self.bound = range_end;
    }

    #[must_use]
    pub fn range_start(&self) -> u16 {
        self.range_start
    }
}

/// The three disjoint uniform-class allocators making up one bundle.
#[derive(Debug, Clone, Copy)]
pub struct UniformBundle {
    pub fvec: BumpAllocator,
    pub ivec: BumpAllocator,
    pub bool_: BumpAllocator,
}

impl UniformBundle {
    /// The default bundle: FVEC `[0x20,0x80)`, IVEC `[0x80,0x84)`,
    /// BOOL `[0x88,0x98)`.
    #[must_use]
    pub fn default_profile() -> Self {
        Self {
            fvec: BumpAllocator::new(0x20, 0x80),
            ivec: BumpAllocator::new(0x80, 0x84),
            bool_: BumpAllocator::new(0x88, 0x98),
        }
    }

    /// A geometry-shader bundle overrides FVEC to `[first_free, 0x80)`; the
    /// other two classes keep the default ranges (geometry modules don't
    /// share the global uniform table regardless).
    #[must_use]
    pub fn geometry_profile(first_free: u16) -> Self {
        Self {
            fvec: BumpAllocator::new(first_free, 0x80),
            ivec: BumpAllocator::new(0x80, 0x84),
            bool_: BumpAllocator::new(0x88, 0x98),
        }
    }

    pub fn clear_locals(&mut self) {
        self.fvec.clear_local(0x80);
        self.ivec.clear_local(0x84);
        self.bool_.clear_local(0x98);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_allocation_bumps_from_bottom() {
        let mut a = BumpAllocator::new(0x20, 0x80);
        assert_eq!(a.alloc_global(4, "f", 1).unwrap(), 0x20);
        assert_eq!(a.alloc_global(4, "f", 1).unwrap(), 0x24);
    }

    #[test]
    fn local_allocation_bumps_from_top() {
        let mut a = BumpAllocator::new(0x20, 0x80);
        assert_eq!(a.alloc_local(1, "f", 1).unwrap(), 0x7F);
        assert_eq!(a.alloc_local(1, "f", 1).unwrap(), 0x7E);
    }

    #[test]
    fn global_and_local_cannot_cross() {
        let mut a = BumpAllocator::new(0x20, 0x22);
        a.alloc_global(1, "f", 1).unwrap();
        assert!(a.alloc_global(2, "f", 1).is_err());
    }

    #[test]
    fn clear_local_resets_high_water_but_keeps_globals() {
        let mut a = BumpAllocator::new(0x20, 0x80);
        a.alloc_global(2, "f", 1).unwrap();
        a.alloc_local(3, "f", 1).unwrap();
        a.clear_local(0x80);
        assert_eq!(a.alloc_local(1, "f", 1).unwrap(), 0x7F);
        assert_eq!(a.alloc_global(1, "f", 1).unwrap(), 0x22);
    }

    #[test]
    fn geometry_profile_overrides_fvec_start() {
        let bundle = UniformBundle::geometry_profile(0x35);
        assert_eq!(bundle.fvec.range_start(), 0x35);
    }
}
