//! Stack high-water marks from sentinel-filled memory.
//!
//! Startup code fills a stack with a known word ([`seed`]); later, [`scan`] walks in
//! from the end the stack reaches last and stops at the first word that changed.

use crate::bus::MemoryBus;
use crate::introspect::MemoryRegion;
use crate::Address;

/// Fill word for unused stack, the pattern RTOS kernels conventionally use.
pub const DEFAULT_SENTINEL: u32 = 0xCCCC_CCCC;

pub const WORD_SIZE: u32 = 4;

/// Which way the stack pointer moves as the stack fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Growth {
    /// Full-descending, as on Cortex-M: the low end is reached last.
    #[default]
    Downward,
    /// The high end is reached last.
    Upward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanaryRegion {
    pub region: MemoryRegion,
    pub sentinel: u32,
    pub growth: Growth,
}

impl CanaryRegion {
    pub const fn new(region: MemoryRegion, sentinel: u32, growth: Growth) -> Self {
        Self {
            region,
            sentinel,
            growth,
        }
    }

    /// Descending stack with [`DEFAULT_SENTINEL`].
    pub const fn descending(region: MemoryRegion) -> Self {
        Self::new(region, DEFAULT_SENTINEL, Growth::Downward)
    }

    /// The part of this region to [`seed`] when the first `live_bytes` the stack grows
    /// through are already in use. Scan the full region afterwards: the live frames
    /// then count towards the measured depth.
    pub const fn reserving(&self, live_bytes: u32) -> Self {
        let size = self.region.size.saturating_sub(live_bytes);
        let start = match self.growth {
            Growth::Downward => self.region.start,
            Growth::Upward => self.region.end().wrapping_sub(size),
        };
        Self::new(MemoryRegion::new(start, size), self.sentinel, self.growth)
    }

    fn words(&self) -> u32 {
        self.region.size / WORD_SIZE
    }
}

/// Outcome of a canary scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanaryUsage {
    /// Nothing to measure: the region is empty or misaligned, or every word still
    /// holds the sentinel (untouched, or seeded after the stack was last used).
    NotMeasured,
    /// Bytes between the growth origin and the deepest overwritten word.
    BelowFull(u32),
    /// The last word the stack can reach was overwritten. Exactly full and overflowed
    /// look the same from here.
    AtOrAboveCapacity,
}

impl CanaryUsage {
    /// Single figure in the old report convention, where anything but a partial
    /// measurement reads as the whole region.
    pub fn legacy_bytes(&self, size: u32) -> u32 {
        match *self {
            CanaryUsage::BelowFull(used) => used,
            CanaryUsage::NotMeasured | CanaryUsage::AtOrAboveCapacity => size,
        }
    }
}

/// Fills every whole word of the region with the sentinel.
///
/// Must not be run over the stack currently in use.
pub fn seed<B: MemoryBus + ?Sized>(bus: &mut B, canary: &CanaryRegion) {
    let start = canary.region.start;
    for i in 0..canary.words() {
        bus.write_u32(start.wrapping_add(i * WORD_SIZE), canary.sentinel);
    }
}

/// Measures how deep the stack has been. Reads only; never seeds.
///
/// The region must start word-aligned and must not wrap the address space; trailing
/// bytes past the last whole word are ignored.
pub fn scan<B: MemoryBus + ?Sized>(bus: &B, canary: &CanaryRegion) -> CanaryUsage {
    let words = canary.words();
    if words == 0 || canary.region.start % WORD_SIZE != 0 {
        return CanaryUsage::NotMeasured;
    }
    let low = canary.region.start;
    let Some(high) = low.checked_add(words * WORD_SIZE) else {
        return CanaryUsage::NotMeasured;
    };

    let word_at = |index: u32| -> Address {
        match canary.growth {
            Growth::Downward => low + index * WORD_SIZE,
            Growth::Upward => high - (index + 1) * WORD_SIZE,
        }
    };

    let mut index = 0;
    while index < words && bus.read_u32(word_at(index)) == canary.sentinel {
        index += 1;
    }

    if index == words {
        return CanaryUsage::NotMeasured;
    }
    if index == 0 {
        return CanaryUsage::AtOrAboveCapacity;
    }
    let touched = word_at(index);
    let used = match canary.growth {
        Growth::Downward => high - touched,
        Growth::Upward => touched + WORD_SIZE - low,
    };
    CanaryUsage::BelowFull(used)
}
