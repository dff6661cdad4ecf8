//! Heap and interrupt-stack facts, pulled fresh on every report.

use crate::bus::MemoryBus;
use crate::Address;

#[cfg(feature = "canary")]
use crate::canary::{self, CanaryRegion, CanaryUsage};

/// A contiguous address range. `start` is the low address, `end()` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryRegion {
    pub start: Address,
    pub size: u32,
}

impl MemoryRegion {
    pub const fn new(start: Address, size: u32) -> Self {
        Self { start, size }
    }

    /// Region spanning `[low, high)`. An inverted pair gives an empty region at `low`.
    pub const fn from_bounds(low: Address, high: Address) -> Self {
        Self {
            start: low,
            size: high.saturating_sub(low),
        }
    }

    /// One past the last byte. Wraps instead of trapping: this runs in fault handlers
    /// where the bounds themselves may be garbage.
    pub const fn end(&self) -> Address {
        self.start.wrapping_add(self.size)
    }

    pub const fn contains(&self, addr: Address) -> bool {
        addr >= self.start && addr - self.start < self.size
    }
}

/// Allocator counters at the instant they were read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    /// High-water mark of bytes in use.
    pub max_size: u32,
    pub alloc_count: u32,
    pub alloc_fail_count: u32,
}

/// Statistics kept by the heap allocator.
pub trait AllocatorStats {
    fn heap_stats(&self) -> HeapStats;
}

/// Memory regions the linker and runtime carved out.
pub trait MemoryMap {
    fn heap_region(&self) -> MemoryRegion;
    fn isr_stack_region(&self) -> MemoryRegion;

    /// Canary layout of the interrupt stack, when startup code seeded one.
    #[cfg(feature = "canary")]
    fn isr_stack_canary(&self) -> Option<CanaryRegion> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapSnapshot {
    pub region: MemoryRegion,
    pub stats: HeapStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsrStackSnapshot {
    pub region: MemoryRegion,
    /// `None` when no canary was configured for the region.
    #[cfg(feature = "canary")]
    pub usage: Option<CanaryUsage>,
}

pub fn heap_snapshot<P>(platform: &P) -> HeapSnapshot
where
    P: AllocatorStats + MemoryMap + ?Sized,
{
    HeapSnapshot {
        region: platform.heap_region(),
        stats: platform.heap_stats(),
    }
}

pub fn isr_stack_snapshot<P, M>(platform: &P, memory: &M) -> IsrStackSnapshot
where
    P: MemoryMap + ?Sized,
    M: MemoryBus + ?Sized,
{
    #[cfg(not(feature = "canary"))]
    let _ = memory;

    IsrStackSnapshot {
        region: platform.isr_stack_region(),
        #[cfg(feature = "canary")]
        usage: platform
            .isr_stack_canary()
            .map(|canary| canary::scan(memory, &canary)),
    }
}
