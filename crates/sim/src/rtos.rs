//! Stand-ins for the scheduler and allocator a real target would expose.

use std::cell::Cell;

use memstat_core::canary::CanaryRegion;
use memstat_core::threads::{ControlBlock, ThreadField};
use memstat_core::{AllocatorStats, HeapStats, MemoryMap, MemoryRegion, Scheduler, ThreadId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimThread {
    pub id: ThreadId,
    pub stack_base: u32,
    pub stack_size: u32,
    pub used: u32,
    pub entry: u32,
    /// The scheduler lists the thread but has lost its control block.
    pub corrupt: bool,
}

/// Thread table walked in insertion order. Counts enumeration starts and frees so a
/// leaked cursor shows up after a run.
#[derive(Debug, Default)]
pub struct SimScheduler {
    threads: Vec<SimThread>,
    starts: Cell<u32>,
    frees: Cell<u32>,
}

impl SimScheduler {
    pub fn new(threads: Vec<SimThread>) -> Self {
        Self {
            threads,
            ..Self::default()
        }
    }

    pub fn starts(&self) -> u32 {
        self.starts.get()
    }

    pub fn frees(&self) -> u32 {
        self.frees.get()
    }

    /// Enumeration cursors handed out and not yet freed. Negative after a double free.
    pub fn outstanding(&self) -> i64 {
        i64::from(self.starts.get()) - i64::from(self.frees.get())
    }

    fn find(&self, id: ThreadId) -> Option<&SimThread> {
        self.threads.iter().find(|t| t.id == id)
    }
}

impl Scheduler for SimScheduler {
    type Cursor = usize;

    fn enumerate_start(&self) -> usize {
        self.starts.set(self.starts.get() + 1);
        0
    }

    fn enumerate_next(&self, cursor: &mut usize) -> Option<ThreadId> {
        let thread = self.threads.get(*cursor)?;
        *cursor += 1;
        Some(thread.id)
    }

    fn enumerate_free(&self, _cursor: usize) {
        self.frees.set(self.frees.get() + 1);
    }

    fn control_block(&self, id: ThreadId) -> Option<ControlBlock> {
        self.find(id)
            .filter(|t| !t.corrupt)
            .map(|t| ControlBlock {
                stack_base: t.stack_base,
            })
    }

    fn thread_info(&self, id: ThreadId, field: ThreadField) -> u32 {
        let Some(t) = self.find(id) else {
            return 0;
        };
        match field {
            ThreadField::EntryPoint => t.entry,
            ThreadField::StackSize => t.stack_size,
            ThreadField::StackHighWaterMark => t.used,
        }
    }
}

/// Linker-provided regions and allocator counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimPlatform {
    pub heap: MemoryRegion,
    pub isr_stack: MemoryRegion,
    pub stats: HeapStats,
    pub canary: Option<CanaryRegion>,
}

impl AllocatorStats for SimPlatform {
    fn heap_stats(&self) -> HeapStats {
        self.stats
    }
}

impl MemoryMap for SimPlatform {
    fn heap_region(&self) -> MemoryRegion {
        self.heap
    }

    fn isr_stack_region(&self) -> MemoryRegion {
        self.isr_stack
    }

    fn isr_stack_canary(&self) -> Option<CanaryRegion> {
        self.canary
    }
}
