//! The two diagnostic dumps.
//!
//! Facts are collected into a few stack-local words and then emitted under one
//! critical section: the heap/interrupt-stack pair as a unit, thread reports one
//! block at a time. Concurrent callers can interleave between thread blocks, never
//! inside one.

use crate::bus::MemoryBus;
use crate::format::Formatter;
use crate::introspect::{self, AllocatorStats, HeapSnapshot, IsrStackSnapshot, MemoryMap};
use crate::sink::ByteSink;
use crate::threads::{self, Scheduler, ThreadInfo};

#[cfg(feature = "canary")]
use crate::canary::CanaryUsage;

pub mod labels {
    use crate::format::Label;

    pub const HEAP_START: Label = Label::new("     heap ( start: ");
    pub const END: Label = Label::new(" end: ");
    pub const SIZE: Label = Label::new(" size: ");
    pub const USED: Label = Label::new(" used: ");
    pub const ALLOC_OK: Label = Label::new(" )  alloc ( ok: ");
    pub const ALLOC_FAIL: Label = Label::new("  fail: ");
    pub const LINE_END: Label = Label::new(" )\r\n");

    pub const ISR_STACK_START: Label = Label::new("isr_stack ( start: ");
    /// Stands in for the hex figure when the canary gave no measurement.
    pub const NOT_MEASURED: Label = Label::new("--------");
    /// Appended after the figure when the deepest canary word was hit.
    pub const AT_CAPACITY: Label = Label::new(" !");

    pub const STACK_START: Label = Label::new("    stack ( start: ");
    pub const STACK_CLOSE: Label = Label::new(" ) ");
    pub const THREAD_ID: Label = Label::new("thread ( id: ");
    pub const ENTRY: Label = Label::new(" entry: ");
}

/// Heap bounds and allocator counters, then the interrupt stack bounds (and its canary
/// usage when configured).
pub fn print_heap_and_isr_stack_info<S, P, M>(out: &mut Formatter<S>, platform: &P, memory: &M)
where
    S: ByteSink,
    P: AllocatorStats + MemoryMap + ?Sized,
    M: MemoryBus + ?Sized,
{
    let heap = introspect::heap_snapshot(platform);
    let isr = introspect::isr_stack_snapshot(platform, memory);
    out.atomic(|out| {
        emit_heap(out, &heap);
        emit_isr_stack(out, &isr);
    })
}

/// One block per live thread. Returns how many blocks were written.
pub fn print_all_thread_info<S, T>(out: &mut Formatter<S>, scheduler: &T) -> usize
where
    S: ByteSink,
    T: Scheduler + ?Sized,
{
    let mut printed = 0;
    for id in threads::enumerate(scheduler) {
        match threads::resolve(scheduler, id) {
            Ok(info) => {
                emit_thread(out, &info);
                printed += 1;
            }
            Err(err) => tracing::warn!(%err, "skipping thread"),
        }
    }
    tracing::debug!(threads = printed, "thread report done");
    printed
}

pub fn emit_heap<S: ByteSink>(out: &mut Formatter<S>, heap: &HeapSnapshot) {
    out.atomic(|out| {
        out.print_field(labels::HEAP_START, heap.region.start);
        out.print_field(labels::END, heap.region.end());
        out.print_field(labels::SIZE, heap.region.size);
        out.print_field(labels::USED, heap.stats.max_size);
        out.print_field(labels::ALLOC_OK, heap.stats.alloc_count);
        out.print_field(labels::ALLOC_FAIL, heap.stats.alloc_fail_count);
        out.print(labels::LINE_END);
    })
}

pub fn emit_isr_stack<S: ByteSink>(out: &mut Formatter<S>, isr: &IsrStackSnapshot) {
    out.atomic(|out| {
        out.print_field(labels::ISR_STACK_START, isr.region.start);
        out.print_field(labels::END, isr.region.end());
        out.print_field(labels::SIZE, isr.region.size);
        #[cfg(feature = "canary")]
        emit_canary_usage(out, isr);
        out.print(labels::LINE_END);
    })
}

#[cfg(feature = "canary")]
fn emit_canary_usage<S: ByteSink>(out: &mut Formatter<S>, isr: &IsrStackSnapshot) {
    let Some(usage) = isr.usage else {
        return;
    };
    out.print(labels::USED);
    match usage {
        CanaryUsage::NotMeasured => out.print(labels::NOT_MEASURED),
        CanaryUsage::BelowFull(used) => out.print_hex32(used),
        CanaryUsage::AtOrAboveCapacity => {
            out.print_hex32(isr.region.size);
            out.print(labels::AT_CAPACITY);
        }
    }
}

pub fn emit_thread<S: ByteSink>(out: &mut Formatter<S>, info: &ThreadInfo) {
    let stack = info.stack();
    out.atomic(|out| {
        out.print_field(labels::STACK_START, stack.start);
        out.print_field(labels::END, stack.end());
        out.print_field(labels::SIZE, stack.size);
        out.print_field(labels::USED, info.stack_high_water_mark);
        out.print(labels::STACK_CLOSE);
        out.print_field(labels::THREAD_ID, info.id.get());
        out.print_field(labels::ENTRY, info.entry_point);
        out.print(labels::LINE_END);
    })
}
