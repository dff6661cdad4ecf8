//! Walking the scheduler's live thread table.

use core::num::NonZeroU32;

use crate::introspect::MemoryRegion;
use crate::Address;

/// Scheduler handle of a live thread. The scheduler's null handle has no
/// representation: "no more threads" is `None`.
pub type ThreadId = NonZeroU32;

/// Per-thread values the scheduler answers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadField {
    EntryPoint,
    StackSize,
    /// Deepest stack usage observed, in bytes.
    StackHighWaterMark,
}

/// The parts of the scheduler's per-thread control block a report needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlBlock {
    /// Lowest address of the thread's stack.
    pub stack_base: Address,
}

/// Introspection queries a scheduler exposes.
///
/// Every cursor returned by `enumerate_start` must be handed back to
/// `enumerate_free` exactly once; [`enumerate`] does that bookkeeping.
pub trait Scheduler {
    type Cursor;

    fn enumerate_start(&self) -> Self::Cursor;
    fn enumerate_next(&self, cursor: &mut Self::Cursor) -> Option<ThreadId>;
    fn enumerate_free(&self, cursor: Self::Cursor);

    fn control_block(&self, thread: ThreadId) -> Option<ControlBlock>;
    fn thread_info(&self, thread: ThreadId, field: ThreadField) -> u32;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ThreadError {
    #[error("no control block for thread {:#010x}", .0.get())]
    UnresolvedControlBlock(ThreadId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub stack_base: Address,
    pub stack_size: u32,
    pub stack_high_water_mark: u32,
    pub entry_point: Address,
}

impl ThreadInfo {
    pub fn stack(&self) -> MemoryRegion {
        MemoryRegion::new(self.stack_base, self.stack_size)
    }
}

pub fn resolve<S: Scheduler + ?Sized>(scheduler: &S, id: ThreadId) -> Result<ThreadInfo, ThreadError> {
    let tcb = scheduler
        .control_block(id)
        .ok_or(ThreadError::UnresolvedControlBlock(id))?;
    Ok(ThreadInfo {
        id,
        stack_base: tcb.stack_base,
        stack_size: scheduler.thread_info(id, ThreadField::StackSize),
        stack_high_water_mark: scheduler.thread_info(id, ThreadField::StackHighWaterMark),
        entry_point: scheduler.thread_info(id, ThreadField::EntryPoint),
    })
}

/// Live thread handles. The scheduler cursor is released when this is dropped,
/// however far iteration got.
pub struct Threads<'a, S: Scheduler + ?Sized> {
    scheduler: &'a S,
    cursor: Option<S::Cursor>,
    done: bool,
}

pub fn enumerate<S: Scheduler + ?Sized>(scheduler: &S) -> Threads<'_, S> {
    Threads {
        scheduler,
        cursor: Some(scheduler.enumerate_start()),
        done: false,
    }
}

impl<S: Scheduler + ?Sized> Iterator for Threads<'_, S> {
    type Item = ThreadId;

    fn next(&mut self) -> Option<ThreadId> {
        if self.done {
            return None;
        }
        let next = self
            .cursor
            .as_mut()
            .and_then(|cursor| self.scheduler.enumerate_next(cursor));
        self.done = next.is_none();
        next
    }
}

impl<S: Scheduler + ?Sized> Drop for Threads<'_, S> {
    fn drop(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            self.scheduler.enumerate_free(cursor);
        }
    }
}
