// MemStat - Allocation-free Memory Diagnostics
// Copyright (C) 2026 MemStat Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Heap, interrupt-stack and thread-stack reports for firmware that can no longer
//! trust its allocator or its `fmt` machinery.
//!
//! Nothing in this crate allocates. Values are rendered as fixed-width hex one byte at
//! a time and pushed through a [`ByteSink`]: either an ITM stimulus port
//! ([`itm::TraceSink`]) or a UART ([`serial::SerialSink`]).
#![cfg_attr(not(test), no_std)]

pub mod bus;
#[cfg(feature = "canary")]
pub mod canary;
pub mod format;
pub mod global;
pub mod introspect;
pub mod itm;
pub mod report;
pub mod serial;
pub mod sink;
pub mod threads;


pub use bus::{MemoryBus, Mmio};
pub use format::{Formatter, Label};
pub use introspect::{AllocatorStats, HeapStats, MemoryMap, MemoryRegion};
pub use report::{print_all_thread_info, print_heap_and_isr_stack_info};
pub use sink::ByteSink;
pub use threads::{Scheduler, ThreadId, ThreadInfo};

/// Target addresses are 32 bits wide.
pub type Address = u32;

/// Rejected sink configuration. Only raised while building a sink, never while
/// emitting bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("SWO bit rate must be non-zero")]
    ZeroSwoRate,
    #[error("core clock {core_clock_hz} Hz is below the SWO bit rate {swo_baud} Hz")]
    ClockBelowSwoRate { core_clock_hz: u32, swo_baud: u32 },
    #[error("stimulus port {0} out of range (0..32)")]
    InvalidStimulusPort(u8),
    #[error("serial baud rate must be non-zero")]
    ZeroBaud,
    #[error("{baud} baud is not reachable from a {uart_clock_hz} Hz UART clock")]
    UnreachableBaud { uart_clock_hz: u32, baud: u32 },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
