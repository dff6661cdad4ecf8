// MemStat - Allocation-free Memory Diagnostics
// Copyright (C) 2026 MemStat Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Host model of a Cortex-M target for exercising the diagnostics end to end: RAM,
//! the trace block, a PL011 UART and a scheduler, wired up from a YAML scenario.

pub mod board;
pub mod bus;
pub mod decode;
pub mod memory;
pub mod peripherals;
pub mod rtos;

use std::any::Any;

use memstat_core::Address;

mod tests;

pub use board::{Board, Channel, ReportKind};
pub use bus::SystemBus;
pub use memory::LinearMemory;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    #[error("Memory access violation at {0:#x}")]
    MemoryViolation(Address),
    #[error("No peripheral mapped at {0:#x}")]
    UnmappedPeripheral(Address),
}

pub type SimResult<T> = Result<T, SimError>;

/// A memory-mapped register block. Offsets are relative to where the block is mapped.
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&self, offset: u32) -> SimResult<u32>;
    fn write(&mut self, offset: u32, value: u32) -> SimResult<()>;

    /// Narrow store. Registers that care about access width override this.
    fn write_u8(&mut self, offset: u32, value: u8) -> SimResult<()> {
        self.write(offset, value as u32)
    }

    fn read_u8(&self, offset: u32) -> SimResult<u8> {
        let word = self.read(offset & !3)?;
        Ok((word >> ((offset & 3) * 8)) as u8)
    }

    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
}
