//! A simulated target assembled from a [`Scenario`].

use anyhow::{Context, Result};
use memstat_config::{Scenario, StackGrowth};
use memstat_core::canary::{self, CanaryRegion, Growth, WORD_SIZE};
use memstat_core::itm::{TraceConfig, TraceSink};
use memstat_core::serial::{pl011, Pl011, PinName, SerialConfig, SerialSink};
use memstat_core::{
    print_all_thread_info, print_heap_and_isr_stack_info, Address, ByteSink, Formatter, HeapStats,
    MemoryRegion, ThreadId,
};

use crate::bus::SystemBus;
use crate::memory::LinearMemory;
use crate::peripherals::trace::{PPB_BASE, PPB_SIZE};
use crate::peripherals::uart::PL011_SIZE;
use crate::peripherals::{Pl011Model, TraceUnit};
use crate::rtos::{SimPlatform, SimScheduler, SimThread};
use crate::{SimError, SimResult};

pub const TRACE_UNIT: &str = "itm";
pub const UART: &str = "uart0";

/// Where report bytes go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Itm,
    Serial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Heap,
    Threads,
    All,
}

/// Bytes one report run put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub bytes: Vec<u8>,
    pub threads_printed: usize,
}

/// Peripherals and RAM are separate so a sink can hold the register bus mutably while
/// the canary scan reads RAM.
#[derive(Debug)]
pub struct Board {
    pub name: String,
    pub bus: SystemBus,
    pub ram: LinearMemory,
    pub platform: SimPlatform,
    pub scheduler: SimScheduler,
    trace: TraceConfig,
    serial: SerialConfig,
    uart_base: Address,
    uart_clock_hz: u32,
}

impl Board {
    pub fn from_scenario(scenario: &Scenario) -> Result<Self> {
        let (ram_base, ram_size) = scenario.memory.ram.resolve()?;
        let (heap_base, heap_size) = scenario.memory.heap.resolve()?;
        let (isr_base, isr_size) = scenario.memory.isr_stack.resolve()?;

        let trace = TraceConfig::with_swo_baud(
            scenario.trace.stimulus_port,
            scenario.trace.core_clock_hz,
            scenario.trace.swo_baud,
        )
        .context("trace settings")?;

        let s = &scenario.serial;
        let uart_base = Address::try_from(s.base_address)
            .context("serial base_address does not fit 32 bits")?;
        let serial = SerialConfig {
            tx: PinName(s.tx_pin),
            rx: PinName(s.rx_pin),
            baud: s.baud,
        };
        let uart = if s.preinitialized {
            let (ibrd, fbrd) = pl011::divisor(s.uart_clock_hz, s.baud);
            Pl011Model::preinitialized(ibrd, fbrd)
        } else {
            Pl011Model::new()
        };

        let mut bus = SystemBus::new();
        bus.map(TRACE_UNIT, PPB_BASE, PPB_SIZE, Box::new(TraceUnit::new()));
        bus.map(UART, uart_base, PL011_SIZE, Box::new(uart));

        let mut ram = LinearMemory::new(ram_size as usize, ram_base);
        let isr_stack = MemoryRegion::new(isr_base, isr_size);
        let canary = match &scenario.memory.isr_canary {
            Some(settings) => {
                let growth = match settings.growth {
                    StackGrowth::Downward => Growth::Downward,
                    StackGrowth::Upward => Growth::Upward,
                };
                let canary = CanaryRegion::new(isr_stack, settings.sentinel, growth);
                canary::seed(&mut ram, &canary);
                let used = settings.used.bytes()? as u32;
                dirty_stack(&mut ram, &canary, used);
                Some(canary)
            }
            None => None,
        };

        let platform = SimPlatform {
            heap: MemoryRegion::new(heap_base, heap_size),
            isr_stack,
            stats: HeapStats {
                max_size: scenario.heap_stats.max_size,
                alloc_count: scenario.heap_stats.alloc_count,
                alloc_fail_count: scenario.heap_stats.alloc_fail_count,
            },
            canary,
        };

        let threads = scenario
            .threads
            .iter()
            .map(|t| -> Result<SimThread> {
                Ok(SimThread {
                    id: ThreadId::new(t.id).context("thread id 0")?,
                    stack_base: t.stack_base,
                    stack_size: t.stack_size.bytes()? as u32,
                    used: t.used,
                    entry: t.entry,
                    corrupt: t.corrupt,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            scenario = %scenario.name,
            threads = threads.len(),
            canary = canary.is_some(),
            "board ready"
        );

        Ok(Self {
            name: scenario.name.clone(),
            bus,
            ram,
            platform,
            scheduler: SimScheduler::new(threads),
            trace,
            serial,
            uart_base,
            uart_clock_hz: s.uart_clock_hz,
        })
    }

    /// Runs `report` through a fresh sink on `channel` and returns what the observer
    /// on that channel would receive.
    pub fn run(&mut self, channel: Channel, report: ReportKind) -> Result<Capture> {
        let before = self.captured(channel).len();
        let threads_printed = match channel {
            Channel::Itm => {
                let sink = TraceSink::new(&mut self.bus, self.trace);
                let mut out = Formatter::new(sink);
                emit(&mut out, report, &self.platform, &self.ram, &self.scheduler)
            }
            Channel::Serial => {
                let port = Pl011::new(&mut self.bus, self.uart_base, self.uart_clock_hz);
                let sink = SerialSink::new(port, self.serial).context("serial settings")?;
                let mut out = Formatter::new(sink);
                emit(&mut out, report, &self.platform, &self.ram, &self.scheduler)
            }
        };
        let bytes = self.captured(channel)[before..].to_vec();
        tracing::debug!(?channel, ?report, bytes = bytes.len(), "report captured");
        Ok(Capture {
            bytes,
            threads_printed,
        })
    }

    /// Everything the channel's observer has seen so far.
    pub fn captured(&self, channel: Channel) -> Vec<u8> {
        match channel {
            Channel::Itm => self
                .trace_unit()
                .map(|t| t.captured(self.trace.port()))
                .unwrap_or_default(),
            Channel::Serial => self.uart().map(|u| u.tx().to_vec()).unwrap_or_default(),
        }
    }

    pub fn trace_unit(&self) -> Option<&TraceUnit> {
        self.bus.peripheral::<TraceUnit>(TRACE_UNIT)
    }

    pub fn uart(&self) -> Option<&Pl011Model> {
        self.bus.peripheral::<Pl011Model>(UART)
    }

    /// First bad access of the run so far, peripheral faults before RAM faults.
    pub fn check_faults(&self) -> SimResult<()> {
        if let Some(err) = self.bus.violations().into_iter().next() {
            return Err(err);
        }
        if self.ram.violations() > 0 {
            return Err(SimError::MemoryViolation(self.ram.base_addr));
        }
        match self.scheduler.outstanding() {
            0 => {}
            n if n > 0 => tracing::warn!(outstanding = n, "enumeration cursor leaked"),
            n => tracing::warn!(extra_frees = -n, "enumeration cursor freed twice"),
        }
        Ok(())
    }
}

fn emit<S: ByteSink>(
    out: &mut Formatter<S>,
    report: ReportKind,
    platform: &SimPlatform,
    ram: &LinearMemory,
    scheduler: &SimScheduler,
) -> usize {
    if matches!(report, ReportKind::Heap | ReportKind::All) {
        print_heap_and_isr_stack_info(out, platform, ram);
    }
    if matches!(report, ReportKind::Threads | ReportKind::All) {
        print_all_thread_info(out, scheduler)
    } else {
        0
    }
}

/// Overwrites the first `used` bytes the stack grows into with a value that can never
/// match the sentinel.
fn dirty_stack(ram: &mut LinearMemory, canary: &CanaryRegion, used: u32) {
    let region = canary.region;
    let span = region.size / WORD_SIZE * WORD_SIZE;
    let used = used.min(span);
    let start = match canary.growth {
        Growth::Downward => region.start + span - used,
        Growth::Upward => region.start,
    };
    ram.fill(start, used, !(canary.sentinel as u8));
}
