// MemStat - Allocation-free Memory Diagnostics
// Copyright (C) 2026 MemStat Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

#![no_main]
#![no_std]

use cortex_m_rt::entry;
use panic_halt as _;

use memstat_core::canary::{self, CanaryRegion};
use memstat_core::serial::{Pl011, PinName, SerialConfig, SerialSink};
use memstat_core::threads::{ControlBlock, ThreadField};
use memstat_core::{
    print_all_thread_info, print_heap_and_isr_stack_info, AllocatorStats, Formatter, HeapStats,
    MemoryMap, MemoryRegion, Mmio, Scheduler, ThreadId,
};

// UART0 on the LM3S6965
const UART0_BASE: u32 = 0x4000_C000;
// Precision internal oscillator, the clock out of reset.
const SYSCLK_HZ: u32 = 12_000_000;

const ISR_STACK_SIZE: u32 = 0x800;
// Top of the stack left unseeded: main's own frames live there when the canary goes in.
// They still count as used when the full stack is scanned.
const LIVE_FRAMES: u32 = 0x200;
const HEAP_SIZE: u32 = 0x1000;

const MAIN_THREAD: ThreadId = match ThreadId::new(1) {
    Some(id) => id,
    None => panic!(),
};

extern "C" {
    static _stack_start: u32;
    static __sheap: u32;
}

/// Regions derived from the cortex-m-rt linker symbols. No allocator runs on this
/// demo, so the heap counters stay at zero.
struct Target;

impl Target {
    fn stack_top(&self) -> u32 {
        // SAFETY: linker symbol, only its address is taken.
        unsafe { core::ptr::addr_of!(_stack_start) as u32 }
    }

    fn canary(&self) -> CanaryRegion {
        CanaryRegion::descending(self.isr_stack_region())
    }
}

impl AllocatorStats for Target {
    fn heap_stats(&self) -> HeapStats {
        HeapStats::default()
    }
}

impl MemoryMap for Target {
    fn heap_region(&self) -> MemoryRegion {
        // SAFETY: linker symbol, only its address is taken.
        let start = unsafe { core::ptr::addr_of!(__sheap) as u32 };
        MemoryRegion::new(start, HEAP_SIZE)
    }

    fn isr_stack_region(&self) -> MemoryRegion {
        MemoryRegion::new(self.stack_top() - ISR_STACK_SIZE, ISR_STACK_SIZE)
    }

    fn isr_stack_canary(&self) -> Option<CanaryRegion> {
        Some(self.canary())
    }
}

/// Without an RTOS the only thread is `main`, running on the main stack.
impl Scheduler for Target {
    type Cursor = bool;

    fn enumerate_start(&self) -> bool {
        false
    }

    fn enumerate_next(&self, yielded: &mut bool) -> Option<ThreadId> {
        if *yielded {
            return None;
        }
        *yielded = true;
        Some(MAIN_THREAD)
    }

    fn enumerate_free(&self, _cursor: bool) {}

    fn control_block(&self, id: ThreadId) -> Option<ControlBlock> {
        (id == MAIN_THREAD).then(|| ControlBlock {
            stack_base: self.stack_top() - ISR_STACK_SIZE,
        })
    }

    fn thread_info(&self, _id: ThreadId, field: ThreadField) -> u32 {
        match field {
            ThreadField::EntryPoint => run as usize as u32,
            ThreadField::StackSize => ISR_STACK_SIZE,
            ThreadField::StackHighWaterMark => {
                // SAFETY: the canary region is ordinary RAM on this target.
                let ram = unsafe { Mmio::new() };
                canary::scan(&ram, &self.canary()).legacy_bytes(ISR_STACK_SIZE)
            }
        }
    }
}

#[entry]
fn main() -> ! {
    run()
}

fn run() -> ! {
    let target = Target;
    // SAFETY: running on the target itself.
    let mut ram = unsafe { Mmio::new() };
    canary::seed(&mut ram, &target.canary().reserving(LIVE_FRAMES));

    #[cfg(feature = "itm")]
    trace_banner();

    // SAFETY: UART0 is mapped at its documented address.
    let port = Pl011::new(unsafe { Mmio::new() }, UART0_BASE, SYSCLK_HZ);
    if let Ok(sink) = SerialSink::new(port, SerialConfig::stdio(PinName(0), PinName(1))) {
        let mut out = Formatter::new(sink);
        print_heap_and_isr_stack_info(&mut out, &target, &ram);
        print_all_thread_info(&mut out, &target);
    }

    loop {
        cortex_m::asm::wfi();
    }
}

#[cfg(feature = "itm")]
fn trace_banner() {
    use memstat_core::global;
    use memstat_core::itm::TraceConfig;

    let Ok(config) = TraceConfig::new(0, SYSCLK_HZ) else {
        return;
    };
    // SAFETY: the ITM and debug blocks sit at their architectural addresses.
    unsafe { global::install_trace(config) };
    for &b in b"memstat: trace up\r\n" {
        global::write_trace_byte(b);
    }
}

#[cfg(feature = "itm")]
#[cortex_m_rt::exception]
unsafe fn HardFault(_frame: &cortex_m_rt::ExceptionFrame) -> ! {
    // SAFETY: fault context on the target itself.
    let ram = unsafe { Mmio::new() };
    memstat_core::global::with_trace_formatter(|out| print_heap_and_isr_stack_info(out, &Target, &ram));
    loop {
        cortex_m::asm::bkpt();
    }
}
