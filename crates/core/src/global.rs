//! A process-wide trace sink for fault handlers, which cannot be handed one.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::bus::Mmio;
use crate::format::Formatter;
use crate::itm::{TraceConfig, TraceSink};
use crate::sink::ByteSink;

static TRACE: Mutex<RefCell<Option<TraceSink<Mmio>>>> = Mutex::new(RefCell::new(None));

/// Installs the global ITM sink. The trace hardware is brought up by the first byte,
/// not here. Replaces any previously installed sink.
///
/// # Safety
/// Must only run on a Cortex-M target whose debug and ITM register blocks are mapped
/// at their architectural addresses.
pub unsafe fn install_trace(config: TraceConfig) {
    // SAFETY: forwarded to the caller.
    let bus = unsafe { Mmio::new() };
    critical_section::with(|cs| {
        TRACE.borrow(cs).replace(Some(TraceSink::new(bus, config)));
    });
}

/// Sends one byte through the global sink. Returns `false` when no sink is installed
/// or the sink is already in use further up this call stack (a fault raised while
/// printing); the byte is dropped in both cases.
pub fn write_trace_byte(c: u8) -> bool {
    with_trace_sink(|sink| sink.emit_byte(c)).is_some()
}

/// Runs `f` with a formatter over the global sink, for dumping a report from a
/// fault handler. `None` under the same conditions as [`write_trace_byte`].
pub fn with_trace_formatter<R>(
    f: impl FnOnce(&mut Formatter<&mut TraceSink<Mmio>>) -> R,
) -> Option<R> {
    with_trace_sink(|sink| f(&mut Formatter::new(sink)))
}

fn with_trace_sink<R>(f: impl FnOnce(&mut TraceSink<Mmio>) -> R) -> Option<R> {
    critical_section::with(|cs| {
        let mut slot = TRACE.borrow(cs).try_borrow_mut().ok()?;
        slot.as_mut().map(f)
    })
}
