//! Instrumentation Trace Macrocell output over SWO.
//!
//! [`enable`] brings up the trace path (core debug, TPIU, ITM, DWT) and
//! [`TraceSink`] pushes bytes into one stimulus port.

use bitflags::bitflags;

use crate::bus::MemoryBus;
use crate::sink::{ByteSink, InitState};
use crate::{Address, ConfigError, ConfigResult};

/// SWO bit rate used when the caller does not pick one.
pub const DEFAULT_SWO_BAUD: u32 = 64_000;

/// Key written to a CoreSight Lock Access Register to unlock its control registers.
pub const LAR_UNLOCK_KEY: u32 = 0xC5AC_CE55;

/// TPIU Selected Pin Protocol: asynchronous NRZ (UART-style) SWO.
pub const SPPR_SWO_NRZ: u32 = 0x0000_0002;

/// DWT control value from the reference trace bring-up: sync taps, cycle counter
/// prescaler and PC sampling configuration.
pub const DWT_CTRL_TRACE_SETUP: u32 = 0x4000_03FE;

/// TPIU formatter: bypass formatting, keep TRIGIN enabled.
pub const FFCR_TRIGIN: u32 = 0x0000_0100;

/// Bit 0 of a stimulus port read: FIFO ready to accept a write.
pub const STIM_FIFOREADY: u32 = 1 << 0;

/// Number of ITM stimulus ports.
pub const STIMULUS_PORTS: u8 = 32;

const ITM_BASE: Address = 0xE000_0000;
const DWT_BASE: Address = 0xE000_1000;
const COREDEBUG_BASE: Address = 0xE000_EDF0;
const TPIU_BASE: Address = 0xE004_0000;

/// Registers touched by the trace bring-up, by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceRegister {
    /// Debug Exception and Monitor Control.
    Demcr,
    /// TPIU Async Clock Prescaler.
    TpiuAcpr,
    /// TPIU Selected Pin Protocol.
    TpiuSppr,
    /// TPIU Formatter and Flush Control.
    TpiuFfcr,
    ItmStimulus(u8),
    /// ITM Trace Enable (one bit per stimulus port).
    ItmTer,
    /// ITM Trace Privilege.
    ItmTpr,
    /// ITM Trace Control.
    ItmTcr,
    /// ITM Lock Access.
    ItmLar,
    DwtCtrl,
}

impl TraceRegister {
    pub const fn addr(self) -> Address {
        match self {
            TraceRegister::Demcr => COREDEBUG_BASE + 0x00C,
            TraceRegister::TpiuAcpr => TPIU_BASE + 0x010,
            TraceRegister::TpiuSppr => TPIU_BASE + 0x0F0,
            TraceRegister::TpiuFfcr => TPIU_BASE + 0x304,
            TraceRegister::ItmStimulus(port) => ITM_BASE + 4 * port as Address,
            TraceRegister::ItmTer => ITM_BASE + 0xE00,
            TraceRegister::ItmTpr => ITM_BASE + 0xE40,
            TraceRegister::ItmTcr => ITM_BASE + 0xE80,
            TraceRegister::ItmLar => ITM_BASE + 0xFB0,
            TraceRegister::DwtCtrl => DWT_BASE,
        }
    }

    /// Inverse of [`TraceRegister::addr`]. Unnamed addresses give `None`.
    pub fn from_addr(addr: Address) -> Option<Self> {
        const STIM_END: Address = ITM_BASE + 4 * STIMULUS_PORTS as Address;
        let reg = match addr {
            a if (ITM_BASE..STIM_END).contains(&a) => {
                if a % 4 != 0 {
                    return None;
                }
                TraceRegister::ItmStimulus(((a - ITM_BASE) / 4) as u8)
            }
            a if a == TraceRegister::Demcr.addr() => TraceRegister::Demcr,
            a if a == TraceRegister::TpiuAcpr.addr() => TraceRegister::TpiuAcpr,
            a if a == TraceRegister::TpiuSppr.addr() => TraceRegister::TpiuSppr,
            a if a == TraceRegister::TpiuFfcr.addr() => TraceRegister::TpiuFfcr,
            a if a == TraceRegister::ItmTer.addr() => TraceRegister::ItmTer,
            a if a == TraceRegister::ItmTpr.addr() => TraceRegister::ItmTpr,
            a if a == TraceRegister::ItmTcr.addr() => TraceRegister::ItmTcr,
            a if a == TraceRegister::ItmLar.addr() => TraceRegister::ItmLar,
            a if a == TraceRegister::DwtCtrl.addr() => TraceRegister::DwtCtrl,
            _ => return None,
        };
        Some(reg)
    }
}

bitflags! {
    /// Debug Exception and Monitor Control Register fields.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Demcr: u32 {
        /// Global enable for DWT and ITM.
        const TRCENA = 1 << 24;
    }
}

bitflags! {
    /// ITM Trace Control Register fields.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Tcr: u32 {
        const ITMENA = 1 << 0;
        const SYNCENA = 1 << 2;
        const SWOENA = 1 << 4;
        /// ATB ID field, all ones.
        const TRACE_BUS_ID = 0x7F << 16;
    }
}

bitflags! {
    /// ITM Trace Privilege Register: one bit per group of eight stimulus ports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Tpr: u32 {
        const PRIVMASK = 0xF;
    }
}

/// Where and how fast the trace output runs.
///
/// The core clock is always explicit; guessing it would silently produce a wrong
/// prescaler and garbage on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceConfig {
    port: u8,
    core_clock_hz: u32,
    swo_baud: u32,
}

impl TraceConfig {
    pub fn new(port: u8, core_clock_hz: u32) -> ConfigResult<Self> {
        Self::with_swo_baud(port, core_clock_hz, DEFAULT_SWO_BAUD)
    }

    pub fn with_swo_baud(port: u8, core_clock_hz: u32, swo_baud: u32) -> ConfigResult<Self> {
        if port >= STIMULUS_PORTS {
            return Err(ConfigError::InvalidStimulusPort(port));
        }
        if swo_baud == 0 {
            return Err(ConfigError::ZeroSwoRate);
        }
        if core_clock_hz < swo_baud {
            return Err(ConfigError::ClockBelowSwoRate {
                core_clock_hz,
                swo_baud,
            });
        }
        Ok(Self {
            port,
            core_clock_hz,
            swo_baud,
        })
    }

    pub fn port(&self) -> u8 {
        self.port
    }

    pub fn core_clock_hz(&self) -> u32 {
        self.core_clock_hz
    }

    pub fn swo_baud(&self) -> u32 {
        self.swo_baud
    }

    /// TPIU_ACPR value: SWO bit rate = core clock / (prescaler + 1).
    pub fn prescaler(&self) -> u32 {
        // Construction guarantees core_clock_hz >= swo_baud > 0.
        self.core_clock_hz / self.swo_baud - 1
    }
}

/// Runs the trace bring-up sequence. Unconditional: callers own the run-once guard.
///
/// DEMCR.TRCENA must land before any other trace register is written, and the ITM
/// lock must be opened before TCR/TPR/TER.
pub fn enable<B: MemoryBus + ?Sized>(bus: &mut B, config: &TraceConfig) {
    let prescaler = config.prescaler();

    bus.write_u32(TraceRegister::Demcr.addr(), Demcr::TRCENA.bits());
    bus.write_u32(TraceRegister::TpiuSppr.addr(), SPPR_SWO_NRZ);
    bus.write_u32(TraceRegister::TpiuAcpr.addr(), prescaler);
    bus.write_u32(TraceRegister::ItmLar.addr(), LAR_UNLOCK_KEY);
    let tcr = Tcr::TRACE_BUS_ID | Tcr::SWOENA | Tcr::SYNCENA | Tcr::ITMENA;
    bus.write_u32(TraceRegister::ItmTcr.addr(), tcr.bits());
    bus.write_u32(TraceRegister::ItmTpr.addr(), Tpr::PRIVMASK.bits());
    bus.write_u32(TraceRegister::ItmTer.addr(), 1 << config.port);
    bus.write_u32(TraceRegister::DwtCtrl.addr(), DWT_CTRL_TRACE_SETUP);
    bus.write_u32(TraceRegister::TpiuFfcr.addr(), FFCR_TRIGIN);

    tracing::debug!(
        port = config.port,
        core_clock_hz = config.core_clock_hz,
        swo_baud = config.swo_baud,
        prescaler,
        "ITM trace output enabled"
    );
}

/// Byte sink writing into one ITM stimulus port.
#[derive(Debug)]
pub struct TraceSink<B> {
    bus: B,
    config: TraceConfig,
    state: InitState,
}

impl<B: MemoryBus> TraceSink<B> {
    pub fn new(bus: B, config: TraceConfig) -> Self {
        Self {
            bus,
            config,
            state: InitState::Uninitialized,
        }
    }

    /// Stimulus port 0 at the default SWO rate.
    pub fn port0(bus: B, core_clock_hz: u32) -> ConfigResult<Self> {
        Ok(Self::new(bus, TraceConfig::new(0, core_clock_hz)?))
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_initialized()
    }

    /// Emit one character. Kept for call sites that think in terms of `putc`.
    pub fn write_trace_byte(&mut self, c: u8) {
        self.emit_byte(c);
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn reset(&mut self) {
        self.state.reset();
    }

    pub fn into_inner(self) -> B {
        self.bus
    }
}

impl<B: MemoryBus> ByteSink for TraceSink<B> {
    fn emit_byte(&mut self, value: u8) {
        critical_section::with(|_| {
            if self.state.claim() {
                enable(&mut self.bus, &self.config);
            }
            let stim = TraceRegister::ItmStimulus(self.config.port).addr();
            while self.bus.read_u32(stim) & STIM_FIFOREADY == 0 {
                core::hint::spin_loop();
            }
            self.bus.write_u8(stim, value);
        })
    }
}
