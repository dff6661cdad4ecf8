use std::any::Any;
use std::cell::Cell;

use memstat_core::itm::{Demcr, Tcr, TraceRegister, LAR_UNLOCK_KEY, STIM_FIFOREADY};
use memstat_core::Address;

use crate::{Peripheral, SimError, SimResult};

/// Start of the private peripheral bus window this model answers for.
pub const PPB_BASE: Address = 0xE000_0000;
/// Covers ITM, DWT, the debug control block and the TPIU.
pub const PPB_SIZE: u32 = 0x0004_1000;

/// Register model of the trace path: DEMCR, TPIU, ITM and DWT.
///
/// Stimulus writes only reach `captured` when the unit would really emit them:
/// `DEMCR.TRCENA`, `TCR.ITMENA` and the port's `TER` bit all set.
#[derive(Debug, Default)]
pub struct TraceUnit {
    demcr: u32,
    acpr: u32,
    sppr: u32,
    ffcr: u32,
    ter: u32,
    tpr: u32,
    tcr: u32,
    dwt_ctrl: u32,
    unlocked: bool,
    enable_count: u32,
    writes: Vec<(TraceRegister, u32)>,
    captured: Vec<(u8, u8)>,
    dropped: u32,
    busy_polls: u32,
    busy_remaining: Cell<u32>,
    polls: Cell<u32>,
}

impl TraceUnit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stimulus port reads "not ready" `polls` times before each byte.
    pub fn with_busy_polls(polls: u32) -> Self {
        Self {
            busy_polls: polls,
            busy_remaining: Cell::new(polls),
            ..Self::default()
        }
    }

    /// Register writes in the order they arrived, stimulus stores excluded.
    pub fn writes(&self) -> &[(TraceRegister, u32)] {
        &self.writes
    }

    /// Number of times the ITM lock was opened, one per bring-up sequence.
    pub fn enable_count(&self) -> u32 {
        self.enable_count
    }

    /// Bytes emitted on `port`, in order.
    pub fn captured(&self, port: u8) -> Vec<u8> {
        self.captured
            .iter()
            .filter(|(p, _)| *p == port)
            .map(|(_, b)| *b)
            .collect()
    }

    /// Stimulus stores swallowed because tracing was off.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    pub fn stimulus_polls(&self) -> u32 {
        self.polls.get()
    }

    pub fn prescaler(&self) -> u32 {
        self.acpr
    }

    fn emitting(&self, port: u8) -> bool {
        Demcr::from_bits_truncate(self.demcr).contains(Demcr::TRCENA)
            && Tcr::from_bits_truncate(self.tcr).contains(Tcr::ITMENA)
            && self.ter & (1 << port) != 0
    }

    fn register(offset: u32) -> SimResult<TraceRegister> {
        let addr = PPB_BASE + offset;
        TraceRegister::from_addr(addr).ok_or(SimError::UnmappedPeripheral(addr))
    }

    fn stimulus(&mut self, port: u8, value: u8) {
        if self.emitting(port) {
            self.captured.push((port, value));
        } else {
            self.dropped += 1;
        }
        self.busy_remaining.set(self.busy_polls);
    }
}

impl Peripheral for TraceUnit {
    fn read(&self, offset: u32) -> SimResult<u32> {
        let value = match Self::register(offset)? {
            TraceRegister::ItmStimulus(_) => {
                self.polls.set(self.polls.get() + 1);
                let remaining = self.busy_remaining.get();
                if remaining > 0 {
                    self.busy_remaining.set(remaining - 1);
                    0
                } else {
                    STIM_FIFOREADY
                }
            }
            TraceRegister::Demcr => self.demcr,
            TraceRegister::TpiuAcpr => self.acpr,
            TraceRegister::TpiuSppr => self.sppr,
            TraceRegister::TpiuFfcr => self.ffcr,
            TraceRegister::ItmTer => self.ter,
            TraceRegister::ItmTpr => self.tpr,
            TraceRegister::ItmTcr => self.tcr,
            TraceRegister::ItmLar => 0,
            TraceRegister::DwtCtrl => self.dwt_ctrl,
        };
        Ok(value)
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        let reg = Self::register(offset)?;
        if let TraceRegister::ItmStimulus(port) = reg {
            // A word store sends the low byte first; the observer only sees bytes here.
            self.stimulus(port, value as u8);
            return Ok(());
        }
        tracing::trace!(?reg, value = format_args!("{:#010x}", value), "trace register write");
        self.writes.push((reg, value));

        let locked_reg = matches!(
            reg,
            TraceRegister::ItmTcr | TraceRegister::ItmTpr | TraceRegister::ItmTer
        );
        if locked_reg && !self.unlocked {
            tracing::warn!(?reg, "ITM register written while locked, ignored");
            return Ok(());
        }

        match reg {
            TraceRegister::Demcr => self.demcr = value,
            TraceRegister::TpiuAcpr => self.acpr = value,
            TraceRegister::TpiuSppr => self.sppr = value,
            TraceRegister::TpiuFfcr => self.ffcr = value,
            TraceRegister::ItmTer => self.ter = value,
            TraceRegister::ItmTpr => self.tpr = value,
            TraceRegister::ItmTcr => self.tcr = value,
            TraceRegister::ItmLar => {
                self.unlocked = value == LAR_UNLOCK_KEY;
                if self.unlocked {
                    self.enable_count += 1;
                }
            }
            TraceRegister::DwtCtrl => self.dwt_ctrl = value,
            TraceRegister::ItmStimulus(_) => {}
        }
        Ok(())
    }

    fn write_u8(&mut self, offset: u32, value: u8) -> SimResult<()> {
        match Self::register(offset)? {
            TraceRegister::ItmStimulus(port) => {
                self.stimulus(port, value);
                Ok(())
            }
            _ => Err(SimError::MemoryViolation(PPB_BASE + offset)),
        }
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }
}
