use std::any::Any;

use memstat_core::serial::pl011;

use crate::{Peripheral, SimResult};

pub const PL011_SIZE: u32 = 0x1000;

/// PL011 model. Transmission is instantaneous, so `FR.TXFF` and `FR.BUSY` never
/// assert; bytes written to `DR` while the transmitter is enabled land in `tx`.
#[derive(Debug, Default)]
pub struct Pl011Model {
    cr: u32,
    lcrh: u32,
    ibrd: u32,
    fbrd: u32,
    tx: Vec<u8>,
    init_count: u32,
    dropped: u32,
}

impl Pl011Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// A port the platform already enabled for its console.
    pub fn preinitialized(ibrd: u32, fbrd: u32) -> Self {
        Self {
            cr: pl011::CR_UARTEN | pl011::CR_TXE | pl011::CR_RXE,
            lcrh: pl011::LCRH_WLEN_8 | pl011::LCRH_FEN,
            ibrd,
            fbrd,
            ..Self::default()
        }
    }

    pub fn tx(&self) -> &[u8] {
        &self.tx
    }

    /// Number of bring-ups: CR written with UARTEN after having been cleared.
    pub fn init_count(&self) -> u32 {
        self.init_count
    }

    pub fn divisor(&self) -> (u32, u32) {
        (self.ibrd, self.fbrd)
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    fn transmitting(&self) -> bool {
        self.cr & (pl011::CR_UARTEN | pl011::CR_TXE) == pl011::CR_UARTEN | pl011::CR_TXE
    }
}

impl Peripheral for Pl011Model {
    fn read(&self, offset: u32) -> SimResult<u32> {
        Ok(match offset {
            pl011::CR => self.cr,
            pl011::LCRH => self.lcrh,
            pl011::IBRD => self.ibrd,
            pl011::FBRD => self.fbrd,
            _ => 0,
        })
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        match offset {
            pl011::DR => {
                if self.transmitting() {
                    self.tx.push(value as u8);
                } else {
                    self.dropped += 1;
                }
            }
            pl011::CR => {
                // Baud changes toggle UARTEN with TXE/RXE still set; only a bring-up
                // from a fully cleared CR counts.
                if self.cr == 0 && value & pl011::CR_UARTEN != 0 {
                    self.init_count += 1;
                }
                self.cr = value;
            }
            pl011::LCRH => self.lcrh = value,
            pl011::IBRD => self.ibrd = value & pl011::IBRD_MAX,
            pl011::FBRD => self.fbrd = value & 0x3F,
            _ => {}
        }
        Ok(())
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }
}
