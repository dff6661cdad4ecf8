//! Polled UART output.

use crate::bus::MemoryBus;
use crate::sink::{ByteSink, InitState};
use crate::{Address, ConfigError, ConfigResult};

/// Baud rate used for the diagnostic console.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Platform pin identifier, opaque to this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PinName(pub u32);

/// Serial transmitter driven without interrupts or DMA.
pub trait SerialPort {
    /// Whether the platform already brought the port up (e.g. for its stdio console).
    fn is_initialized(&self) -> bool;
    fn init(&mut self, tx: PinName, rx: PinName);
    fn set_baud(&mut self, baud: u32);
    /// Blocks until the transmitter accepts the byte.
    fn write_byte(&mut self, byte: u8);

    fn check_baud(&self, baud: u32) -> ConfigResult<()> {
        if baud == 0 {
            return Err(ConfigError::ZeroBaud);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    pub tx: PinName,
    pub rx: PinName,
    pub baud: u32,
}

impl SerialConfig {
    pub fn stdio(tx: PinName, rx: PinName) -> Self {
        Self {
            tx,
            rx,
            baud: DEFAULT_BAUD,
        }
    }
}

/// Byte sink that brings its port up on first use.
#[derive(Debug)]
pub struct SerialSink<P> {
    port: P,
    config: SerialConfig,
    state: InitState,
}

impl<P: SerialPort> SerialSink<P> {
    pub fn new(port: P, config: SerialConfig) -> ConfigResult<Self> {
        port.check_baud(config.baud)?;
        Ok(Self {
            port,
            config,
            state: InitState::Uninitialized,
        })
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_initialized()
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn reset(&mut self) {
        self.state.reset();
    }

    pub fn into_inner(self) -> P {
        self.port
    }
}

impl<P: SerialPort> ByteSink for SerialSink<P> {
    fn emit_byte(&mut self, value: u8) {
        critical_section::with(|_| {
            if self.state.claim() && !self.port.is_initialized() {
                self.port.init(self.config.tx, self.config.rx);
                self.port.set_baud(self.config.baud);
                tracing::debug!(baud = self.config.baud, "diagnostic serial port initialized");
            }
            self.port.write_byte(value);
        })
    }
}

/// ARM PrimeCell PL011 register offsets and fields.
pub mod pl011 {
    pub const DR: u32 = 0x000;
    pub const FR: u32 = 0x018;
    pub const IBRD: u32 = 0x024;
    pub const FBRD: u32 = 0x028;
    pub const LCRH: u32 = 0x02C;
    pub const CR: u32 = 0x030;

    pub const FR_BUSY: u32 = 1 << 3;
    pub const FR_TXFF: u32 = 1 << 5;

    pub const LCRH_FEN: u32 = 1 << 4;
    pub const LCRH_WLEN_8: u32 = 0b11 << 5;

    pub const CR_UARTEN: u32 = 1 << 0;
    pub const CR_TXE: u32 = 1 << 8;
    pub const CR_RXE: u32 = 1 << 9;

    /// Largest value the 16-bit integer divisor register holds.
    pub const IBRD_MAX: u32 = 0xFFFF;

    /// `(IBRD, FBRD)` for `uart_clock / (16 * baud)`, fraction in 1/64ths rounded to
    /// nearest. `baud` must be non-zero.
    pub fn divisor(uart_clock_hz: u32, baud: u32) -> (u32, u32) {
        let baud = baud as u64;
        let div64 = ((uart_clock_hz as u64) * 4 + baud / 2) / baud;
        ((div64 >> 6) as u32, (div64 & 0x3F) as u32)
    }
}

/// PL011 UART at a fixed base address.
///
/// Pin muxing is board-level setup on PL011 parts, so `init` only programs the UART.
#[derive(Debug)]
pub struct Pl011<B> {
    bus: B,
    base: Address,
    uart_clock_hz: u32,
}

impl<B: MemoryBus> Pl011<B> {
    pub fn new(bus: B, base: Address, uart_clock_hz: u32) -> Self {
        Self {
            bus,
            base,
            uart_clock_hz,
        }
    }

    fn read(&self, offset: u32) -> u32 {
        self.bus.read_u32(self.base + offset)
    }

    fn write(&mut self, offset: u32, value: u32) {
        self.bus.write_u32(self.base + offset, value)
    }
}

impl<B: MemoryBus> SerialPort for Pl011<B> {
    fn is_initialized(&self) -> bool {
        self.read(pl011::CR) & pl011::CR_UARTEN != 0
    }

    fn init(&mut self, _tx: PinName, _rx: PinName) {
        // Divisor and line control only latch while the UART is disabled.
        self.write(pl011::CR, 0);
        self.write(pl011::LCRH, pl011::LCRH_WLEN_8 | pl011::LCRH_FEN);
        self.write(
            pl011::CR,
            pl011::CR_UARTEN | pl011::CR_TXE | pl011::CR_RXE,
        );
    }

    fn set_baud(&mut self, baud: u32) {
        let (ibrd, fbrd) = pl011::divisor(self.uart_clock_hz, baud);
        let cr = self.read(pl011::CR);
        while self.read(pl011::FR) & pl011::FR_BUSY != 0 {
            core::hint::spin_loop();
        }
        self.write(pl011::CR, cr & !pl011::CR_UARTEN);
        self.write(pl011::IBRD, ibrd);
        self.write(pl011::FBRD, fbrd);
        // LCRH write latches the new divisor.
        let lcrh = self.read(pl011::LCRH);
        self.write(pl011::LCRH, lcrh);
        self.write(pl011::CR, cr);
    }

    fn write_byte(&mut self, byte: u8) {
        while self.read(pl011::FR) & pl011::FR_TXFF != 0 {
            core::hint::spin_loop();
        }
        self.write(pl011::DR, byte as u32);
    }

    fn check_baud(&self, baud: u32) -> ConfigResult<()> {
        if baud == 0 {
            return Err(ConfigError::ZeroBaud);
        }
        let (ibrd, _) = pl011::divisor(self.uart_clock_hz, baud);
        if ibrd == 0 || ibrd > pl011::IBRD_MAX {
            return Err(ConfigError::UnreachableBaud {
                uart_clock_hz: self.uart_clock_hz,
                baud,
            });
        }
        Ok(())
    }
}
