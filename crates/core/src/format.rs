//! Allocation-free rendering of labels and fixed-width hex words.
//!
//! Nothing here touches `core::fmt`: a fault handler running on a corrupted heap or a
//! blown stack still gets readable output.

use crate::sink::ByteSink;

pub const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Width of a rendered `u32`.
pub const HEX32_WIDTH: usize = 8;

/// A literal label, length known at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(&'static [u8]);

impl Label {
    pub const fn new(text: &'static str) -> Self {
        Self(text.as_bytes())
    }

    pub const fn as_bytes(&self) -> &'static [u8] {
        self.0
    }

    pub const fn len(&self) -> usize {
        self.0.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Upper-case hex digits of `value`, most significant nibble first.
pub fn hex32(value: u32) -> [u8; HEX32_WIDTH] {
    let mut out = [0u8; HEX32_WIDTH];
    for (slot, shift) in out.iter_mut().zip((0..=28u32).rev().step_by(4)) {
        *slot = HEX_DIGITS[((value >> shift) & 0xF) as usize];
    }
    out
}

/// Renders report fields into a [`ByteSink`].
///
/// Every public operation runs inside its own critical section, so a label or a hex
/// word is never split by another writer. [`Formatter::atomic`] widens that to a whole
/// line.
#[derive(Debug)]
pub struct Formatter<S> {
    sink: S,
}

impl<S: ByteSink> Formatter<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn into_inner(self) -> S {
        self.sink
    }

    /// Emits `text` byte for byte. No terminator is assumed or written.
    pub fn print_label(&mut self, text: &[u8]) {
        critical_section::with(|_| {
            for &byte in text {
                self.sink.emit_byte(byte);
            }
        })
    }

    pub fn print(&mut self, label: Label) {
        self.print_label(label.as_bytes());
    }

    /// Emits exactly eight hex digits.
    pub fn print_hex32(&mut self, value: u32) {
        critical_section::with(|_| {
            for digit in hex32(value) {
                self.sink.emit_byte(digit);
            }
        })
    }

    /// Label immediately followed by its value, as one unit.
    pub fn print_field(&mut self, label: Label, value: u32) {
        critical_section::with(|_| {
            self.print(label);
            self.print_hex32(value);
        })
    }

    /// Runs `f` with the output channel held for the whole closure.
    pub fn atomic<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        critical_section::with(|_| f(self))
    }
}
