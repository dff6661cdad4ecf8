pub mod trace;
pub mod uart;

pub use trace::TraceUnit;
pub use uart::Pl011Model;
