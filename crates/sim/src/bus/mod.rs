use std::cell::RefCell;

use memstat_core::{Address, MemoryBus};

use crate::{Peripheral, SimError, SimResult};

#[derive(Debug)]
pub struct PeripheralEntry {
    pub name: String,
    pub base: Address,
    pub size: u32,
    pub dev: Box<dyn Peripheral>,
}

impl PeripheralEntry {
    fn offset_of(&self, addr: Address) -> Option<u32> {
        let offset = addr.checked_sub(self.base)?;
        (offset < self.size).then_some(offset)
    }
}

/// Routes absolute addresses to the mapped register blocks.
///
/// [`MemoryBus`] cannot fail, so a bad access reads as zero and is recorded instead;
/// callers check [`SystemBus::violations`] after a run.
#[derive(Debug, Default)]
pub struct SystemBus {
    pub peripherals: Vec<PeripheralEntry>,
    violations: RefCell<Vec<SimError>>,
}

impl SystemBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(&mut self, name: &str, base: Address, size: u32, dev: Box<dyn Peripheral>) {
        tracing::debug!(name, base = format_args!("{:#010x}", base), size, "mapping peripheral");
        self.peripherals.push(PeripheralEntry {
            name: name.to_string(),
            base,
            size,
            dev,
        });
    }

    /// The peripheral registered as `name`, if it is a `T`.
    pub fn peripheral<T: 'static>(&self, name: &str) -> Option<&T> {
        self.peripherals
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.dev.as_any())
            .and_then(|any| any.downcast_ref::<T>())
    }

    pub fn violations(&self) -> Vec<SimError> {
        self.violations.borrow().clone()
    }

    pub fn try_read_u32(&self, addr: Address) -> SimResult<u32> {
        let (entry, offset) = self.route(addr)?;
        entry.dev.read(offset)
    }

    pub fn try_write_u32(&mut self, addr: Address, value: u32) -> SimResult<()> {
        let (entry, offset) = self.route_mut(addr)?;
        entry.dev.write(offset, value)
    }

    fn route(&self, addr: Address) -> SimResult<(&PeripheralEntry, u32)> {
        self.peripherals
            .iter()
            .find_map(|p| p.offset_of(addr).map(|o| (p, o)))
            .ok_or(SimError::UnmappedPeripheral(addr))
    }

    fn route_mut(&mut self, addr: Address) -> SimResult<(&mut PeripheralEntry, u32)> {
        self.peripherals
            .iter_mut()
            .find_map(|p| p.offset_of(addr).map(|o| (p, o)))
            .ok_or(SimError::UnmappedPeripheral(addr))
    }

    fn record<T: Default>(&self, result: SimResult<T>) -> T {
        result.unwrap_or_else(|err| {
            tracing::warn!(%err, "bus fault");
            self.violations.borrow_mut().push(err);
            T::default()
        })
    }
}

impl MemoryBus for SystemBus {
    fn read_u32(&self, addr: Address) -> u32 {
        self.record(self.try_read_u32(addr))
    }

    fn write_u32(&mut self, addr: Address, value: u32) {
        let result = self.try_write_u32(addr, value);
        self.record(result)
    }

    fn read_u8(&self, addr: Address) -> u8 {
        let result = self.route(addr).and_then(|(entry, offset)| entry.dev.read_u8(offset));
        self.record(result)
    }

    fn write_u8(&mut self, addr: Address, value: u8) {
        let result = self
            .route_mut(addr)
            .and_then(|(entry, offset)| entry.dev.write_u8(offset, value));
        self.record(result)
    }
}
