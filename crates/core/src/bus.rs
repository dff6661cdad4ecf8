use crate::Address;

/// Word and byte access at absolute target addresses.
///
/// Register blocks, RAM and the canary scan all go through this trait so the same code
/// drives real hardware ([`Mmio`]) and the host-side register models.
pub trait MemoryBus {
    fn read_u32(&self, addr: Address) -> u32;
    fn write_u32(&mut self, addr: Address, value: u32);
    fn read_u8(&self, addr: Address) -> u8;
    fn write_u8(&mut self, addr: Address, value: u8);
}

impl<B: MemoryBus + ?Sized> MemoryBus for &mut B {
    fn read_u32(&self, addr: Address) -> u32 {
        (**self).read_u32(addr)
    }

    fn write_u32(&mut self, addr: Address, value: u32) {
        (**self).write_u32(addr, value)
    }

    fn read_u8(&self, addr: Address) -> u8 {
        (**self).read_u8(addr)
    }

    fn write_u8(&mut self, addr: Address, value: u8) {
        (**self).write_u8(addr, value)
    }
}

/// Volatile access to the target's own address space.
#[derive(Debug, Clone, Copy)]
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// # Safety
    /// Every address later passed to the bus must be mapped on the running target and
    /// valid for the access width. Only construct this on the firmware itself.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl MemoryBus for Mmio {
    fn read_u32(&self, addr: Address) -> u32 {
        // SAFETY: `Mmio::new` contract.
        unsafe { core::ptr::read_volatile(addr as usize as *const u32) }
    }

    fn write_u32(&mut self, addr: Address, value: u32) {
        // SAFETY: `Mmio::new` contract.
        unsafe { core::ptr::write_volatile(addr as usize as *mut u32, value) }
    }

    fn read_u8(&self, addr: Address) -> u8 {
        // SAFETY: `Mmio::new` contract.
        unsafe { core::ptr::read_volatile(addr as usize as *const u8) }
    }

    fn write_u8(&mut self, addr: Address, value: u8) {
        // SAFETY: `Mmio::new` contract.
        unsafe { core::ptr::write_volatile(addr as usize as *mut u8, value) }
    }
}
