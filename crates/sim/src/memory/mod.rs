use memstat_core::{Address, MemoryBus};

/// Flat little-endian RAM. Accesses outside the array read as zero and are dropped on
/// write; `violations` counts them.
#[derive(Debug, Clone)]
pub struct LinearMemory {
    pub data: Vec<u8>,
    pub base_addr: Address,
    violations: std::cell::Cell<u32>,
}

impl LinearMemory {
    pub fn new(size: usize, base_addr: Address) -> Self {
        Self {
            data: vec![0; size],
            base_addr,
            violations: std::cell::Cell::new(0),
        }
    }

    pub fn contains(&self, addr: Address, len: u32) -> bool {
        addr >= self.base_addr
            && (addr - self.base_addr) as u64 + len as u64 <= self.data.len() as u64
    }

    pub fn violations(&self) -> u32 {
        self.violations.get()
    }

    /// Fills `[addr, addr + len)` with `value`. Returns `false` if the range is not
    /// entirely inside this memory.
    pub fn fill(&mut self, addr: Address, len: u32, value: u8) -> bool {
        if !self.contains(addr, len) {
            return false;
        }
        let offset = (addr - self.base_addr) as usize;
        self.data[offset..offset + len as usize].fill(value);
        true
    }

    fn offset(&self, addr: Address, len: u32) -> Option<usize> {
        if self.contains(addr, len) {
            Some((addr - self.base_addr) as usize)
        } else {
            self.violations.set(self.violations.get() + 1);
            tracing::warn!(addr = format_args!("{:#010x}", addr), "RAM access out of range");
            None
        }
    }
}

impl MemoryBus for LinearMemory {
    fn read_u32(&self, addr: Address) -> u32 {
        match self.offset(addr, 4) {
            Some(o) => u32::from_le_bytes([
                self.data[o],
                self.data[o + 1],
                self.data[o + 2],
                self.data[o + 3],
            ]),
            None => 0,
        }
    }

    fn write_u32(&mut self, addr: Address, value: u32) {
        if let Some(o) = self.offset(addr, 4) {
            self.data[o..o + 4].copy_from_slice(&value.to_le_bytes());
        }
    }

    fn read_u8(&self, addr: Address) -> u8 {
        self.offset(addr, 1).map_or(0, |o| self.data[o])
    }

    fn write_u8(&mut self, addr: Address, value: u8) {
        if let Some(o) = self.offset(addr, 1) {
            self.data[o] = value;
        }
    }
}
