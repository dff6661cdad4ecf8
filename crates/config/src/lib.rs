use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const SCHEMA_VERSION: &str = "1.0";

fn default_swo_baud() -> u32 {
    64_000
}

fn default_serial_baud() -> u32 {
    115_200
}

fn default_uart_base() -> u64 {
    0x4000_C000
}

fn default_uart_clock_hz() -> u32 {
    16_000_000
}

fn default_sentinel() -> u32 {
    0xCCCC_CCCC
}

/// Byte count written either as an integer or as a human-readable string ("4KiB").
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum SizeSpec {
    Bytes(u64),
    Text(String),
}

impl SizeSpec {
    pub fn bytes(&self) -> Result<u64> {
        match self {
            SizeSpec::Bytes(n) => Ok(*n),
            SizeSpec::Text(s) => parse_size(s),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MemoryRange {
    pub base: u64,
    pub size: SizeSpec,
}

impl MemoryRange {
    /// `(base, size)` checked to fit a 32-bit address space.
    pub fn resolve(&self) -> Result<(u32, u32)> {
        let size = self.size.bytes()?;
        let end = self.base.checked_add(size);
        match end {
            Some(end) if end <= 1 << 32 => Ok((self.base as u32, size as u32)),
            _ => anyhow::bail!(
                "Range {:#x} + {:#x} does not fit a 32-bit address space",
                self.base,
                size
            ),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TraceSettings {
    pub core_clock_hz: u32,
    #[serde(default = "default_swo_baud")]
    pub swo_baud: u32,
    #[serde(default)]
    pub stimulus_port: u8,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SerialSettings {
    #[serde(default = "default_uart_base")]
    pub base_address: u64,
    #[serde(default = "default_uart_clock_hz")]
    pub uart_clock_hz: u32,
    #[serde(default = "default_serial_baud")]
    pub baud: u32,
    #[serde(default)]
    pub tx_pin: u32,
    #[serde(default)]
    pub rx_pin: u32,
    /// The platform already brought the UART up before the diagnostics run.
    #[serde(default)]
    pub preinitialized: bool,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            base_address: default_uart_base(),
            uart_clock_hz: default_uart_clock_hz(),
            baud: default_serial_baud(),
            tx_pin: 0,
            rx_pin: 0,
            preinitialized: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StackGrowth {
    #[default]
    Downward,
    Upward,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CanarySettings {
    #[serde(default = "default_sentinel")]
    pub sentinel: u32,
    #[serde(default)]
    pub growth: StackGrowth,
    /// Bytes of the stack the simulated workload has dirtied.
    #[serde(default = "zero_size")]
    pub used: SizeSpec,
}

fn zero_size() -> SizeSpec {
    SizeSpec::Bytes(0)
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MemoryLayout {
    pub ram: MemoryRange,
    pub heap: MemoryRange,
    pub isr_stack: MemoryRange,
    #[serde(default)]
    pub isr_canary: Option<CanarySettings>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct HeapCounters {
    pub max_size: u32,
    pub alloc_count: u32,
    pub alloc_fail_count: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ThreadEntry {
    pub id: u32,
    pub stack_base: u32,
    pub stack_size: SizeSpec,
    pub used: u32,
    pub entry: u32,
    /// Simulates a thread whose control block the scheduler cannot resolve.
    #[serde(default)]
    pub corrupt: bool,
}

/// A simulated target: trace and serial settings, memory layout, allocator counters
/// and the scheduler's thread table.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub schema_version: String,
    pub name: String,
    pub trace: TraceSettings,
    #[serde(default)]
    pub serial: SerialSettings,
    pub memory: MemoryLayout,
    #[serde(default)]
    pub heap_stats: HeapCounters,
    #[serde(default)]
    pub threads: Vec<ThreadEntry>,
}

impl Scenario {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open scenario at {:?}", path.as_ref()))?;
        let scenario: Self =
            serde_yaml::from_reader(f).context("Failed to parse Scenario YAML")?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let scenario: Self = serde_yaml::from_str(yaml).context("Failed to parse Scenario YAML")?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '{}'",
                self.schema_version,
                SCHEMA_VERSION
            );
        }

        if self.trace.swo_baud == 0 {
            anyhow::bail!("Trace 'swo_baud' must be greater than zero");
        }
        if self.trace.core_clock_hz < self.trace.swo_baud {
            anyhow::bail!(
                "Trace 'core_clock_hz' ({}) must not be below 'swo_baud' ({})",
                self.trace.core_clock_hz,
                self.trace.swo_baud
            );
        }
        if self.trace.stimulus_port >= 32 {
            anyhow::bail!(
                "Trace 'stimulus_port' {} out of range (0..32)",
                self.trace.stimulus_port
            );
        }
        if self.serial.baud == 0 {
            anyhow::bail!("Serial 'baud' must be greater than zero");
        }

        let (ram_base, ram_size) = self.memory.ram.resolve().context("memory.ram")?;
        if ram_size == 0 {
            anyhow::bail!("Memory 'ram' size must be greater than zero");
        }
        let ram_end = ram_base as u64 + ram_size as u64;
        let inside_ram = |name: &str, range: &MemoryRange| -> Result<(u32, u32)> {
            let (base, size) = range.resolve().with_context(|| format!("memory.{}", name))?;
            if base < ram_base || base as u64 + size as u64 > ram_end {
                anyhow::bail!(
                    "Memory '{}' [{:#x}, {:#x}) lies outside RAM [{:#x}, {:#x})",
                    name,
                    base,
                    base as u64 + size as u64,
                    ram_base,
                    ram_end
                );
            }
            Ok((base, size))
        };
        inside_ram("heap", &self.memory.heap)?;
        let (isr_base, isr_size) = inside_ram("isr_stack", &self.memory.isr_stack)?;

        if let Some(canary) = &self.memory.isr_canary {
            if isr_base % 4 != 0 {
                anyhow::bail!("Canary-checked 'isr_stack' must start word-aligned");
            }
            let used = canary.used.bytes().context("memory.isr_canary.used")?;
            if used > isr_size as u64 {
                anyhow::bail!(
                    "Canary 'used' ({:#x}) exceeds the ISR stack size ({:#x})",
                    used,
                    isr_size
                );
            }
        }

        let mut seen = HashSet::new();
        for thread in &self.threads {
            if thread.id == 0 {
                anyhow::bail!("Thread id 0 is reserved for the null handle");
            }
            if !seen.insert(thread.id) {
                anyhow::bail!("Duplicate thread id {:#x}", thread.id);
            }
            let size = thread
                .stack_size
                .bytes()
                .with_context(|| format!("thread {:#x} stack_size", thread.id))?;
            if size > u32::MAX as u64 {
                anyhow::bail!("Thread {:#x} stack_size does not fit 32 bits", thread.id);
            }
        }

        Ok(())
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    // "4KiB" and "4 KiB" are both accepted.
    let trimmed = size_str.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (value, multiple) = trimmed.split_at(split);
    let normalized = format!("{} {}", value, multiple.trim());
    let s: Size = normalized
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
