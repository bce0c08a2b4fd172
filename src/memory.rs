use crate::irq::InterruptLine;
use crate::{CoreError, Result};
use std::sync::Arc;

/// Size of the flat memory bank.
pub const MEMORY_SIZE: usize = 0x1_0000;

/// Well-known cell gating interrupt delivery. A stored value of 1 means
/// interrupts are enabled.
pub const IRQ_ENABLE_ADDR: u16 = 0x00B0;

/// Conventional ROM load address.
pub const ROM_BASE: u16 = 0x0100;

/// Flat 64 KiB byte bank addressed by `u16`, with big-endian 16-bit
/// accessors. Address arithmetic wraps, and plain reads and writes
/// cannot fail.
///
/// Stores to [`IRQ_ENABLE_ADDR`] are forwarded to the shared
/// [`InterruptLine`] so device threads observe enables performed by
/// interrupt handlers; the CPU mirrors the line back into the cell at
/// the top of each tick.
pub struct Memory {
    bytes: Box<[u8; MEMORY_SIZE]>,
    irq: Arc<InterruptLine>,
}

impl Memory {
    pub fn new(irq: Arc<InterruptLine>) -> Self {
        Self {
            bytes: Box::new([0; MEMORY_SIZE]),
            irq,
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        self.bytes[usize::from(addr)]
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        self.bytes[usize::from(addr)] = value;
        if addr == IRQ_ENABLE_ADDR {
            self.irq.set_enabled(value == 1);
        }
    }

    pub fn read16(&self, addr: u16) -> u16 {
        let hi = self.read(addr);
        let lo = self.read(addr.wrapping_add(1));
        u16::from_be_bytes([hi, lo])
    }

    pub fn write16(&mut self, addr: u16, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        self.write(addr, hi);
        self.write(addr.wrapping_add(1), lo);
    }

    /// Copies a ROM image into memory. Unlike plain writes this can
    /// fail: the image must fit below the end of the bank.
    pub fn load(&mut self, at: u16, image: &[u8]) -> Result<()> {
        let start = usize::from(at);
        let end = start
            .checked_add(image.len())
            .filter(|end| *end <= MEMORY_SIZE)
            .ok_or(CoreError::RomOverflow {
                at,
                len: image.len(),
            })?;
        self.bytes[start..end].copy_from_slice(image);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.bytes.fill(0);
        self.irq.set_enabled(false);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..]
    }

    pub(crate) fn fill_from(&mut self, bytes: &[u8]) {
        self.bytes.copy_from_slice(bytes);
    }

    /// Rewrites the master-enable cell from the shared line. Called at
    /// the top of each tick so programs read the device-side state.
    pub(crate) fn sync_master_enable(&mut self) {
        self.bytes[usize::from(IRQ_ENABLE_ADDR)] = u8::from(self.irq.is_enabled());
    }
}
