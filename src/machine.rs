use crate::bus::{Bus, BusTable, Device};
use crate::cpu::{Cpu, DebugState};
use crate::irq::InterruptLine;
use crate::memory::Memory;
use crate::{CoreError, Result};
use std::sync::Arc;

/// The whole computer: memory, CPU, bus table and the shared interrupt
/// line. Hosts construct one, load a ROM, register device callbacks and
/// drive the clock.
pub struct Machine {
    memory: Memory,
    cpu: Cpu,
    buses: BusTable,
    irq: Arc<InterruptLine>,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    pub fn new() -> Self {
        let irq = Arc::new(InterruptLine::new());
        Self {
            memory: Memory::new(Arc::clone(&irq)),
            cpu: Cpu::new(),
            buses: BusTable::new(),
            irq,
        }
    }

    /// Copies a ROM image into memory at `at`. Fails when the image
    /// does not fit.
    pub fn load_rom(&mut self, image: &[u8], at: u16) -> Result<()> {
        self.memory.load(at, image)?;
        log::debug!("loaded {} byte ROM at {at:#06x}", image.len());
        Ok(())
    }

    /// Binds a device callback to bus slot `id` (low 4 bits), replacing
    /// any previous device on that slot.
    pub fn register<D: Device + 'static>(&mut self, id: u8, device: D) {
        self.buses.insert(Bus::new(id, device));
    }

    /// Power-cycle: PC to zero, both stacks emptied, memory and the
    /// interrupt line cleared. Reload the ROM afterwards.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.memory.clear();
        self.irq.reset();
    }

    /// Runs a single clock tick.
    pub fn tick(&mut self) -> Result<()> {
        self.cpu.tick(&mut self.memory, &mut self.buses, &self.irq)
    }

    /// Runs up to `ticks` clock ticks and returns how many completed.
    ///
    /// Tick faults stop execution but never propagate: reaching the
    /// break address is the normal end of a program, and any other
    /// fault is logged and turned into a logical halt (PC forced to
    /// zero) so a bad instruction cannot take the host down.
    pub fn run(&mut self, ticks: usize) -> usize {
        for done in 0..ticks {
            match self.tick() {
                Ok(()) => {}
                Err(CoreError::PcBreak) => {
                    log::trace!("program halted after {done} ticks");
                    return done;
                }
                Err(err) => {
                    log::warn!("tick fault after {done} ticks: {err}; halting");
                    self.cpu.set_pc(0);
                    return done;
                }
            }
        }
        ticks
    }

    pub fn pc(&self) -> u16 {
        self.cpu.pc()
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.cpu.set_pc(pc);
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn bus(&self, id: u8) -> Option<&Bus> {
        self.buses.get(id)
    }

    pub fn bus_mut(&mut self, id: u8) -> Option<&mut Bus> {
        self.buses.get_mut(id)
    }

    /// Handle for device threads to signal interrupts through.
    pub fn interrupt_line(&self) -> Arc<InterruptLine> {
        Arc::clone(&self.irq)
    }

    /// Same-thread convenience for [`InterruptLine::interrupt_enable`].
    pub fn interrupt_enable(&self, bus: u8) -> bool {
        self.irq.interrupt_enable(bus)
    }

    pub fn debug_state(&self) -> DebugState {
        self.cpu.debug_state()
    }

    pub(crate) fn irq(&self) -> &InterruptLine {
        &self.irq
    }
}
