pub mod bus;
pub mod cpu;
pub mod irq;
pub mod machine;
pub mod memory;
pub mod snapshot;
pub mod stack;

use thiserror::Error;

pub use bus::{
    Access, Bus, BusTable, Device, BUS_COUNT, DEV_AUDIO, DEV_CONSOLE, DEV_CONTROLLER_1,
    DEV_CONTROLLER_2, DEV_DISPLAY, DEV_FILE, DEV_MOUSE, DEV_SYSTEM, DISPLAY_HEIGHT, DISPLAY_WIDTH,
    PORT_COUNT,
};
pub use cpu::{Cpu, DebugState, Opcode, FLAG_COPY, FLAG_SHORT, FLAG_SWAP, OPCODE_MASK};
pub use irq::InterruptLine;
pub use machine::Machine;
pub use memory::{Memory, IRQ_ENABLE_ADDR, MEMORY_SIZE, ROM_BASE};
pub use snapshot::{SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
pub use stack::{Stack, STACK_SIZE};

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("stack overflow")]
    StackOverflow,
    #[error("stack underflow")]
    StackUnderflow,
    #[error("program counter reached the break address")]
    PcBreak,
    #[error("interrupt pending on unregistered bus {bus:#x}")]
    InvalidInterrupt { bus: u8 },
    #[error("ROM image of {len} bytes does not fit at {at:#06x}")]
    RomOverflow { at: u16, len: usize },
    #[error("unknown opcode {opcode:#04x}")]
    UnknownOpcode { opcode: u8 },
    #[error("division by zero")]
    DivisionByZero,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("snapshot error: {0}")]
    InvalidSnapshot(String),
}
