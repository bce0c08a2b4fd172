use crate::machine::Machine;
use crate::memory::MEMORY_SIZE;
use crate::stack::Stack;
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

pub const SNAPSHOT_MAGIC: &str = "tern.snapshot";
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StackState {
    bytes: Vec<u8>,
    copy_cursor: usize,
}

impl StackState {
    fn capture(stack: &Stack) -> Self {
        Self {
            bytes: stack.as_slice().to_vec(),
            copy_cursor: stack.cursor(),
        }
    }

    fn restore(&self, name: &str) -> Result<Stack> {
        Stack::load(&self.bytes, self.copy_cursor).ok_or_else(|| {
            CoreError::InvalidSnapshot(format!("{name} stack state violates its invariants"))
        })
    }
}

/// Serialized machine state: program counter, both stacks, interrupt
/// handshake and the full memory bank. Registered devices are not part
/// of a snapshot; hosts re-register them after a load.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    magic: String,
    version: u32,
    pc: u16,
    param: StackState,
    ret: StackState,
    irq_enabled: bool,
    irq_pending: Option<u8>,
    memory: Vec<u8>,
}

impl Machine {
    /// Writes the machine state to `path` as JSON.
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let snapshot = Snapshot {
            magic: SNAPSHOT_MAGIC.to_string(),
            version: SNAPSHOT_VERSION,
            pc: self.pc(),
            param: StackState::capture(self.cpu().param()),
            ret: StackState::capture(self.cpu().ret()),
            irq_enabled: self.irq().is_enabled(),
            irq_pending: self.irq().pending(),
            memory: self.memory().as_slice().to_vec(),
        };
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), &snapshot)?;
        Ok(())
    }

    /// Restores machine state saved by [`Machine::save_snapshot`].
    /// Device registrations on this machine are kept as they are.
    pub fn load_snapshot(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path)?;
        let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))?;
        if snapshot.magic != SNAPSHOT_MAGIC {
            return Err(CoreError::InvalidSnapshot(format!(
                "unexpected magic {:?}",
                snapshot.magic
            )));
        }
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CoreError::InvalidSnapshot(format!(
                "unsupported version {}",
                snapshot.version
            )));
        }
        if snapshot.memory.len() != MEMORY_SIZE {
            return Err(CoreError::InvalidSnapshot(format!(
                "memory bank has {} bytes",
                snapshot.memory.len()
            )));
        }
        let param = snapshot.param.restore("parameter")?;
        let ret = snapshot.ret.restore("return")?;

        self.memory_mut().fill_from(&snapshot.memory);
        *self.cpu_mut().param_mut() = param;
        *self.cpu_mut().ret_mut() = ret;
        self.set_pc(snapshot.pc);
        self.irq().set_enabled(snapshot.irq_enabled);
        self.irq().set_pending(snapshot.irq_pending);
        Ok(())
    }
}
