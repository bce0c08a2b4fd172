use crate::bus::BusTable;
use crate::irq::InterruptLine;
use crate::memory::Memory;
use crate::stack::Stack;
use crate::{CoreError, Result};
use serde::Serialize;

/// Source and target stacks are exchanged for this instruction.
pub const FLAG_SWAP: u8 = 0x80;
/// Stack reads are non-destructive (walk the copy cursor).
pub const FLAG_COPY: u8 = 0x40;
/// Operands are 16-bit shorts instead of bytes.
pub const FLAG_SHORT: u8 = 0x20;
/// Low bits of an instruction byte holding the opcode index.
pub const OPCODE_MASK: u8 = 0x1F;

/// The thirty opcodes. Indices 0x1E and 0x1F are reserved and fail
/// decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Brk = 0x00,
    Nop = 0x01,
    Lit = 0x02,
    Pop = 0x03,
    Dup = 0x04,
    Ovr = 0x05,
    Rot = 0x06,
    Swp = 0x07,
    Sts = 0x08,
    Add = 0x09,
    Sub = 0x0A,
    Mul = 0x0B,
    Div = 0x0C,
    And = 0x0D,
    Ior = 0x0E,
    Xor = 0x0F,
    Shi = 0x10,
    Equ = 0x11,
    Neq = 0x12,
    Grt = 0x13,
    Lst = 0x14,
    Jmp = 0x15,
    Jnz = 0x16,
    Jsr = 0x17,
    Lda = 0x18,
    Sta = 0x19,
    Ldr = 0x1A,
    Str = 0x1B,
    Bsi = 0x1C,
    Bso = 0x1D,
}

impl Opcode {
    pub fn from_index(index: u8) -> Option<Self> {
        use Opcode::*;
        Some(match index {
            0x00 => Brk,
            0x01 => Nop,
            0x02 => Lit,
            0x03 => Pop,
            0x04 => Dup,
            0x05 => Ovr,
            0x06 => Rot,
            0x07 => Swp,
            0x08 => Sts,
            0x09 => Add,
            0x0A => Sub,
            0x0B => Mul,
            0x0C => Div,
            0x0D => And,
            0x0E => Ior,
            0x0F => Xor,
            0x10 => Shi,
            0x11 => Equ,
            0x12 => Neq,
            0x13 => Grt,
            0x14 => Lst,
            0x15 => Jmp,
            0x16 => Jnz,
            0x17 => Jsr,
            0x18 => Lda,
            0x19 => Sta,
            0x1A => Ldr,
            0x1B => Str,
            0x1C => Bsi,
            0x1D => Bso,
            _ => return None,
        })
    }

    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Brk => "BRK",
            Nop => "NOP",
            Lit => "LIT",
            Pop => "POP",
            Dup => "DUP",
            Ovr => "OVR",
            Rot => "ROT",
            Swp => "SWP",
            Sts => "STS",
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Div => "DIV",
            And => "AND",
            Ior => "IOR",
            Xor => "XOR",
            Shi => "SHI",
            Equ => "EQU",
            Neq => "NEQ",
            Grt => "GRT",
            Lst => "LST",
            Jmp => "JMP",
            Jnz => "JNZ",
            Jsr => "JSR",
            Lda => "LDA",
            Sta => "STA",
            Ldr => "LDR",
            Str => "STR",
            Bsi => "BSI",
            Bso => "BSO",
        }
    }

    /// Encodes the opcode with modifier flags into an instruction byte.
    pub const fn with_flags(self, flags: u8) -> u8 {
        self as u8 | flags
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Width and read-mode selection decoded once per tick.
#[derive(Clone, Copy)]
struct Mode {
    short: bool,
    copy: bool,
}

impl Mode {
    /// Pops an operand at the selected width, byte values zero-extended.
    fn take(self, stack: &mut Stack) -> Result<u16> {
        if self.short {
            self.take16(stack)
        } else {
            Ok(u16::from(self.take8(stack)?))
        }
    }

    /// Pops a byte regardless of the short flag (conditions, offsets,
    /// shift controls and port bytes are always 8-bit).
    fn take8(self, stack: &mut Stack) -> Result<u8> {
        if self.copy {
            stack.peek8()
        } else {
            stack.pop8()
        }
    }

    /// Pops a short regardless of the short flag (absolute addresses).
    fn take16(self, stack: &mut Stack) -> Result<u16> {
        if self.copy {
            stack.peek16()
        } else {
            stack.pop16()
        }
    }

    /// Pushes a result at the selected width.
    fn put(self, stack: &mut Stack, value: u16) -> Result<()> {
        if self.short {
            stack.push16(value)
        } else {
            stack.push8(value as u8)
        }
    }

    fn mask(self) -> u32 {
        if self.short {
            0xFFFF
        } else {
            0xFF
        }
    }
}

/// Snapshot of the visible execution state, rendered by `BRK` and
/// available to hosts for their own reporting.
#[derive(Debug, Clone, Serialize)]
pub struct DebugState {
    pub pc: u16,
    pub param: Vec<u8>,
    pub ret: Vec<u8>,
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

impl std::fmt::Display for DebugState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pc={:#06x} param=[{}] ret=[{}]",
            self.pc,
            hex_bytes(&self.param),
            hex_bytes(&self.ret)
        )
    }
}

/// PC-relative target anchored at the instruction's own address.
fn relative(base: u16, off: u8) -> u16 {
    base.wrapping_add((off as i8) as u16)
}

/// Fetch-decode-execute engine: program counter plus the two stacks.
///
/// The machine context (memory, buses, interrupt line) is borrowed per
/// tick rather than owned, so the CPU carries no back-reference.
pub struct Cpu {
    pc: u16,
    param: Stack,
    ret: Stack,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            pc: 0,
            param: Stack::new(),
            ret: Stack::new(),
        }
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.pc = pc;
    }

    /// The parameter stack, primary operand stack.
    pub fn param(&self) -> &Stack {
        &self.param
    }

    pub fn param_mut(&mut self) -> &mut Stack {
        &mut self.param
    }

    /// The return stack, default target for saved return addresses.
    pub fn ret(&self) -> &Stack {
        &self.ret
    }

    pub fn ret_mut(&mut self) -> &mut Stack {
        &mut self.ret
    }

    pub fn reset(&mut self) {
        self.pc = 0;
        self.param.reset();
        self.ret.reset();
    }

    pub fn debug_state(&self) -> DebugState {
        DebugState {
            pc: self.pc,
            param: self.param.as_slice().to_vec(),
            ret: self.ret.as_slice().to_vec(),
        }
    }

    fn src(&mut self, swap: bool) -> &mut Stack {
        if swap {
            &mut self.ret
        } else {
            &mut self.param
        }
    }

    fn dst(&mut self, swap: bool) -> &mut Stack {
        if swap {
            &mut self.param
        } else {
            &mut self.ret
        }
    }

    /// Runs one clock tick: interrupt service, fetch, decode, execute.
    pub(crate) fn tick(
        &mut self,
        memory: &mut Memory,
        buses: &mut BusTable,
        irq: &InterruptLine,
    ) -> Result<()> {
        memory.sync_master_enable();
        if !irq.is_enabled() {
            if let Some(bus_id) = irq.take_pending() {
                let bus = buses
                    .get(bus_id)
                    .ok_or(CoreError::InvalidInterrupt { bus: bus_id })?;
                let vector = bus.vector();
                self.ret.push16(self.pc)?;
                log::trace!("interrupt: bus {bus_id:#x} vector {vector:#06x}");
                self.pc = vector;
            }
        }

        if self.pc == 0 {
            return Err(CoreError::PcBreak);
        }

        let op_addr = self.pc;
        let raw = memory.read(op_addr);
        self.pc = op_addr.wrapping_add(1);

        let swap = raw & FLAG_SWAP != 0;
        let mode = Mode {
            short: raw & FLAG_SHORT != 0,
            copy: raw & FLAG_COPY != 0,
        };
        let op = Opcode::from_index(raw & OPCODE_MASK)
            .ok_or(CoreError::UnknownOpcode { opcode: raw })?;
        if mode.copy {
            self.src(swap).begin_copy();
        }

        match op {
            Opcode::Brk => {
                log::debug!("BRK at {:#06x}: {}", op_addr, self.debug_state());
                self.pc = 0;
            }
            Opcode::Nop => {}
            Opcode::Lit => {
                let value = if mode.short {
                    let v = memory.read16(self.pc);
                    self.pc = self.pc.wrapping_add(2);
                    v
                } else {
                    let v = u16::from(memory.read(self.pc));
                    self.pc = self.pc.wrapping_add(1);
                    v
                };
                mode.put(self.src(swap), value)?;
            }
            Opcode::Pop => {
                mode.take(self.src(swap))?;
            }
            Opcode::Dup => {
                let stack = self.src(swap);
                let a = mode.take(stack)?;
                mode.put(stack, a)?;
                mode.put(stack, a)?;
            }
            Opcode::Ovr => {
                let stack = self.src(swap);
                let a = mode.take(stack)?;
                let b = mode.take(stack)?;
                mode.put(stack, b)?;
                mode.put(stack, a)?;
                mode.put(stack, b)?;
            }
            Opcode::Rot => {
                let stack = self.src(swap);
                let a = mode.take(stack)?;
                let b = mode.take(stack)?;
                let c = mode.take(stack)?;
                mode.put(stack, b)?;
                mode.put(stack, a)?;
                mode.put(stack, c)?;
            }
            Opcode::Swp => {
                let stack = self.src(swap);
                let a = mode.take(stack)?;
                let b = mode.take(stack)?;
                mode.put(stack, a)?;
                mode.put(stack, b)?;
            }
            Opcode::Sts => {
                let value = mode.take(self.src(swap))?;
                mode.put(self.dst(swap), value)?;
            }
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                let stack = self.src(swap);
                let a = u32::from(mode.take(stack)?);
                let b = u32::from(mode.take(stack)?);
                let value = match op {
                    Opcode::Add => b.wrapping_add(a),
                    Opcode::Sub => b.wrapping_sub(a),
                    Opcode::Mul => b.wrapping_mul(a),
                    _ => {
                        if a == 0 {
                            return Err(CoreError::DivisionByZero);
                        }
                        b / a
                    }
                };
                mode.put(stack, (value & mode.mask()) as u16)?;
            }
            Opcode::And | Opcode::Ior | Opcode::Xor => {
                let stack = self.src(swap);
                let a = mode.take(stack)?;
                let b = mode.take(stack)?;
                let value = match op {
                    Opcode::And => b & a,
                    Opcode::Ior => b | a,
                    _ => b ^ a,
                };
                mode.put(stack, value)?;
            }
            Opcode::Shi => {
                let stack = self.src(swap);
                let control = mode.take8(stack)?;
                let value = u32::from(mode.take(stack)?);
                let right = u32::from(control & 0x0F);
                let left = u32::from(control >> 4);
                let shifted = (value >> right) << left;
                mode.put(stack, (shifted & mode.mask()) as u16)?;
            }
            Opcode::Equ | Opcode::Neq | Opcode::Grt | Opcode::Lst => {
                let stack = self.src(swap);
                let a = mode.take(stack)?;
                let b = mode.take(stack)?;
                let truth = match op {
                    Opcode::Equ => b == a,
                    Opcode::Neq => b != a,
                    Opcode::Grt => b > a,
                    _ => b < a,
                };
                // Comparisons always produce a one-byte boolean.
                stack.push8(u8::from(truth))?;
            }
            Opcode::Jmp => {
                self.pc = self.branch_target(op_addr, mode, swap)?;
            }
            Opcode::Jnz => {
                let target = self.branch_target(op_addr, mode, swap)?;
                let cond = mode.take8(self.src(swap))?;
                if cond != 0 {
                    self.pc = target;
                }
            }
            Opcode::Jsr => {
                let target = self.branch_target(op_addr, mode, swap)?;
                let return_addr = self.pc;
                self.dst(swap).push16(return_addr)?;
                self.pc = target;
            }
            Opcode::Lda => {
                let addr = mode.take16(self.src(swap))?;
                let value = if mode.short {
                    memory.read16(addr)
                } else {
                    u16::from(memory.read(addr))
                };
                mode.put(self.src(swap), value)?;
            }
            Opcode::Sta => {
                let stack = self.src(swap);
                let addr = mode.take16(stack)?;
                let value = mode.take(stack)?;
                if mode.short {
                    memory.write16(addr, value);
                } else {
                    memory.write(addr, value as u8);
                }
            }
            Opcode::Ldr => {
                let off = mode.take8(self.src(swap))?;
                let addr = relative(op_addr, off);
                let value = if mode.short {
                    memory.read16(addr)
                } else {
                    u16::from(memory.read(addr))
                };
                mode.put(self.src(swap), value)?;
            }
            Opcode::Str => {
                let stack = self.src(swap);
                let off = mode.take8(stack)?;
                let value = mode.take(stack)?;
                let addr = relative(op_addr, off);
                if mode.short {
                    memory.write16(addr, value);
                } else {
                    memory.write(addr, value as u8);
                }
            }
            Opcode::Bsi => {
                let port_byte = mode.take8(self.src(swap))?;
                if let Some(bus) = buses.get_mut(port_byte >> 4) {
                    let value = if mode.short {
                        bus.read16(memory, port_byte & 0x0F)
                    } else {
                        u16::from(bus.read(memory, port_byte & 0x0F))
                    };
                    mode.put(self.src(swap), value)?;
                }
            }
            Opcode::Bso => {
                let stack = self.src(swap);
                let port_byte = mode.take8(stack)?;
                let value = mode.take(stack)?;
                if let Some(bus) = buses.get_mut(port_byte >> 4) {
                    if mode.short {
                        bus.write16(memory, port_byte & 0x0F, value);
                    } else {
                        bus.write(memory, port_byte & 0x0F, value as u8);
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolves a branch target: an 8-bit signed offset from the opcode
    /// address, or a 16-bit absolute address under the short flag.
    fn branch_target(&mut self, op_addr: u16, mode: Mode, swap: bool) -> Result<u16> {
        if mode.short {
            mode.take16(self.src(swap))
        } else {
            let off = mode.take8(self.src(swap))?;
            Ok(relative(op_addr, off))
        }
    }
}
