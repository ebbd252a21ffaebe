// A stack-oriented IR with three-address forms and labels.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramIR {
    pub instrs: Vec<Instr>,
}

impl ProgramIR {
    pub fn new() -> Self {
        Self { instrs: Vec::new() }
    }

    pub fn push(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    pub fn to_lines(&self) -> Vec<String> {
        self.instrs.iter().map(|i| i.to_string()).collect()
    }

    /// The listing as a single string, one instruction per line.
    pub fn listing(&self) -> String {
        let mut out = self.to_lines().join("\n");
        out.push('\n');
        out
    }
}

impl From<Vec<Instr>> for ProgramIR {
    fn from(instrs: Vec<Instr>) -> Self {
        Self { instrs }
    }
}

/// Operand width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Width {
    W8,
    W16,
}

impl Width {
    pub fn bytes(&self) -> u16 {
        match self {
            Width::W8 => 1,
            Width::W16 => 2,
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            Width::W8 => "",
            Width::W16 => "16",
        }
    }
}

/// Arithmetic and comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl BinOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge
        )
    }

    /// Width of the value the operator produces for operands of `width`.
    /// Comparisons always produce a single byte holding 0 or 1.
    pub fn result_width(&self, width: Width) -> Width {
        if self.is_comparison() {
            Width::W8
        } else {
            width
        }
    }

    fn mnemonic(&self) -> &'static str {
        match self {
            BinOp::Add => "ADD",
            BinOp::Sub => "SUB",
            BinOp::Mul => "MUL",
            BinOp::Div => "DIV",
            BinOp::Mod => "MOD",
            BinOp::Eq => "EQ",
            BinOp::Ne => "NE",
            BinOp::Lt => "LT",
            BinOp::Gt => "GT",
            BinOp::Le => "LE",
            BinOp::Ge => "GE",
        }
    }
}

/// A data memory operand: a fixed address or a name for the storage
/// resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    Address(u16),
    Symbol(String),
}

impl From<u16> for Location {
    fn from(address: u16) -> Self {
        Location::Address(address)
    }
}

impl From<&str> for Location {
    fn from(name: &str) -> Self {
        Location::Symbol(name.to_string())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Address(a) => write!(f, "0x{a:04x}"),
            Location::Symbol(s) => write!(f, "{s}"),
        }
    }
}

/// One IR instruction.
///
/// The evaluation stack lives in RAM and grows downward. Sixteen-bit values
/// occupy two stack bytes with the high byte on top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instr {
    /// Push a byte.
    Push(u8),
    /// Push a sixteen-bit value.
    Push16(u16),
    Pop,
    Pop16,
    /// Push a copy of the top byte.
    Dup,
    /// Push a copy of the top sixteen-bit value.
    Dup16,

    /// Pop right then left operand, push `left op right`.
    Binary { op: BinOp, width: Width },
    /// `dst = left op right` on memory operands.
    Tac {
        op: BinOp,
        width: Width,
        dst: Location,
        left: Location,
        right: Location,
    },
    /// `dst = src + imm` (sixteen bits)
    AddImm16 { dst: Location, src: Location, imm: u16 },
    /// `dst = src - imm` (sixteen bits)
    SubImm16 { dst: Location, src: Location, imm: u16 },

    /// Push the byte at `loc`.
    Load(Location),
    /// Push the sixteen-bit value at `loc`.
    Load16(Location),
    /// Copy the top byte to `loc` without popping it.
    Store(Location),
    /// Copy the top sixteen-bit value to `loc` without popping it.
    Store16(Location),
    StoreImmediate(Location, u8),
    StoreImmediate16(Location, u16),

    /// Pop a sixteen-bit address, push the byte stored there.
    LoadIndirect,
    /// Pop a sixteen-bit address, push the `n` bytes stored there as a unit
    /// (the byte at the address ends up on top).
    LoadIndirectN(u16),
    /// Pop a sixteen-bit address, copy the top byte there without popping.
    StoreIndirect,
    /// Pop a sixteen-bit address, copy the top `n` bytes there without
    /// popping.
    StoreIndirectN(u16),

    /// Copy `count` bytes from `src` to `dst`.
    CopyWords { dst: Location, src: Location, count: u16 },
    /// As `CopyWords`, reading the source address from `src_ptr`.
    CopyWordsIndirectSource { dst: Location, src_ptr: Location, count: u16 },
    /// As `CopyWords`, reading the destination address from `dst_ptr`.
    CopyWordsIndirectDestination { dst_ptr: Location, src: Location, count: u16 },
    CopyWordsIndirectDestinationIndirectSource {
        dst_ptr: Location,
        src_ptr: Location,
        count: u16,
    },
    /// Copy a byte into a sixteen-bit slot, zeroing the high byte.
    CopyWordZeroExtend { dst: Location, src: Location },
    /// Store the sixteen-bit address of `label` at `dst`.
    CopyLabel { dst: Location, label: String },

    Label(String),
    Jmp(String),
    /// Pop two bytes and jump if they are equal.
    Je(String),
    /// Jump if the byte at `test` is zero.
    JumpIfZero { target: String, test: Location },
    /// Jump and link: the return address is left in the link register.
    Jalr(String),

    /// Push the frame pointer; frame pointer ← stack pointer.
    Enter,
    /// Stack pointer ← frame pointer; pop the frame pointer.
    Leave,
    /// Push the link register.
    PushReturnAddress,
    /// Pop a return address and jump to it.
    Ret,
    /// Jump to the link register.
    LeafRet,

    /// Pop a device id and a sixteen-bit address, push the byte read from
    /// the peripheral bus.
    PeekPeripheral,
    /// Pop a device id and a sixteen-bit address, write the byte now on top
    /// of the stack to the peripheral bus.
    PokePeripheral,

    Hlt,
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Push(v) => write!(f, "PUSH 0x{v:02x}"),
            Instr::Push16(v) => write!(f, "PUSH16 0x{v:04x}"),
            Instr::Pop => write!(f, "POP"),
            Instr::Pop16 => write!(f, "POP16"),
            Instr::Dup => write!(f, "DUP"),
            Instr::Dup16 => write!(f, "DUP16"),
            Instr::Binary { op, width } => write!(f, "{}{}", op.mnemonic(), width.suffix()),
            Instr::Tac {
                op,
                width,
                dst,
                left,
                right,
            } => write!(
                f,
                "{}{} {dst}, {left}, {right}",
                op.mnemonic(),
                width.suffix()
            ),
            Instr::AddImm16 { dst, src, imm } => write!(f, "ADDI16 {dst}, {src}, 0x{imm:04x}"),
            Instr::SubImm16 { dst, src, imm } => write!(f, "SUBI16 {dst}, {src}, 0x{imm:04x}"),
            Instr::Load(loc) => write!(f, "LOAD {loc}"),
            Instr::Load16(loc) => write!(f, "LOAD16 {loc}"),
            Instr::Store(loc) => write!(f, "STORE {loc}"),
            Instr::Store16(loc) => write!(f, "STORE16 {loc}"),
            Instr::StoreImmediate(loc, v) => write!(f, "STORE-IMMEDIATE {loc}, 0x{v:02x}"),
            Instr::StoreImmediate16(loc, v) => write!(f, "STORE-IMMEDIATE16 {loc}, 0x{v:04x}"),
            Instr::LoadIndirect => write!(f, "LOAD-INDIRECT"),
            Instr::LoadIndirectN(n) => write!(f, "LOAD-INDIRECTN {n}"),
            Instr::StoreIndirect => write!(f, "STORE-INDIRECT"),
            Instr::StoreIndirectN(n) => write!(f, "STORE-INDIRECTN {n}"),
            Instr::CopyWords { dst, src, count } => write!(f, "COPY {dst}, {src}, {count}"),
            Instr::CopyWordsIndirectSource { dst, src_ptr, count } => {
                write!(f, "COPY-IS {dst}, {src_ptr}, {count}")
            }
            Instr::CopyWordsIndirectDestination { dst_ptr, src, count } => {
                write!(f, "COPY-ID {dst_ptr}, {src}, {count}")
            }
            Instr::CopyWordsIndirectDestinationIndirectSource {
                dst_ptr,
                src_ptr,
                count,
            } => write!(f, "COPY-IDIS {dst_ptr}, {src_ptr}, {count}"),
            Instr::CopyWordZeroExtend { dst, src } => write!(f, "COPY-ZX {dst}, {src}"),
            Instr::CopyLabel { dst, label } => write!(f, "COPY-LABEL {dst}, {label}"),
            Instr::Label(name) => write!(f, "{name}:"),
            Instr::Jmp(label) => write!(f, "JMP {label}"),
            Instr::Je(label) => write!(f, "JE {label}"),
            Instr::JumpIfZero { target, test } => write!(f, "JZ {target}, {test}"),
            Instr::Jalr(label) => write!(f, "JALR {label}"),
            Instr::Enter => write!(f, "ENTER"),
            Instr::Leave => write!(f, "LEAVE"),
            Instr::PushReturnAddress => write!(f, "PUSH-RETURN-ADDRESS"),
            Instr::Ret => write!(f, "RET"),
            Instr::LeafRet => write!(f, "LEAF-RET"),
            Instr::PeekPeripheral => write!(f, "PEEK-PERIPHERAL"),
            Instr::PokePeripheral => write!(f, "POKE-PERIPHERAL"),
            Instr::Hlt => write!(f, "HLT"),
        }
    }
}

/// Generates unique label names with a fixed prefix.
#[derive(Debug, Clone)]
pub struct LabelMaker {
    prefix: &'static str,
    next: usize,
}

impl LabelMaker {
    pub fn new(prefix: &'static str) -> Self {
        Self { prefix, next: 0 }
    }

    pub fn next_label(&mut self) -> String {
        let label = format!("{}{}", self.prefix, self.next);
        self.next += 1;
        label
    }
}
