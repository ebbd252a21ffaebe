//! Machine micro-operation types.
//!
//! This module defines the typed micro-operation set (`MicroOp`), the ALU
//! operations (`AluOp`) and branch conditions (`Cond`). Each micro-op knows
//! which tracked registers it reads (`dependencies`), which it overwrites
//! (`dependents`), and whether it has an effect outside the register file.

use super::abi::RegisterName;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Condition codes (for conditional branches)
// ============================================================================

/// Condition code for conditional branches. Evaluated against the flags left
/// by the most recent `CMP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Cond {
    /// Returns the assembly mnemonic for this condition.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Cond::Eq => "JE",
            Cond::Ne => "JNE",
            Cond::Lt => "JL",
            Cond::Gt => "JG",
            Cond::Le => "JLE",
            Cond::Ge => "JGE",
        }
    }
}

// ============================================================================
// ALU operations
// ============================================================================

/// An ALU operation. The ALU always reads both operand latches A and B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AluOp {
    /// `A + B`
    Add,
    /// `A - B`
    Sub,
    /// `A + B + carry`
    Adc,
    /// `A - B - borrow`
    Sbc,
    /// `A - 1`, sets carry when the result wraps
    Dea,
    /// `A - 1` if carry is set, otherwise `A`
    Dca,
}

impl AluOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            AluOp::Add => "ADD",
            AluOp::Sub => "SUB",
            AluOp::Adc => "ADC",
            AluOp::Sbc => "SBC",
            AluOp::Dea => "DEA",
            AluOp::Dca => "DCA",
        }
    }
}

// ============================================================================
// Typed micro-operation
// ============================================================================

/// A typed machine micro-operation.
///
/// Jumps take their target from XY; the lowering compiler loads XY with a
/// pair of patchable `LI` instructions just before each jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MicroOp {
    /// Does nothing. Also the same-width placeholder left behind by
    /// dead-store elimination.
    Nop,
    /// Halt until reset.
    Hlt,
    /// Increment the UV register pair.
    Inuv,
    /// Increment the XY register pair.
    Inxy,
    /// `MOV dst, src`
    Mov { dst: RegisterName, src: RegisterName },
    /// `LI dst, imm`
    Li { dst: RegisterName, imm: u8 },
    /// `op dst`, ALU result written to `dst`
    Alu { op: AluOp, dst: RegisterName },
    /// Compare A with B and set flags.
    Cmp,
    /// Unconditional jump to XY.
    Jmp,
    /// Conditional jump to XY.
    Branch(Cond),
    /// Jump to XY, saving the return address in G:H.
    Jalr,
}

// ── Convenience constructors ────────────────────────────────────────────

impl MicroOp {
    pub fn mov(dst: RegisterName, src: RegisterName) -> Self {
        MicroOp::Mov { dst, src }
    }

    pub fn li(dst: RegisterName, imm: u8) -> Self {
        MicroOp::Li { dst, imm }
    }

    pub fn alu(op: AluOp, dst: RegisterName) -> Self {
        MicroOp::Alu { op, dst }
    }

    /// Returns `true` if this micro-op transfers control.
    pub fn is_jump(&self) -> bool {
        matches!(self, MicroOp::Jmp | MicroOp::Branch(_) | MicroOp::Jalr)
    }

    /// Registers whose current value this micro-op consumes.
    pub fn dependencies(&self) -> Vec<RegisterName> {
        use RegisterName::*;
        let mut regs = Vec::new();
        match self {
            MicroOp::Nop | MicroOp::Hlt => {}
            MicroOp::Inuv => regs.extend([U, V]),
            MicroOp::Inxy => regs.extend([X, Y]),
            MicroOp::Mov { dst, src } => {
                if dst.is_pseudo() || src.is_pseudo() {
                    // The encoding does not say which bus is used, so a
                    // memory-mapped move needs both address pairs.
                    regs.extend([U, V, X, Y]);
                }
                if *dst == P || *src == P {
                    regs.push(D);
                }
                regs.extend_from_slice(src.halves());
            }
            MicroOp::Li { dst, .. } => push_pseudo_address(*dst, &mut regs),
            MicroOp::Alu { dst, .. } => {
                regs.extend([A, B]);
                push_pseudo_address(*dst, &mut regs);
            }
            MicroOp::Cmp => regs.extend([A, B]),
            MicroOp::Jmp | MicroOp::Branch(_) | MicroOp::Jalr => regs.extend([X, Y]),
        }
        regs.sort();
        regs.dedup();
        regs
    }

    /// Registers this micro-op overwrites.
    pub fn dependents(&self) -> Vec<RegisterName> {
        use RegisterName::*;
        match self {
            MicroOp::Inuv => vec![U, V],
            MicroOp::Inxy => vec![X, Y],
            MicroOp::Mov { dst, .. } | MicroOp::Li { dst, .. } | MicroOp::Alu { dst, .. } => {
                dst.halves().to_vec()
            }
            MicroOp::Jalr => vec![RegisterName::LINK_HI, RegisterName::LINK_LO],
            MicroOp::Nop | MicroOp::Hlt | MicroOp::Cmp | MicroOp::Jmp | MicroOp::Branch(_) => {
                Vec::new()
            }
        }
    }

    /// Whether the micro-op is observable beyond the registers it writes.
    ///
    /// Writes through `M` or `P` reach memory or hardware. Peripheral reads
    /// may also drive hardware. ALU ops and `CMP` set flags, which are not
    /// tracked, so they are always kept.
    pub fn has_side_effects(&self) -> bool {
        match self {
            MicroOp::Inuv | MicroOp::Inxy => false,
            MicroOp::Nop
            | MicroOp::Hlt
            | MicroOp::Cmp
            | MicroOp::Jmp
            | MicroOp::Branch(_)
            | MicroOp::Jalr
            | MicroOp::Alu { .. } => true,
            MicroOp::Mov { dst, src } => {
                matches!(dst, RegisterName::M | RegisterName::P | RegisterName::None)
                    || *src == RegisterName::P
            }
            MicroOp::Li { dst, .. } => {
                matches!(dst, RegisterName::M | RegisterName::P | RegisterName::None)
            }
        }
    }
}

fn push_pseudo_address(reg: RegisterName, regs: &mut Vec<RegisterName>) {
    match reg {
        RegisterName::M => regs.extend([RegisterName::U, RegisterName::V]),
        RegisterName::P => regs.extend([RegisterName::X, RegisterName::Y, RegisterName::D]),
        _ => {}
    }
}

// ── Display — one listing line per micro-op ─────────────────────────────

impl fmt::Display for MicroOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MicroOp::Nop => write!(f, "NOP"),
            MicroOp::Hlt => write!(f, "HLT"),
            MicroOp::Inuv => write!(f, "INUV"),
            MicroOp::Inxy => write!(f, "INXY"),
            MicroOp::Mov { dst, src } => write!(f, "MOV {dst}, {src}"),
            MicroOp::Li { dst, imm } => write!(f, "LI {dst}, 0x{imm:02x}"),
            MicroOp::Alu { op, dst } => write!(f, "{} {dst}", op.mnemonic()),
            MicroOp::Cmp => write!(f, "CMP"),
            MicroOp::Jmp => write!(f, "JMP"),
            MicroOp::Branch(cond) => write!(f, "{}", cond.mnemonic()),
            MicroOp::Jalr => write!(f, "JALR"),
        }
    }
}
