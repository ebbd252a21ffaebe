//! Program-level code generation orchestration.
//!
//! Implements `Codegen::emit_program`, which wraps the lowered IR in the
//! fixed prologue and epilogue, and `Codegen::finish_codegen`, which
//! resolves label patches and runs the optimizer. Also defines the final
//! [`Program`] and its ROM image.

use super::Codegen;
use crate::backend::abi;
use crate::backend::instruction::MicroOp;
use crate::backend::optimize;
use crate::ir::ProgramIR;
use crate::CompileError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Number of instruction slots in the address space.
pub const ROM_SIZE: usize = 1 << 16;

// ============================================================================
// Label patching
// ============================================================================

/// A forward reference: byte `shift` of `label`'s address goes into the
/// immediate of the `LI` at `index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub index: usize,
    pub label: String,
    pub shift: u8,
}

/// Rewrite every patch site with its label's address.
pub fn resolve_patches(
    instructions: &[MicroOp],
    patches: &[Patch],
    labels: &BTreeMap<String, u16>,
) -> Result<Vec<MicroOp>, CompileError> {
    let mut out = instructions.to_vec();
    for patch in patches {
        let address = *labels
            .get(&patch.label)
            .ok_or_else(|| CompileError::UnresolvedLabel(patch.label.clone()))?;
        let byte = (address >> patch.shift) as u8;
        match out.get_mut(patch.index) {
            Some(MicroOp::Li { imm, .. }) => *imm = byte,
            other => unreachable!("patch site {} is {:?}, not LI", patch.index, other),
        }
    }
    Ok(out)
}

// ============================================================================
// Output type
// ============================================================================

/// Lowered micro-op program with its resolved label table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// Address of `instructions[0]`.
    pub base: u16,
    pub instructions: Vec<MicroOp>,
    pub labels: BTreeMap<String, u16>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn to_lines(&self) -> Vec<String> {
        self.instructions.iter().map(|op| op.to_string()).collect()
    }

    /// Addressed listing with label definitions, one micro-op per line.
    pub fn listing(&self) -> String {
        let mut by_address: BTreeMap<u16, Vec<&str>> = BTreeMap::new();
        for (name, address) in &self.labels {
            by_address.entry(*address).or_default().push(name);
        }

        let mut out = String::new();
        for (i, op) in self.instructions.iter().enumerate() {
            let address = self.base.wrapping_add(i as u16);
            if let Some(names) = by_address.get(&address) {
                for name in names {
                    out.push_str(&format!("{name}:\n"));
                }
            }
            out.push_str(&format!("{address:04x}  {op}\n"));
        }
        out
    }

    /// The full 64Ki-slot instruction memory: `NOP` everywhere, the program
    /// at its base, and `HLT` at the halt vector.
    pub fn rom_image(&self) -> Result<Vec<MicroOp>, CompileError> {
        let start = self.base as usize;
        let end = start + self.instructions.len();
        if end > abi::HALT_VECTOR as usize {
            return Err(CompileError::ProgramTooLarge {
                base: self.base,
                len: self.instructions.len(),
            });
        }
        let mut rom = vec![MicroOp::Nop; ROM_SIZE];
        rom[start..end].copy_from_slice(&self.instructions);
        rom[abi::HALT_VECTOR as usize] = MicroOp::Hlt;
        Ok(rom)
    }
}

// ============================================================================
// Program-level driver
// ============================================================================

impl<'a> Codegen<'a> {
    fn emit_prologue(&mut self) {
        self.emit(MicroOp::Nop);
        self.store_imm16(abi::STACK_POINTER_HI, abi::STACK_POINTER_INITIAL);
        self.store_imm16(abi::FRAME_POINTER_HI, abi::FRAME_POINTER_INITIAL);
    }

    /// Lower the whole IR program, prologue to epilogue.
    pub fn emit_program(&mut self, ir: &ProgramIR) -> Result<(), CompileError> {
        self.emit_prologue();
        for instr in &ir.instrs {
            self.emit_instr(instr)?;
            debug_assert!(
                self.temps.is_quiescent(),
                "temporaries leaked lowering {instr}"
            );
        }
        self.emit(MicroOp::Hlt);
        Ok(())
    }

    /// Resolve labels and optimize.
    pub fn finish_codegen(self) -> Result<Program, CompileError> {
        let base = self.options.base;
        let len = self.out.len();
        if base as usize + len > abi::HALT_VECTOR as usize {
            return Err(CompileError::ProgramTooLarge { base, len });
        }

        let mut instructions = resolve_patches(&self.out, &self.patches, &self.labels)?;
        debug!(
            instructions = len,
            patches = self.patches.len(),
            labels = self.labels.len(),
            "labels resolved"
        );

        if self.options.optimize {
            optimize::optimize(&mut instructions, self.options.boundary);
        }

        Ok(Program {
            base,
            instructions,
            labels: self.labels,
        })
    }
}
