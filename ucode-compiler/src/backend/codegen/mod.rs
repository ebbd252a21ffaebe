//! Code generation state machine and micro-op output.
//!
//! Contains the [`Codegen`] struct (the central code-generation driver),
//! emission helpers for addressing and the runtime stack, and label patch
//! bookkeeping. IR-level lowering lives in `lowering`, program assembly and
//! patch resolution in `program`.

mod lowering;
mod program;

pub use program::{resolve_patches, Patch, Program};

use super::abi::{self, RegisterName as R};
use super::instruction::{AluOp, Cond, MicroOp};
use super::temporaries::{TemporariesAllocator, Temporary};
use crate::ir::symbol_table::StorageResolver;
use crate::ir::{LabelMaker, Location};
use crate::{CompileError, CompileOptions};
use std::collections::BTreeMap;

/// Placeholder immediate for patchable `LI` instructions. Two unpatched
/// bytes make the halt vector.
pub(crate) const PLACEHOLDER: u8 = 0xff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Read,
    Write,
}

/// Where a block copy reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operand {
    /// Bytes start at this address.
    Direct(u16),
    /// A two-byte cursor cell holding the current byte address.
    Indirect(u16),
}

// ============================================================================
// Codegen state
// ============================================================================

/// Central code-generation driver.
///
/// Accumulates micro-ops from IR instructions together with the label table
/// and the patch requests that refer to it.
pub struct Codegen<'a> {
    pub(crate) resolver: &'a dyn StorageResolver,
    pub(crate) options: &'a CompileOptions,
    pub(crate) out: Vec<MicroOp>,
    pub(crate) patches: Vec<Patch>,
    pub(crate) labels: BTreeMap<String, u16>,
    pub(crate) temps: TemporariesAllocator,
    pub(crate) label_maker: LabelMaker,
}

impl<'a> Codegen<'a> {
    pub fn new(resolver: &'a dyn StorageResolver, options: &'a CompileOptions) -> Self {
        Self {
            resolver,
            options,
            out: Vec::new(),
            patches: Vec::new(),
            labels: BTreeMap::new(),
            temps: TemporariesAllocator::new(options.scratch_base, options.scratch_limit),
            label_maker: LabelMaker::new(".Lcg"),
        }
    }

    // ── Item emission helpers ───────────────────────────────────────────

    pub(crate) fn emit(&mut self, op: MicroOp) {
        self.out.push(op);
    }

    pub(crate) fn mov(&mut self, dst: R, src: R) {
        self.emit(MicroOp::mov(dst, src));
    }

    pub(crate) fn li(&mut self, dst: R, imm: u8) {
        self.emit(MicroOp::li(dst, imm));
    }

    pub(crate) fn alu(&mut self, op: AluOp, dst: R) {
        self.emit(MicroOp::alu(op, dst));
    }

    /// Absolute address the next emitted micro-op will occupy.
    fn next_address(&self) -> Result<u16, CompileError> {
        u16::try_from(self.options.base as usize + self.out.len()).map_err(|_| {
            CompileError::ProgramTooLarge {
                base: self.options.base,
                len: self.out.len(),
            }
        })
    }

    // ── Labels and patches ──────────────────────────────────────────────

    pub(crate) fn define_label(&mut self, name: &str) -> Result<(), CompileError> {
        if self.labels.contains_key(name) {
            return Err(CompileError::DuplicateLabel(name.to_string()));
        }
        let address = self.next_address()?;
        self.labels.insert(name.to_string(), address);
        Ok(())
    }

    pub(crate) fn fresh_label(&mut self) -> String {
        self.label_maker.next_label()
    }

    /// Emit `LI dst, 0xff` and ask for byte `shift` of `label`'s address to
    /// be patched into it.
    fn li_patched(&mut self, dst: R, label: &str, shift: u8) {
        self.patches.push(Patch {
            index: self.out.len(),
            label: label.to_string(),
            shift,
        });
        self.li(dst, PLACEHOLDER);
    }

    pub(crate) fn set_xy_label(&mut self, label: &str) {
        self.li_patched(R::X, label, 8);
        self.li_patched(R::Y, label, 0);
    }

    /// Store the address of `label` at `[addr, addr + 2)`.
    pub(crate) fn store_label(&mut self, addr: u16, label: &str) {
        self.set_uv(addr);
        self.li_patched(R::M, label, 8);
        self.set_uv(addr.wrapping_add(1));
        self.li_patched(R::M, label, 0);
    }

    pub(crate) fn jmp_to(&mut self, label: &str) {
        self.set_xy_label(label);
        self.emit(MicroOp::Jmp);
    }

    pub(crate) fn branch_to(&mut self, cond: Cond, label: &str) {
        self.set_xy_label(label);
        self.emit(MicroOp::Branch(cond));
    }

    // ── Addressing ──────────────────────────────────────────────────────

    pub(crate) fn set_uv(&mut self, addr: u16) {
        let (hi, lo) = abi::split16(addr);
        if hi == lo {
            self.li(R::UV, lo);
        } else {
            self.li(R::U, hi);
            self.li(R::V, lo);
        }
    }

    /// UV ← the sixteen-bit pointer stored at `[cell, cell + 2)`.
    /// Leaves the same pointer in XY.
    pub(crate) fn load_pointer_into_uv(&mut self, cell: u16) {
        self.set_uv(cell);
        self.mov(R::X, R::M);
        self.emit(MicroOp::Inuv);
        self.mov(R::Y, R::M);
        self.mov(R::U, R::X);
        self.mov(R::V, R::Y);
    }

    /// Store XY into the pointer cell at `[cell, cell + 2)`.
    pub(crate) fn store_xy(&mut self, cell: u16) {
        self.set_uv(cell);
        self.mov(R::M, R::X);
        self.emit(MicroOp::Inuv);
        self.mov(R::M, R::Y);
    }

    pub(crate) fn store_imm(&mut self, addr: u16, value: u8) {
        self.set_uv(addr);
        self.li(R::M, value);
    }

    pub(crate) fn store_imm16(&mut self, addr: u16, value: u16) {
        let (hi, lo) = abi::split16(value);
        self.store_imm(addr, hi);
        self.store_imm(addr.wrapping_add(1), lo);
    }

    pub(crate) fn load_byte(&mut self, reg: R, addr: u16) {
        self.set_uv(addr);
        self.mov(reg, R::M);
    }

    pub(crate) fn store_byte(&mut self, addr: u16, reg: R) {
        self.set_uv(addr);
        self.mov(R::M, reg);
    }

    pub(crate) fn copy_bytes(&mut self, dst: u16, src: u16, count: u16) {
        for i in 0..count {
            self.load_byte(R::A, src.wrapping_add(i));
            self.store_byte(dst.wrapping_add(i), R::A);
        }
    }

    // ── Runtime stack ───────────────────────────────────────────────────
    //
    // Every helper below clobbers A, U, V, X and Y only. B, D, G and H
    // survive, which is what lets callers keep values in them across
    // stack traffic.

    /// SP ← SP - 1, leaving UV and XY pointing at the new top.
    fn decrement_sp(&mut self) {
        self.load_byte(R::A, abi::STACK_POINTER_LO);
        self.alu(AluOp::Dea, R::M);
        self.load_byte(R::A, abi::STACK_POINTER_HI);
        self.alu(AluOp::Dca, R::M);
        self.load_pointer_into_uv(abi::STACK_POINTER_HI);
    }

    pub(crate) fn push_reg(&mut self, reg: R) {
        debug_assert!(
            matches!(reg, R::B | R::D | R::G | R::H),
            "{reg} does not survive a push"
        );
        self.decrement_sp();
        self.mov(R::M, reg);
    }

    pub(crate) fn push_imm(&mut self, value: u8) {
        self.decrement_sp();
        self.li(R::M, value);
    }

    pub(crate) fn peek_into(&mut self, reg: R) {
        self.load_pointer_into_uv(abi::STACK_POINTER_HI);
        self.mov(reg, R::M);
    }

    /// Pop the top byte into `reg` (any of A, B, D, G, H).
    pub(crate) fn pop_into(&mut self, reg: R) {
        self.peek_into(reg);
        self.emit(MicroOp::Inxy);
        self.store_xy(abi::STACK_POINTER_HI);
    }

    /// Pop `count` bytes into `[addr, addr + count)`; the top byte lands at
    /// `addr`.
    pub(crate) fn pop_to_memory(&mut self, addr: u16, count: u16) {
        for i in 0..count {
            self.pop_into(R::B);
            self.store_byte(addr.wrapping_add(i), R::B);
        }
    }

    /// Push `[addr, addr + count)` so that the byte at `addr` ends on top.
    pub(crate) fn push_from_memory(&mut self, addr: u16, count: u16) {
        for i in (0..count).rev() {
            self.load_byte(R::B, addr.wrapping_add(i));
            self.push_reg(R::B);
        }
    }

    // ── Block copies ────────────────────────────────────────────────────

    fn point_uv(&mut self, operand: Operand, offset: u16) {
        match operand {
            Operand::Direct(addr) => self.set_uv(addr.wrapping_add(offset)),
            Operand::Indirect(cursor) => self.load_pointer_into_uv(cursor),
        }
    }

    fn advance(&mut self, operand: Operand) {
        if let Operand::Indirect(cursor) = operand {
            self.load_pointer_into_uv(cursor);
            self.emit(MicroOp::Inuv);
            self.mov(R::X, R::U);
            self.mov(R::Y, R::V);
            self.store_xy(cursor);
        }
    }

    /// Copy `count` bytes between operands. Indirect operands must name a
    /// scratch cursor that this copy may advance.
    pub(crate) fn copy_block(&mut self, dst: Operand, src: Operand, count: u16) {
        for i in 0..count {
            self.point_uv(src, i);
            self.mov(R::A, R::M);
            self.point_uv(dst, i);
            self.mov(R::M, R::A);
            if i + 1 < count {
                self.advance(src);
                self.advance(dst);
            }
        }
    }

    // ── Temporaries and storage ─────────────────────────────────────────

    pub(crate) fn alloc_temp(&mut self, size: u16, construct: &str) -> Result<Temporary, CompileError> {
        self.temps
            .allocate(size)
            .ok_or_else(|| CompileError::OutOfTemporaries {
                construct: construct.to_string(),
            })
    }

    pub(crate) fn release(&mut self, temps: &[Temporary]) {
        for t in temps {
            self.temps.consume(t);
        }
    }

    /// A scratch cursor initialised from the pointer stored at `ptr_cell`.
    pub(crate) fn cursor_from(&mut self, ptr_cell: u16, construct: &str) -> Result<Temporary, CompileError> {
        let cursor = self.alloc_temp(2, construct)?;
        self.copy_bytes(cursor.address(), ptr_cell, 2);
        Ok(cursor)
    }

    /// Resolve a memory operand to an address, checking the access against
    /// the symbol it names.
    pub(crate) fn resolve(&self, loc: &Location, bytes: u16, access: Access) -> Result<u16, CompileError> {
        match loc {
            Location::Address(addr) => Ok(*addr),
            Location::Symbol(name) => {
                let symbol = self
                    .resolver
                    .resolve(name)
                    .ok_or_else(|| CompileError::UndefinedSymbol(name.clone()))?;
                if access == Access::Write && !symbol.mutable {
                    return Err(CompileError::ImmutableStore(name.clone()));
                }
                if bytes > symbol.size {
                    return Err(CompileError::SizeMismatch {
                        name: name.clone(),
                        expected: symbol.size,
                        found: bytes,
                    });
                }
                Ok(symbol.address)
            }
        }
    }
}
