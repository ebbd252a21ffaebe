//! IR instruction → micro-op lowering.
//!
//! Implements `Codegen::emit_instr` which translates a single IR instruction
//! into one or more micro-ops. Lowering never carries register contents from
//! one IR instruction into the next, and every label it defines is followed
//! by code that sets up the registers it reads: dead-store elimination sees
//! the output as straight-line code.

use super::{Access, Codegen, Operand};
use crate::backend::abi::{self, RegisterName as R};
use crate::backend::instruction::{AluOp, Cond, MicroOp};
use crate::ir::{BinOp, Instr, Width};
use crate::CompileError;
use tracing::trace;

/// Branches taken after comparing one byte of a multi-byte comparison,
/// most significant byte first.
struct CompareScheme {
    /// Decides "true" on a higher byte.
    hi_true: Option<Cond>,
    /// Decides "false" on a higher byte.
    hi_false: Option<Cond>,
    /// Decides "true" on the last byte; falling through means false.
    lo_true: Cond,
}

fn compare_scheme(op: BinOp) -> CompareScheme {
    let (hi_true, hi_false, lo_true) = match op {
        BinOp::Eq => (None, Some(Cond::Ne), Cond::Eq),
        BinOp::Ne => (Some(Cond::Ne), None, Cond::Ne),
        BinOp::Lt => (Some(Cond::Lt), Some(Cond::Gt), Cond::Lt),
        BinOp::Gt => (Some(Cond::Gt), Some(Cond::Lt), Cond::Gt),
        BinOp::Le => (Some(Cond::Lt), Some(Cond::Gt), Cond::Le),
        BinOp::Ge => (Some(Cond::Gt), Some(Cond::Lt), Cond::Ge),
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            unreachable!("{op:?} is not a comparison")
        }
    };
    CompareScheme {
        hi_true,
        hi_false,
        lo_true,
    }
}

impl<'a> Codegen<'a> {
    /// Lower a single IR instruction into micro-ops.
    pub(crate) fn emit_instr(&mut self, instr: &Instr) -> Result<(), CompileError> {
        let start = self.out.len();
        match instr {
            // ── Stack ────────────────────────────────────────────────────
            Instr::Push(value) => self.push_imm(*value),
            Instr::Push16(value) => {
                let (hi, lo) = abi::split16(*value);
                self.push_imm(lo);
                self.push_imm(hi);
            }
            Instr::Pop => self.pop_into(R::A),
            Instr::Pop16 => {
                self.pop_into(R::A);
                self.pop_into(R::A);
            }
            Instr::Dup => {
                self.peek_into(R::B);
                self.push_reg(R::B);
            }
            Instr::Dup16 => {
                self.peek_into(R::B);
                self.emit(MicroOp::Inuv);
                self.mov(R::D, R::M);
                self.push_reg(R::D);
                self.push_reg(R::B);
            }
            Instr::Binary { op, width } => {
                let n = width.bytes();
                let right = self.alloc_temp(n, "stack operand")?;
                self.pop_to_memory(right.address(), n);
                let left = self.alloc_temp(n, "stack operand")?;
                self.pop_to_memory(left.address(), n);
                let result_bytes = op.result_width(*width).bytes();
                let result = self.alloc_temp(result_bytes, "stack result")?;
                self.lower_tac(*op, *width, result.address(), left.address(), right.address())?;
                self.push_from_memory(result.address(), result_bytes);
                self.release(&[left, right, result]);
            }

            // ── Three-address arithmetic ─────────────────────────────────
            Instr::Tac {
                op,
                width,
                dst,
                left,
                right,
            } => {
                let n = width.bytes();
                let d = self.resolve(dst, op.result_width(*width).bytes(), Access::Write)?;
                let l = self.resolve(left, n, Access::Read)?;
                let r = self.resolve(right, n, Access::Read)?;
                self.lower_tac(*op, *width, d, l, r)?;
            }
            Instr::AddImm16 { dst, src, imm } => {
                let d = self.resolve(dst, 2, Access::Write)?;
                let s = self.resolve(src, 2, Access::Read)?;
                self.add_imm16(d, s, *imm, AluOp::Add, AluOp::Adc);
            }
            Instr::SubImm16 { dst, src, imm } => {
                let d = self.resolve(dst, 2, Access::Write)?;
                let s = self.resolve(src, 2, Access::Read)?;
                self.add_imm16(d, s, *imm, AluOp::Sub, AluOp::Sbc);
            }

            // ── Direct memory ────────────────────────────────────────────
            Instr::Load(loc) => {
                let a = self.resolve(loc, 1, Access::Read)?;
                self.push_from_memory(a, 1);
            }
            Instr::Load16(loc) => {
                let a = self.resolve(loc, 2, Access::Read)?;
                self.push_from_memory(a, 2);
            }
            Instr::Store(loc) => {
                let a = self.resolve(loc, 1, Access::Write)?;
                self.peek_into(R::B);
                self.store_byte(a, R::B);
            }
            Instr::Store16(loc) => {
                let a = self.resolve(loc, 2, Access::Write)?;
                self.peek_into(R::B);
                self.emit(MicroOp::Inuv);
                self.mov(R::D, R::M);
                self.store_byte(a, R::B);
                self.store_byte(a.wrapping_add(1), R::D);
            }
            Instr::StoreImmediate(loc, value) => {
                let a = self.resolve(loc, 1, Access::Write)?;
                self.store_imm(a, *value);
            }
            Instr::StoreImmediate16(loc, value) => {
                let a = self.resolve(loc, 2, Access::Write)?;
                self.store_imm16(a, *value);
            }

            // ── Indirect memory ──────────────────────────────────────────
            Instr::LoadIndirect => {
                self.pop_into(R::B);
                self.pop_into(R::D);
                self.mov(R::U, R::B);
                self.mov(R::V, R::D);
                self.mov(R::B, R::M);
                self.push_reg(R::B);
            }
            Instr::LoadIndirectN(count) => self.load_indirect_n(*count)?,
            Instr::StoreIndirect => {
                let ptr = self.alloc_temp(2, "store-indirect")?;
                self.pop_to_memory(ptr.address(), 2);
                self.peek_into(R::B);
                self.load_pointer_into_uv(ptr.address());
                self.mov(R::M, R::B);
                self.release(&[ptr]);
            }
            Instr::StoreIndirectN(count) => {
                let ptr = self.alloc_temp(2, "store-indirect")?;
                self.pop_to_memory(ptr.address(), 2);
                let top = self.cursor_from(abi::STACK_POINTER_HI, "store-indirect")?;
                self.copy_block(
                    Operand::Indirect(ptr.address()),
                    Operand::Indirect(top.address()),
                    *count,
                );
                self.release(&[ptr, top]);
            }

            // ── Block copies ─────────────────────────────────────────────
            Instr::CopyWords { dst, src, count } => {
                let d = self.resolve(dst, *count, Access::Write)?;
                let s = self.resolve(src, *count, Access::Read)?;
                self.copy_block(Operand::Direct(d), Operand::Direct(s), *count);
            }
            Instr::CopyWordsIndirectSource {
                dst,
                src_ptr,
                count,
            } => {
                let d = self.resolve(dst, *count, Access::Write)?;
                let p = self.resolve(src_ptr, 2, Access::Read)?;
                let src = self.cursor_from(p, "copy source")?;
                self.copy_block(Operand::Direct(d), Operand::Indirect(src.address()), *count);
                self.release(&[src]);
            }
            Instr::CopyWordsIndirectDestination {
                dst_ptr,
                src,
                count,
            } => {
                let p = self.resolve(dst_ptr, 2, Access::Read)?;
                let s = self.resolve(src, *count, Access::Read)?;
                let dst = self.cursor_from(p, "copy destination")?;
                self.copy_block(Operand::Indirect(dst.address()), Operand::Direct(s), *count);
                self.release(&[dst]);
            }
            Instr::CopyWordsIndirectDestinationIndirectSource {
                dst_ptr,
                src_ptr,
                count,
            } => {
                let dp = self.resolve(dst_ptr, 2, Access::Read)?;
                let sp = self.resolve(src_ptr, 2, Access::Read)?;
                let dst = self.cursor_from(dp, "copy destination")?;
                let src = self.cursor_from(sp, "copy source")?;
                self.copy_block(
                    Operand::Indirect(dst.address()),
                    Operand::Indirect(src.address()),
                    *count,
                );
                self.release(&[dst, src]);
            }
            Instr::CopyWordZeroExtend { dst, src } => {
                let d = self.resolve(dst, 2, Access::Write)?;
                let s = self.resolve(src, 1, Access::Read)?;
                self.load_byte(R::A, s);
                self.store_byte(d.wrapping_add(1), R::A);
                self.store_imm(d, 0);
            }
            Instr::CopyLabel { dst, label } => {
                let d = self.resolve(dst, 2, Access::Write)?;
                self.store_label(d, label);
            }

            // ── Control flow ─────────────────────────────────────────────
            Instr::Label(name) => {
                self.define_label(name)?;
                self.emit(MicroOp::Nop);
            }
            Instr::Jmp(label) => self.jmp_to(label),
            Instr::Je(label) => {
                self.pop_into(R::B);
                self.pop_into(R::A);
                self.emit(MicroOp::Cmp);
                self.branch_to(Cond::Eq, label);
            }
            Instr::JumpIfZero { target, test } => {
                let a = self.resolve(test, 1, Access::Read)?;
                self.load_byte(R::A, a);
                self.li(R::B, 0);
                self.emit(MicroOp::Cmp);
                self.branch_to(Cond::Eq, target);
            }
            Instr::Jalr(label) => {
                self.set_xy_label(label);
                self.emit(MicroOp::Jalr);
            }

            // ── Frames and calls ─────────────────────────────────────────
            Instr::Enter => {
                self.push_from_memory(abi::FRAME_POINTER_HI, 2);
                self.copy_bytes(abi::FRAME_POINTER_HI, abi::STACK_POINTER_HI, 2);
            }
            Instr::Leave => {
                self.copy_bytes(abi::STACK_POINTER_HI, abi::FRAME_POINTER_HI, 2);
                self.pop_to_memory(abi::FRAME_POINTER_HI, 2);
            }
            Instr::PushReturnAddress => {
                self.push_reg(R::LINK_LO);
                self.push_reg(R::LINK_HI);
            }
            Instr::Ret => {
                self.pop_into(R::A);
                self.pop_into(R::B);
                self.mov(R::X, R::A);
                self.mov(R::Y, R::B);
                self.emit(MicroOp::Jmp);
            }
            Instr::LeafRet => {
                self.mov(R::X, R::LINK_HI);
                self.mov(R::Y, R::LINK_LO);
                self.emit(MicroOp::Jmp);
            }

            // ── Peripherals ──────────────────────────────────────────────
            Instr::PeekPeripheral => {
                self.pop_into(R::D);
                self.pop_into(R::A);
                self.pop_into(R::B);
                self.mov(R::X, R::A);
                self.mov(R::Y, R::B);
                self.mov(R::B, R::P);
                self.push_reg(R::B);
            }
            Instr::PokePeripheral => {
                let ptr = self.alloc_temp(2, "poke-peripheral")?;
                self.pop_into(R::D);
                self.pop_to_memory(ptr.address(), 2);
                self.peek_into(R::B);
                self.set_uv(ptr.address());
                self.mov(R::X, R::M);
                self.emit(MicroOp::Inuv);
                self.mov(R::Y, R::M);
                self.mov(R::P, R::B);
                self.release(&[ptr]);
            }

            Instr::Hlt => self.emit(MicroOp::Hlt),
        }
        trace!(%instr, ops = self.out.len() - start, "lowered");
        Ok(())
    }

    // ── Three-address lowering ──────────────────────────────────────────

    /// `[d] = [l] op [r]` over `width`. Multi-byte values are big-endian.
    pub(crate) fn lower_tac(
        &mut self,
        op: BinOp,
        width: Width,
        d: u16,
        l: u16,
        r: u16,
    ) -> Result<(), CompileError> {
        let n = width.bytes();
        match op {
            BinOp::Add => self.add_bytes(d, l, r, n, AluOp::Add, AluOp::Adc),
            BinOp::Sub => self.add_bytes(d, l, r, n, AluOp::Sub, AluOp::Sbc),
            BinOp::Mul => self.lower_mul(d, l, r, n)?,
            BinOp::Div => self.lower_divmod(d, l, r, n, false)?,
            BinOp::Mod => self.lower_divmod(d, l, r, n, true)?,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
                self.lower_compare(op, d, l, r, n)?
            }
        }
        Ok(())
    }

    /// Byte-wise add or subtract with carry, least significant byte first.
    fn add_bytes(&mut self, d: u16, l: u16, r: u16, n: u16, first: AluOp, rest: AluOp) {
        for i in (0..n).rev() {
            self.load_byte(R::A, l.wrapping_add(i));
            self.load_byte(R::B, r.wrapping_add(i));
            self.set_uv(d.wrapping_add(i));
            self.alu(if i == n - 1 { first } else { rest }, R::M);
        }
    }

    fn add_imm16(&mut self, d: u16, s: u16, imm: u16, first: AluOp, rest: AluOp) {
        let (hi, lo) = abi::split16(imm);
        self.load_byte(R::A, s.wrapping_add(1));
        self.li(R::B, lo);
        self.set_uv(d.wrapping_add(1));
        self.alu(first, R::M);
        self.load_byte(R::A, s);
        self.li(R::B, hi);
        self.set_uv(d);
        self.alu(rest, R::M);
    }

    /// `[addr] += 1` over `n` bytes.
    fn increment(&mut self, addr: u16, n: u16) {
        for i in (0..n).rev() {
            self.load_byte(R::A, addr.wrapping_add(i));
            if i == n - 1 {
                self.li(R::B, 1);
                self.alu(AluOp::Add, R::M);
            } else {
                self.li(R::B, 0);
                self.alu(AluOp::Adc, R::M);
            }
        }
    }

    /// `[addr] -= 1` over `n` bytes.
    fn decrement(&mut self, addr: u16, n: u16) {
        for i in (0..n).rev() {
            self.load_byte(R::A, addr.wrapping_add(i));
            let op = if i == n - 1 { AluOp::Dea } else { AluOp::Dca };
            self.alu(op, R::M);
        }
    }

    /// Jump to `target` unless every byte of `[addr, addr + n)` is zero.
    fn branch_if_nonzero(&mut self, addr: u16, n: u16, target: &str) {
        for i in 0..n {
            self.load_byte(R::A, addr.wrapping_add(i));
            self.li(R::B, 0);
            self.emit(MicroOp::Cmp);
            self.branch_to(Cond::Ne, target);
        }
    }

    fn lower_compare(&mut self, op: BinOp, d: u16, l: u16, r: u16, n: u16) -> Result<(), CompileError> {
        let scheme = compare_scheme(op);
        let l_true = self.fresh_label();
        let l_false = self.fresh_label();
        let l_done = self.fresh_label();

        for i in 0..n {
            self.load_byte(R::A, l.wrapping_add(i));
            self.load_byte(R::B, r.wrapping_add(i));
            self.emit(MicroOp::Cmp);
            if i + 1 < n {
                if let Some(cond) = scheme.hi_true {
                    self.branch_to(cond, &l_true);
                }
                if let Some(cond) = scheme.hi_false {
                    self.branch_to(cond, &l_false);
                }
            } else {
                self.branch_to(scheme.lo_true, &l_true);
            }
        }

        self.define_label(&l_false)?;
        self.store_imm(d, 0);
        self.jmp_to(&l_done);
        self.define_label(&l_true)?;
        self.store_imm(d, 1);
        self.define_label(&l_done)?;
        Ok(())
    }

    /// Repeated addition: add `[l]` to an accumulator `[r]` times.
    fn lower_mul(&mut self, d: u16, l: u16, r: u16, n: u16) -> Result<(), CompileError> {
        let acc = self.alloc_temp(n, "multiplication")?;
        let counter = self.alloc_temp(n, "multiplication")?;
        let (acc_a, counter_a) = (acc.address(), counter.address());
        let l_loop = self.fresh_label();
        let l_body = self.fresh_label();
        let l_done = self.fresh_label();

        self.copy_bytes(counter_a, r, n);
        for i in 0..n {
            self.store_imm(acc_a.wrapping_add(i), 0);
        }

        self.define_label(&l_loop)?;
        self.branch_if_nonzero(counter_a, n, &l_body);
        self.jmp_to(&l_done);

        self.define_label(&l_body)?;
        self.add_bytes(acc_a, acc_a, l, n, AluOp::Add, AluOp::Adc);
        self.decrement(counter_a, n);
        self.jmp_to(&l_loop);

        self.define_label(&l_done)?;
        self.copy_bytes(d, acc_a, n);
        self.release(&[acc, counter]);
        Ok(())
    }

    /// Repeated subtraction. Division by zero leaves a quotient of zero and
    /// the dividend as remainder.
    fn lower_divmod(&mut self, d: u16, l: u16, r: u16, n: u16, remainder: bool) -> Result<(), CompileError> {
        let quotient = self.alloc_temp(n, "division")?;
        let rest = self.alloc_temp(n, "division")?;
        let (q, rem) = (quotient.address(), rest.address());
        let l_loop = self.fresh_label();
        let l_body = self.fresh_label();
        let l_done = self.fresh_label();

        for i in 0..n {
            self.store_imm(q.wrapping_add(i), 0);
        }
        self.copy_bytes(rem, l, n);

        self.branch_if_nonzero(r, n, &l_loop);
        self.jmp_to(&l_done);

        // Stop once rem < r.
        self.define_label(&l_loop)?;
        for i in 0..n {
            self.load_byte(R::A, rem.wrapping_add(i));
            self.load_byte(R::B, r.wrapping_add(i));
            self.emit(MicroOp::Cmp);
            self.branch_to(Cond::Lt, &l_done);
            if i + 1 < n {
                self.branch_to(Cond::Gt, &l_body);
            }
        }

        self.define_label(&l_body)?;
        self.add_bytes(rem, rem, r, n, AluOp::Sub, AluOp::Sbc);
        self.increment(q, n);
        self.jmp_to(&l_loop);

        self.define_label(&l_done)?;
        self.copy_bytes(d, if remainder { rem } else { q }, n);
        self.release(&[quotient, rest]);
        Ok(())
    }

    // ── Indirect loads ──────────────────────────────────────────────────

    /// Walk a cursor from the last byte down so the first byte ends on top.
    fn load_indirect_n(&mut self, count: u16) -> Result<(), CompileError> {
        if count == 0 {
            self.pop_into(R::A);
            self.pop_into(R::A);
            return Ok(());
        }
        let cursor = self.alloc_temp(2, "load-indirect")?;
        let c = cursor.address();
        self.pop_to_memory(c, 2);
        self.add_imm16(c, c, count - 1, AluOp::Add, AluOp::Adc);
        for i in 0..count {
            self.load_pointer_into_uv(c);
            self.mov(R::B, R::M);
            self.push_reg(R::B);
            if i + 1 < count {
                self.decrement(c, 2);
            }
        }
        self.release(&[cursor]);
        Ok(())
    }
}
