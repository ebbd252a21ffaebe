use super::context::{Gen, Value};
use crate::ir::ast::Expr;
use crate::ir::*;
use crate::CompileError;

impl<'a> Gen<'a> {
    /// Static width of an expression, without emitting anything.
    pub fn width_of(&self, expr: &Expr) -> Result<Width, CompileError> {
        match expr {
            Expr::Literal { width, .. } => Ok(*width),
            Expr::Ident(name) => {
                let symbol = self.lookup(name)?;
                symbol_width(name, symbol.size)
            }
            Expr::Binary { op, left, right } => {
                let w = wider(self.width_of(left)?, self.width_of(right)?);
                Ok(op.result_width(w))
            }
        }
    }

    /// Evaluate `expr` into a fresh temporary owned by the caller.
    pub fn eval(&mut self, expr: &Expr) -> Result<Value, CompileError> {
        match expr {
            Expr::Literal { value, width } => {
                let temp = self.new_temp(width.bytes(), "literal")?;
                let loc = Location::Address(temp.address());
                match width {
                    Width::W8 => self.emit(Instr::StoreImmediate(loc, *value as u8)),
                    Width::W16 => self.emit(Instr::StoreImmediate16(loc, *value)),
                }
                Ok(Value {
                    temp,
                    width: *width,
                })
            }
            Expr::Ident(name) => {
                let symbol = self.lookup(name)?;
                let width = symbol_width(name, symbol.size)?;
                let temp = self.new_temp(width.bytes(), name)?;
                self.emit(Instr::CopyWords {
                    dst: Location::Address(temp.address()),
                    src: Location::Symbol(name.clone()),
                    count: width.bytes(),
                });
                Ok(Value { temp, width })
            }
            Expr::Binary { op, left, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                let width = wider(l.width, r.width);
                let l = self.promote(l, width)?;
                let r = self.promote(r, width)?;

                // The result is allocated before the operands go back, so it
                // never aliases them.
                let result_width = op.result_width(width);
                let temp = self.new_temp(result_width.bytes(), "binary expression")?;
                self.emit(Instr::Tac {
                    op: *op,
                    width,
                    dst: Location::Address(temp.address()),
                    left: l.loc(),
                    right: r.loc(),
                });
                self.release(l);
                self.release(r);
                Ok(Value {
                    temp,
                    width: result_width,
                })
            }
        }
    }

    /// Zero-extend `value` to `width`, releasing the original if a copy was
    /// made.
    pub fn promote(&mut self, value: Value, width: Width) -> Result<Value, CompileError> {
        if value.width == width || width == Width::W8 {
            return Ok(value);
        }
        let temp = self.new_temp(2, "zero extension")?;
        self.emit(Instr::CopyWordZeroExtend {
            dst: Location::Address(temp.address()),
            src: value.loc(),
        });
        self.release(value);
        Ok(Value {
            temp,
            width: Width::W16,
        })
    }

    /// Evaluate a condition down to a single byte that is zero for false.
    pub fn eval_condition(&mut self, cond: &Expr) -> Result<Value, CompileError> {
        let value = self.eval(cond)?;
        if value.width == Width::W8 {
            return Ok(value);
        }
        let zero = self.new_temp(2, "condition")?;
        self.emit(Instr::StoreImmediate16(Location::Address(zero.address()), 0));
        let test = self.new_temp(1, "condition")?;
        self.emit(Instr::Tac {
            op: BinOp::Ne,
            width: Width::W16,
            dst: Location::Address(test.address()),
            left: value.loc(),
            right: Location::Address(zero.address()),
        });
        self.release(value);
        self.temps.consume(&zero);
        Ok(Value {
            temp: test,
            width: Width::W8,
        })
    }
}

pub fn wider(a: Width, b: Width) -> Width {
    if a == Width::W16 || b == Width::W16 {
        Width::W16
    } else {
        Width::W8
    }
}

/// Only one- and two-byte symbols can be used as values.
fn symbol_width(name: &str, size: u16) -> Result<Width, CompileError> {
    match size {
        1 => Ok(Width::W8),
        2 => Ok(Width::W16),
        _ => Err(CompileError::SizeMismatch {
            name: name.to_string(),
            expected: size,
            found: if size == 0 { 1 } else { 2 },
        }),
    }
}
