use super::context::Gen;
use crate::ir::ast::{Expr, Stmt};
use crate::ir::symbol_table::Symbol;
use crate::ir::*;
use crate::CompileError;
use tracing::trace;

impl<'a> Gen<'a> {
    pub fn lower_block(&mut self, stmts: &[Stmt]) -> Result<(), CompileError> {
        for s in stmts {
            self.lower_stmt(s)?;
            debug_assert!(self.temps.is_quiescent(), "temporaries leaked by {s:?}");
        }
        Ok(())
    }

    pub fn lower_stmt(&mut self, s: &Stmt) -> Result<(), CompileError> {
        match s {
            Stmt::VarDecl {
                name,
                expr,
                mutable,
            } => self.lower_var_decl(name, expr, *mutable),
            Stmt::Assign { name, expr } => self.lower_assign(name, expr),
            Stmt::Expr(expr) => {
                let value = self.eval(expr)?;
                self.release(value);
                Ok(())
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => self.lower_if(cond, then_branch, else_branch.as_deref()),
            Stmt::While { cond, body } => self.lower_while(cond, body),
        }
    }

    /// Static storage for the variable, then the initializer copied through
    /// a pointer temporary holding its address.
    fn lower_var_decl(&mut self, name: &str, expr: &Expr, mutable: bool) -> Result<(), CompileError> {
        if self.symbols.lookup(name).is_some() {
            return Err(CompileError::Redefinition(name.to_string()));
        }
        let width = self.width_of(expr)?;
        let size = width.bytes();
        let address = self.alloc_static(name, size)?;
        trace!(name, address, size, "declared");

        let ptr = self.new_temp(2, "declaration")?;
        let ptr_loc = Location::Address(ptr.address());
        self.emit(Instr::StoreImmediate16(ptr_loc.clone(), address));
        let value = self.eval(expr)?;
        self.emit(Instr::CopyWordsIndirectDestination {
            dst_ptr: ptr_loc,
            src: value.loc(),
            count: size,
        });
        self.release(value);
        self.temps.consume(&ptr);

        self.symbols
            .declare(name, Symbol::new(address, size, mutable))
            .map_err(|_| CompileError::Redefinition(name.to_string()))
    }

    fn lower_assign(&mut self, name: &str, expr: &Expr) -> Result<(), CompileError> {
        let symbol = self.lookup(name)?;
        if !symbol.mutable {
            return Err(CompileError::ImmutableStore(name.to_string()));
        }
        let value = self.eval(expr)?;
        if value.width.bytes() > symbol.size {
            return Err(CompileError::SizeMismatch {
                name: name.to_string(),
                expected: symbol.size,
                found: value.width.bytes(),
            });
        }
        let value = if symbol.size == 2 {
            self.promote(value, Width::W16)?
        } else {
            value
        };
        self.emit(Instr::CopyWords {
            dst: Location::Symbol(name.to_string()),
            src: value.loc(),
            count: value.width.bytes(),
        });
        self.release(value);
        Ok(())
    }

    fn lower_if(
        &mut self,
        cond: &Expr,
        then_branch: &[Stmt],
        else_branch: Option<&[Stmt]>,
    ) -> Result<(), CompileError> {
        let else_label = self.new_label();
        let end_label = self.new_label();

        let test = self.eval_condition(cond)?;
        self.emit(Instr::JumpIfZero {
            target: else_label.clone(),
            test: test.loc(),
        });
        self.release(test);

        self.lower_block(then_branch)?;
        if let Some(else_branch) = else_branch {
            self.emit(Instr::Jmp(end_label.clone()));
            self.emit(Instr::Label(else_label));
            self.lower_block(else_branch)?;
            self.emit(Instr::Label(end_label));
        } else {
            self.emit(Instr::Label(else_label));
        }
        Ok(())
    }

    fn lower_while(&mut self, cond: &Expr, body: &[Stmt]) -> Result<(), CompileError> {
        let top = self.new_label();
        let exit = self.new_label();

        self.emit(Instr::Label(top.clone()));
        let test = self.eval_condition(cond)?;
        self.emit(Instr::JumpIfZero {
            target: exit.clone(),
            test: test.loc(),
        });
        self.release(test);

        self.lower_block(body)?;
        self.emit(Instr::Jmp(top));
        self.emit(Instr::Label(exit));
        Ok(())
    }
}
