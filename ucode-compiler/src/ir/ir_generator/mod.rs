//! Statement to IR lowering module.
//!
//! Declarations get static storage from a bump pointer; expressions are
//! evaluated into temporaries that are released as soon as their value has
//! been consumed.

pub mod context;
pub mod stmt;
pub mod expr;

use crate::ir::ast::Stmt;
use crate::ir::symbol_table::SymbolTable;
use crate::ir::ProgramIR;
use crate::{CompileError, CompileOptions};

/// The main Gen struct that orchestrates the lowering process.
pub use context::Gen;

/// Entry point for lowering statements to ProgramIR.
pub fn lower(
    stmts: &[Stmt],
    symbols: &mut SymbolTable,
    options: &CompileOptions,
) -> Result<ProgramIR, CompileError> {
    let mut g = Gen::new(symbols, options);
    g.lower_block(stmts)?;
    Ok(g.finish())
}
