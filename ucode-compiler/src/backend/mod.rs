//! Micro-op backend: lowers IR to machine micro-operations.
//!
//! Module layout:
//! - `abi`        : register names and the runtime memory map
//! - `instruction`: typed micro-operations and their register effects
//! - `temporaries`: scratch storage allocator
//! - `liveness`   : register liveness for dead-store elimination
//! - `codegen`    : code generation driver (IR → micro-ops)
//! - `optimize`   : micro-op optimization passes

pub mod abi;
pub mod instruction;
pub mod liveness;
pub mod optimize;
pub mod temporaries;
pub mod codegen;

pub use codegen::Program;

use crate::ir::symbol_table::StorageResolver;
use crate::ir::ProgramIR;
use crate::{CompileError, CompileOptions};
use codegen::Codegen;

/// Compile IR to a resolved (and optionally optimized) micro-op program.
pub fn compile_ir_to_microcode(
    ir: &ProgramIR,
    resolver: &dyn StorageResolver,
    options: &CompileOptions,
) -> Result<Program, CompileError> {
    let mut cg = Codegen::new(resolver, options);
    cg.emit_program(ir)?;
    cg.finish_codegen()
}
