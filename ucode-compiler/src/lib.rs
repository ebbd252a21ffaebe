pub mod backend;
pub mod ir;

use backend::abi;
use backend::liveness::Boundary;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use backend::codegen::Program;
pub use backend::instruction::MicroOp;
pub use ir::ast::{Expr, Stmt};
pub use ir::symbol_table::{StorageResolver, Symbol, SymbolTable};
pub use ir::{Instr, ProgramIR};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Out of temporaries while lowering {construct}")]
    OutOfTemporaries { construct: String },

    #[error("Unresolved label: {0}")]
    UnresolvedLabel(String),

    #[error("Duplicate label: {0}")]
    DuplicateLabel(String),

    #[error("Undefined symbol: {0}")]
    UndefinedSymbol(String),

    #[error("Cannot store to immutable symbol: {0}")]
    ImmutableStore(String),

    #[error("Size mismatch for {name}: symbol holds {expected} byte(s), access needs {found}")]
    SizeMismatch {
        name: String,
        expected: u16,
        found: u16,
    },

    #[error("Redefinition of {0}")]
    Redefinition(String),

    #[error("Out of static storage for {0}")]
    OutOfStaticStorage(String),

    #[error("Program of {len} instruction(s) at base 0x{base:04x} does not fit below the halt vector")]
    ProgramTooLarge { base: u16, len: usize },
}

/// Knobs for a compilation. Every field has a default matching the fixed
/// runtime memory map, so an empty JSON object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Address of the first emitted instruction.
    pub base: u16,
    pub scratch_base: u16,
    pub scratch_limit: u16,
    pub temporaries_base: u16,
    pub temporaries_limit: u16,
    /// First address assigned to declared variables.
    pub static_base: u16,
    /// Run dead-store elimination on the lowered program.
    pub optimize: bool,
    pub boundary: Boundary,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            base: 0,
            scratch_base: abi::SCRATCH_BASE,
            scratch_limit: abi::SCRATCH_LIMIT,
            temporaries_base: abi::TEMPORARIES_BASE,
            temporaries_limit: abi::TEMPORARIES_LIMIT,
            static_base: abi::STATIC_STORAGE_BASE,
            optimize: true,
            boundary: Boundary::ProgramExit,
        }
    }
}

/// Lower IR to a micro-op program, resolving labels and symbols.
pub fn compile_ir(
    ir: &ProgramIR,
    resolver: &dyn StorageResolver,
    options: &CompileOptions,
) -> Result<Program, CompileError> {
    backend::compile_ir_to_microcode(ir, resolver, options)
}

/// Lower declarations and statements to IR. Declared variables are added
/// to `symbols`.
pub fn compile_statements(
    stmts: &[Stmt],
    symbols: &mut SymbolTable,
    options: &CompileOptions,
) -> Result<ProgramIR, CompileError> {
    ir::ir_generator::lower(stmts, symbols, options)
}

/// Statements straight through to micro-ops.
pub fn compile_unit(
    stmts: &[Stmt],
    symbols: &mut SymbolTable,
    options: &CompileOptions,
) -> Result<(ProgramIR, Program), CompileError> {
    let ir = compile_statements(stmts, symbols, options)?;
    let program = compile_ir(&ir, symbols, options)?;
    Ok((ir, program))
}
