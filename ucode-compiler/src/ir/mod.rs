//! Intermediate Representation (IR) module.
//!
//! This module contains the IR definitions, the statement-to-IR generator,
//! the input statement tree and symbol storage.

pub mod ir;
pub use ir::*;
pub mod ast;
pub mod ir_generator;
pub mod symbol_table;
