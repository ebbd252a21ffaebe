use crate::backend::temporaries::{TemporariesAllocator, Temporary};
use crate::ir::symbol_table::{Symbol, SymbolTable};
use crate::ir::*;
use crate::{CompileError, CompileOptions};

/// An evaluated expression held in a temporary.
#[derive(Debug, Clone, Copy)]
pub struct Value {
    pub temp: Temporary,
    pub width: Width,
}

impl Value {
    pub fn loc(&self) -> Location {
        Location::Address(self.temp.address())
    }
}

pub struct Gen<'a> {
    pub out: ProgramIR,
    pub symbols: &'a mut SymbolTable,
    pub temps: TemporariesAllocator,
    pub labels: LabelMaker,
    /// Next free byte of static storage
    next_static: u32,
}

impl<'a> Gen<'a> {
    pub fn new(symbols: &'a mut SymbolTable, options: &CompileOptions) -> Self {
        Self {
            out: ProgramIR::new(),
            symbols,
            temps: TemporariesAllocator::new(options.temporaries_base, options.temporaries_limit),
            labels: LabelMaker::new(".Lir"),
            next_static: options.static_base as u32,
        }
    }

    pub fn finish(self) -> ProgramIR {
        self.out
    }

    pub fn emit(&mut self, i: Instr) {
        self.out.push(i);
    }

    pub fn new_label(&mut self) -> String {
        self.labels.next_label()
    }

    pub fn new_temp(&mut self, size: u16, construct: &str) -> Result<Temporary, CompileError> {
        self.temps
            .allocate(size)
            .ok_or_else(|| CompileError::OutOfTemporaries {
                construct: construct.to_string(),
            })
    }

    pub fn release(&mut self, value: Value) {
        self.temps.consume(&value.temp);
    }

    pub fn lookup(&self, name: &str) -> Result<Symbol, CompileError> {
        self.symbols
            .lookup(name)
            .copied()
            .ok_or_else(|| CompileError::UndefinedSymbol(name.to_string()))
    }

    /// Reserve `size` bytes of static storage.
    pub fn alloc_static(&mut self, name: &str, size: u16) -> Result<u16, CompileError> {
        let end = self.next_static + size as u32;
        if end > 1 << 16 {
            return Err(CompileError::OutOfStaticStorage(name.to_string()));
        }
        let address = self.next_static as u16;
        self.next_static = end;
        Ok(address)
    }
}
