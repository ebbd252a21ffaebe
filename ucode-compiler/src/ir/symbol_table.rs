use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A resolved storage location for a named program variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub address: u16,
    #[serde(default = "default_mutable")]
    pub mutable: bool,
    #[serde(default = "default_size")]
    pub size: u16,
}

fn default_mutable() -> bool {
    true
}

fn default_size() -> u16 {
    1
}

impl Symbol {
    pub fn new(address: u16, size: u16, mutable: bool) -> Self {
        Self {
            address,
            mutable,
            size,
        }
    }
}

/// Maps program identifiers to fixed storage locations.
pub trait StorageResolver {
    fn resolve(&self, name: &str) -> Option<Symbol>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolTable {
    /// Global scope symbols
    globals: HashMap<String, Symbol>,
    /// Innermost local scope, shadowing globals while active
    #[serde(skip)]
    locals: Option<HashMap<String, Symbol>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            globals: HashMap::new(),
            locals: None,
        }
    }

    pub fn enter_scope(&mut self) {
        self.locals = Some(HashMap::new());
    }

    pub fn exit_scope(&mut self) {
        self.locals = None;
    }

    pub fn in_scope(&self) -> bool {
        self.locals.is_some()
    }

    /// Declare a symbol in the current scope. On redefinition the existing
    /// symbol is returned.
    pub fn declare(&mut self, name: impl Into<String>, symbol: Symbol) -> Result<(), Symbol> {
        let table = if let Some(ref mut locals) = self.locals {
            locals
        } else {
            &mut self.globals
        };

        let name = name.into();
        if let Some(existing) = table.get(&name) {
            return Err(*existing);
        }

        table.insert(name, symbol);
        Ok(())
    }

    /// Lookup a symbol (checks locals first, then globals)
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        if let Some(ref locals) = self.locals {
            if let Some(symbol) = locals.get(name) {
                return Some(symbol);
            }
        }
        self.globals.get(name)
    }

    pub fn len(&self) -> usize {
        self.globals.len() + self.locals.as_ref().map_or(0, |l| l.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageResolver for SymbolTable {
    fn resolve(&self, name: &str) -> Option<Symbol> {
        self.lookup(name).copied()
    }
}

impl StorageResolver for HashMap<String, Symbol> {
    fn resolve(&self, name: &str) -> Option<Symbol> {
        self.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locals_shadow_globals() {
        let mut table = SymbolTable::new();
        table.declare("x", Symbol::new(0x0110, 1, true)).unwrap();
        table.enter_scope();
        table.declare("x", Symbol::new(0x0200, 2, false)).unwrap();
        assert_eq!(table.resolve("x").map(|s| s.address), Some(0x0200));
        table.exit_scope();
        assert_eq!(table.resolve("x").map(|s| s.address), Some(0x0110));
    }

    #[test]
    fn redefinition_returns_existing() {
        let mut table = SymbolTable::new();
        table.declare("x", Symbol::new(0x0110, 1, true)).unwrap();
        let err = table.declare("x", Symbol::new(0x0111, 1, true)).unwrap_err();
        assert_eq!(err.address, 0x0110);
    }
}
