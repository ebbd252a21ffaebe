//! Validated statements and expressions handed to declaration lowering.

use crate::ir::{BinOp, Width};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stmt {
    /// `let`/`var` declaration with an initializer
    VarDecl {
        name: String,
        expr: Expr,
        #[serde(default)]
        mutable: bool,
    },
    Assign {
        name: String,
        expr: Expr,
    },
    /// Expression evaluated for its effects
    Expr(Expr),
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        #[serde(default)]
        else_branch: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    Literal { value: u16, width: Width },
    Ident(String),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    pub fn u8(value: u8) -> Self {
        Expr::Literal {
            value: value as u16,
            width: Width::W8,
        }
    }

    pub fn u16(value: u16) -> Self {
        Expr::Literal {
            value,
            width: Width::W16,
        }
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}
