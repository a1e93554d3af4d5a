//! Value expressions
//!
//! The value-analysis layer keys its implicit-definition lookups on these
//! expressions. Equality is structural; SSA renaming wraps an expression in
//! [`Expr::Subscript`], and lookups that must ignore renaming go through the
//! subscript-stripped canonical form.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary operators that can appear in a value expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
}

/// A value expression as seen by the value-analysis layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    /// A machine register
    Reg(u16),
    /// An integer constant
    Const(i64),
    /// A named formal parameter location
    Param(String),
    /// A memory location addressed by the inner expression
    Mem(Box<Expr>),
    /// A binary operation
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// An SSA-subscripted expression (definition number attached by renaming)
    Subscript(Box<Expr>, u32),
}

impl Expr {
    /// Canonical location expression for a named parameter
    pub fn param(name: &str) -> Expr {
        Expr::Param(name.to_string())
    }

    /// Wrap this expression with an SSA subscript
    pub fn subscripted(self, version: u32) -> Expr {
        Expr::Subscript(Box::new(self), version)
    }

    /// The canonical subscript-free form of this expression.
    ///
    /// Used as the implicit-definition cache key, so that a location looked
    /// up before and after SSA renaming resolves to the same entry.
    pub fn strip_subscripts(&self) -> Expr {
        match self {
            Expr::Subscript(inner, _) => inner.strip_subscripts(),
            Expr::Mem(inner) => Expr::Mem(Box::new(inner.strip_subscripts())),
            Expr::Binary(op, lhs, rhs) => Expr::Binary(
                *op,
                Box::new(lhs.strip_subscripts()),
                Box::new(rhs.strip_subscripts()),
            ),
            other => other.clone(),
        }
    }

    /// Structural equality ignoring SSA subscripts on either side
    pub fn eq_no_subscript(&self, other: &Expr) -> bool {
        self.strip_subscripts() == other.strip_subscripts()
    }

    /// Fold constant subexpressions
    pub fn simplify(&self) -> Expr {
        match self {
            Expr::Binary(op, lhs, rhs) => {
                let lhs = lhs.simplify();
                let rhs = rhs.simplify();
                if let (Expr::Const(a), Expr::Const(b)) = (&lhs, &rhs) {
                    let folded = match op {
                        BinOp::Add => a.wrapping_add(*b),
                        BinOp::Sub => a.wrapping_sub(*b),
                        BinOp::Mul => a.wrapping_mul(*b),
                    };
                    return Expr::Const(folded);
                }
                Expr::Binary(*op, Box::new(lhs), Box::new(rhs))
            }
            Expr::Mem(inner) => Expr::Mem(Box::new(inner.simplify())),
            Expr::Subscript(inner, version) => {
                Expr::Subscript(Box::new(inner.simplify()), *version)
            }
            other => other.clone(),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Reg(r) => write!(f, "r{}", r),
            Expr::Const(c) => write!(f, "{}", c),
            Expr::Param(name) => write!(f, "param({})", name),
            Expr::Mem(inner) => write!(f, "m[{}]", inner),
            Expr::Binary(op, lhs, rhs) => {
                let sym = match op {
                    BinOp::Add => "+",
                    BinOp::Sub => "-",
                    BinOp::Mul => "*",
                };
                write!(f, "({} {} {})", lhs, sym, rhs)
            }
            Expr::Subscript(inner, version) => write!(f, "{}{{{}}}", inner, version),
        }
    }
}
