//! Statements attached to basic blocks
//!
//! Blocks carry the lifted statements the rest of the decompiler works on.
//! The graph layer only needs three shapes: implicit entry definitions (the
//! cache in `cfg::implicit` mints them), plain assignments, and calls (block
//! removal severs their caller backlinks). Statements are addressed by
//! [`StmtId`] handles minted by the owning CFG.

use crate::cfg::BlockId;
use crate::ir::expr::Expr;
use crate::proc::ProcId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle for a statement, unique within one procedure's CFG
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StmtId(pub u32);

/// Statement payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    /// "Value of `lhs` at procedure entry, otherwise unconstrained"
    ImplicitAssign { lhs: Expr },
    /// Ordinary assignment
    Assign { lhs: Expr, rhs: Expr },
    /// Call to another procedure, if the destination is known
    Call { callee: Option<ProcId> },
}

/// A statement owned by a basic block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub id: StmtId,
    pub kind: StatementKind,
}

impl Statement {
    /// Create an implicit entry definition
    pub fn implicit(id: StmtId, lhs: Expr) -> Self {
        Self {
            id,
            kind: StatementKind::ImplicitAssign { lhs },
        }
    }

    /// Create an ordinary assignment
    pub fn assign(id: StmtId, lhs: Expr, rhs: Expr) -> Self {
        Self {
            id,
            kind: StatementKind::Assign { lhs, rhs },
        }
    }

    /// Create a call statement
    pub fn call(id: StmtId, callee: Option<ProcId>) -> Self {
        Self {
            id,
            kind: StatementKind::Call { callee },
        }
    }

    pub fn is_implicit(&self) -> bool {
        matches!(self.kind, StatementKind::ImplicitAssign { .. })
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, StatementKind::Call { .. })
    }

    /// Destination procedure, for call statements with a known callee
    pub fn call_dest(&self) -> Option<ProcId> {
        match self.kind {
            StatementKind::Call { callee } => callee,
            _ => None,
        }
    }

    /// Fold constant subexpressions in place
    pub fn simplify(&mut self) {
        match &mut self.kind {
            StatementKind::ImplicitAssign { lhs } => *lhs = lhs.simplify(),
            StatementKind::Assign { lhs, rhs } => {
                *lhs = lhs.simplify();
                *rhs = rhs.simplify();
            }
            StatementKind::Call { .. } => {}
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StatementKind::ImplicitAssign { lhs } => write!(f, "{} := -", lhs),
            StatementKind::Assign { lhs, rhs } => write!(f, "{} := {}", lhs, rhs),
            StatementKind::Call { callee: Some(p) } => write!(f, "call proc#{}", p.0),
            StatementKind::Call { callee: None } => write!(f, "call <unknown>"),
        }
    }
}

/// Cached phi-node annotation computed by the dataflow layer.
///
/// These are derived data: any structural change to the graph invalidates
/// them procedure-wide, which is why block removal clears them on every
/// surviving block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhiNode {
    /// Location the phi defines
    pub dest: Expr,
    /// One argument per predecessor
    pub args: Vec<(BlockId, Expr)>,
}
