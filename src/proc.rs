//! Procedure registry interface
//!
//! The CFG consumes a small slice of the call-handling layer: every block
//! carries the identity of its owning procedure, block removal detaches
//! caller backlinks on callees, and return-node selection asks whether a
//! callee is a library function or is known never to return. [`ProcTable`]
//! is the minimal registry exposing exactly that.

use crate::ir::expr::Expr;
use crate::ir::stmt::StmtId;
use serde::{Deserialize, Serialize};

/// Identity of a procedure known to the program being decompiled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcId(pub u32);

/// A procedure as far as the graph layer is concerned
#[derive(Debug, Clone)]
pub struct Procedure {
    /// Demangled or synthetic name
    pub name: String,
    /// Library procedures have no decompiled body and keep no caller list
    pub is_lib: bool,
    /// Whether this procedure is known never to return
    pub no_return: bool,
    /// Call statements in other procedures targeting this one
    callers: Vec<StmtId>,
}

impl Procedure {
    /// Create a user procedure
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_lib: false,
            no_return: false,
            callers: Vec::new(),
        }
    }

    /// Create a library procedure
    pub fn lib(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_lib: true,
            no_return: false,
            callers: Vec::new(),
        }
    }

    /// Mark this procedure as never returning
    pub fn no_return(mut self) -> Self {
        self.no_return = true;
        self
    }

    /// Call statements currently registered as callers
    pub fn callers(&self) -> &[StmtId] {
        &self.callers
    }
}

/// Append-only registry of procedures
#[derive(Debug, Clone, Default)]
pub struct ProcTable {
    procs: Vec<Procedure>,
}

impl ProcTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a procedure and return its identity
    pub fn insert(&mut self, proc: Procedure) -> ProcId {
        let id = ProcId(self.procs.len() as u32);
        self.procs.push(proc);
        id
    }

    pub fn get(&self, id: ProcId) -> Option<&Procedure> {
        self.procs.get(id.0 as usize)
    }

    /// Record a call statement as a caller of `callee`
    pub fn add_caller(&mut self, callee: ProcId, stmt: StmtId) {
        if let Some(proc) = self.procs.get_mut(callee.0 as usize) {
            proc.callers.push(stmt);
        }
    }

    /// Detach a call statement from `callee`'s caller list
    pub fn remove_caller(&mut self, callee: ProcId, stmt: StmtId) {
        if let Some(proc) = self.procs.get_mut(callee.0 as usize) {
            if let Some(pos) = proc.callers.iter().position(|&s| s == stmt) {
                proc.callers.remove(pos);
            }
        }
    }
}

/// A named formal parameter of the procedure being decompiled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    /// Location expression the parameter lives in
    pub exp: Expr,
}

impl Parameter {
    pub fn new(name: impl Into<String>, exp: Expr) -> Self {
        Self {
            name: name.into(),
            exp,
        }
    }
}
