//! Basic block module
//!
//! This module contains the BasicBlock struct and related functionality.
//! Blocks live in the arena of their owning [`ProcCfg`](crate::cfg::ProcCfg)
//! and refer to each other by [`BlockId`]; a block is never moved or freed
//! while the CFG is alive, only tombstoned on removal.

use crate::ir::expr::Expr;
use crate::ir::stmt::{PhiNode, Statement, StmtId};
use crate::ir::{Address, MachineInstruction};
use crate::proc::ProcId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle for a basic block within one CFG's arena.
///
/// Ids are never reused, so a handle held after its block was removed
/// resolves to nothing instead of to a recycled block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Classification of a basic block by its control-transfer shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    /// Placeholder kind of an incomplete block
    Invalid,
    /// Falls through to the next block in address order
    Fall,
    /// Ends in an unconditional branch
    Oneway,
    /// Ends in a conditional branch
    Twoway,
    /// Ends in a multi-target computed branch
    Nway,
    /// Ends in a call
    Call,
    /// Ends in a return
    Ret,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockKind::Invalid => "invalid",
            BlockKind::Fall => "fall",
            BlockKind::Oneway => "oneway",
            BlockKind::Twoway => "twoway",
            BlockKind::Nway => "nway",
            BlockKind::Call => "call",
            BlockKind::Ret => "ret",
        };
        f.write_str(name)
    }
}

/// Basic block containing a contiguous run of instructions.
///
/// An incomplete block is a forward-reference placeholder: it reserves a
/// start address in the index and may already have incoming edges recorded,
/// but carries no instructions until the code at its address is decoded.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub(crate) id: BlockId,
    pub(crate) proc: ProcId,
    pub(crate) kind: BlockKind,
    pub(crate) complete: bool,
    pub(crate) low_addr: Address,
    /// Address of the last instruction (inclusive); equals `low_addr` while
    /// the block is incomplete.
    pub(crate) high_addr: Address,
    pub(crate) insns: Vec<MachineInstruction>,
    pub(crate) stmts: Vec<Statement>,
    pub(crate) preds: Vec<BlockId>,
    pub(crate) succs: Vec<BlockId>,
    pub(crate) phis: Vec<PhiNode>,
}

impl BasicBlock {
    /// Create a complete block from a non-empty instruction batch
    pub(crate) fn new(
        id: BlockId,
        proc: ProcId,
        kind: BlockKind,
        insns: Vec<MachineInstruction>,
    ) -> Self {
        debug_assert!(!insns.is_empty());
        let mut bb = Self {
            id,
            proc,
            kind,
            complete: true,
            low_addr: Address::INVALID,
            high_addr: Address::INVALID,
            insns,
            stmts: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
            phis: Vec::new(),
        };
        bb.update_addresses();
        bb
    }

    /// Create an incomplete placeholder reserving `low_addr`
    pub(crate) fn new_incomplete(id: BlockId, proc: ProcId, low_addr: Address) -> Self {
        Self {
            id,
            proc,
            kind: BlockKind::Invalid,
            complete: false,
            low_addr,
            high_addr: low_addr,
            insns: Vec::new(),
            stmts: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
            phis: Vec::new(),
        }
    }

    /// Fill in a placeholder with decoded instructions, keeping its edges
    pub(crate) fn complete_with(&mut self, insns: Vec<MachineInstruction>) {
        debug_assert!(!insns.is_empty());
        self.insns = insns;
        self.complete = true;
        self.update_addresses();
    }

    /// Recompute the address range from the instruction list
    pub(crate) fn update_addresses(&mut self) {
        if let (Some(first), Some(last)) = (self.insns.first(), self.insns.last()) {
            self.low_addr = first.addr;
            self.high_addr = last.addr;
        } else {
            self.high_addr = self.low_addr;
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Identity of the procedure this block belongs to
    pub fn proc(&self) -> ProcId {
        self.proc
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: BlockKind) {
        self.kind = kind;
    }

    pub fn is_incomplete(&self) -> bool {
        !self.complete
    }

    /// Starting address
    pub fn low_addr(&self) -> Address {
        self.low_addr
    }

    /// Address of the last instruction (inclusive)
    pub fn high_addr(&self) -> Address {
        self.high_addr
    }

    /// Address execution falls to after the last instruction
    pub fn fall_through_addr(&self) -> Option<Address> {
        self.insns.last().map(MachineInstruction::end_addr)
    }

    /// Whether `addr` lies on this block's instruction range
    pub fn contains_addr(&self, addr: Address) -> bool {
        self.low_addr <= addr && addr <= self.high_addr
    }

    pub fn instructions(&self) -> &[MachineInstruction] {
        &self.insns
    }

    pub fn instruction_count(&self) -> usize {
        self.insns.len()
    }

    pub fn predecessors(&self) -> &[BlockId] {
        &self.preds
    }

    pub fn successors(&self) -> &[BlockId] {
        &self.succs
    }

    pub fn num_predecessors(&self) -> usize {
        self.preds.len()
    }

    pub fn num_successors(&self) -> usize {
        self.succs.len()
    }

    /// Whether `other` appears in this block's successor list
    pub fn is_predecessor_of(&self, other: BlockId) -> bool {
        self.succs.contains(&other)
    }

    /// Whether `other` appears in this block's predecessor list
    pub fn is_successor_of(&self, other: BlockId) -> bool {
        self.preds.contains(&other)
    }

    pub(crate) fn add_predecessor(&mut self, pred: BlockId) {
        self.preds.push(pred);
    }

    pub(crate) fn add_successor(&mut self, succ: BlockId) {
        self.succs.push(succ);
    }

    /// Remove one occurrence of `pred` from the predecessor list
    pub(crate) fn remove_predecessor(&mut self, pred: BlockId) {
        if let Some(pos) = self.preds.iter().position(|&p| p == pred) {
            self.preds.remove(pos);
        }
    }

    pub(crate) fn remove_all_successors(&mut self) {
        self.succs.clear();
    }

    /// Lifted statements, implicit entry definitions first
    pub fn statements(&self) -> &[Statement] {
        &self.stmts
    }

    /// Attach a lifted statement to this block
    pub fn push_statement(&mut self, stmt: Statement) {
        self.stmts.push(stmt);
    }

    /// Insert an implicit entry definition after any existing ones
    pub(crate) fn add_implicit_assign(&mut self, id: StmtId, lhs: Expr) {
        let at = self.stmts.iter().take_while(|s| s.is_implicit()).count();
        self.stmts.insert(at, Statement::implicit(id, lhs));
    }

    /// Remove the statement with the given id, if present
    pub(crate) fn remove_statement(&mut self, id: StmtId) -> bool {
        if let Some(pos) = self.stmts.iter().position(|s| s.id == id) {
            self.stmts.remove(pos);
            true
        } else {
            false
        }
    }

    /// Cached phi annotations
    pub fn phis(&self) -> &[PhiNode] {
        &self.phis
    }

    /// Record a phi annotation computed by the dataflow layer
    pub fn add_phi(&mut self, phi: PhiNode) {
        self.phis.push(phi);
    }

    /// Drop all cached phi annotations
    pub fn clear_phis(&mut self) {
        self.phis.clear();
    }

    /// Run the per-block statement simplification pass
    pub fn simplify(&mut self) {
        for stmt in &mut self.stmts {
            stmt.simplify();
        }
    }
}
