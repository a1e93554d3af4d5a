//! Control flow graph module
//!
//! This module maintains the per-procedure block graph: an arena of basic
//! blocks, an ordered address index over their start addresses, and the
//! edge and lifecycle operations the incremental builder
//! ([`builder`](crate::cfg::builder)) mutates while disassembly discovers
//! code out of order.

pub mod analysis;
pub mod block;
pub mod builder;
pub mod implicit;
pub mod visualization;

use crate::ir::stmt::StmtId;
use crate::ir::Address;
use crate::ir::expr::Expr;
use crate::proc::{ProcId, ProcTable};
use std::collections::{BTreeMap, HashMap};

pub use block::{BasicBlock, BlockId, BlockKind};

/// The control flow graph of one decompiled procedure.
///
/// Owns every [`BasicBlock`] it creates; all cross-references between blocks
/// (edges, the implicit-definition cache, handles returned to callers) are
/// [`BlockId`] lookups into the arena, never borrowed pointers, so removing
/// a block can never dangle: stale ids simply stop resolving.
pub struct ProcCfg {
    /// Procedure this graph belongs to
    proc: ProcId,
    /// Block arena; removal tombstones a slot, ids are never reused
    arena: Vec<Option<BasicBlock>>,
    /// Ordered index: start address -> block
    start_map: BTreeMap<Address, BlockId>,
    /// Address-less orphan blocks (kept at the `Address::ZERO` sentinel)
    orphans: Vec<BlockId>,
    entry: Option<BlockId>,
    exit: Option<BlockId>,
    /// Canonical (subscript-stripped) expression -> implicit entry definition
    implicit_map: HashMap<Expr, StmtId>,
    /// Cached result of the last `is_well_formed` run
    well_formed: bool,
    next_stmt: u32,
}

impl ProcCfg {
    /// Create an empty CFG for the given procedure
    pub fn new(proc: ProcId) -> Self {
        Self {
            proc,
            arena: Vec::new(),
            start_map: BTreeMap::new(),
            orphans: Vec::new(),
            entry: None,
            exit: None,
            implicit_map: HashMap::new(),
            well_formed: true,
            next_stmt: 0,
        }
    }

    /// Identity of the owning procedure
    pub fn proc(&self) -> ProcId {
        self.proc
    }

    /// Resolve a block id; `None` for removed or never-allocated ids
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.arena.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Mutable variant of [`block`](Self::block)
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.arena.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    /// Number of blocks currently in the index
    pub fn num_bbs(&self) -> usize {
        self.start_map.len() + self.orphans.len()
    }

    /// Whether `id` refers to a block still owned and indexed by this CFG
    pub fn has_bb(&self, id: BlockId) -> bool {
        match self.block(id) {
            Some(bb) if bb.low_addr == Address::ZERO => self.orphans.contains(&id),
            Some(bb) => self.start_map.get(&bb.low_addr) == Some(&id),
            None => false,
        }
    }

    /// Block starting exactly at `addr`, if any
    pub fn bb_starting_at(&self, addr: Address) -> Option<BlockId> {
        self.start_map.get(&addr).copied()
    }

    pub fn is_start_of_bb(&self, addr: Address) -> bool {
        self.bb_starting_at(addr).is_some()
    }

    pub fn is_start_of_incomplete_bb(&self, addr: Address) -> bool {
        self.bb_starting_at(addr)
            .and_then(|id| self.block(id))
            .is_some_and(BasicBlock::is_incomplete)
    }

    /// Block ids in address order (orphans first, at the zero sentinel)
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.orphans
            .iter()
            .chain(self.start_map.values())
            .copied()
            .collect()
    }

    /// Blocks in address order
    pub fn iter(&self) -> impl Iterator<Item = &BasicBlock> + '_ {
        self.orphans
            .iter()
            .chain(self.start_map.values())
            .filter_map(move |&id| self.block(id))
    }

    pub fn entry_bb(&self) -> Option<BlockId> {
        self.entry
    }

    pub fn exit_bb(&self) -> Option<BlockId> {
        self.exit
    }

    /// Record the entry block and pick the first return block as exit.
    ///
    /// A procedure with no return path keeps `exit_bb` absent.
    pub fn set_entry_and_exit_bb(&mut self, entry: BlockId) {
        self.entry = Some(entry);
        let exit = self
            .iter()
            .find(|bb| bb.kind == BlockKind::Ret)
            .map(BasicBlock::id);
        self.exit = exit;
    }

    /// Cached result of the last validator run.
    ///
    /// Only trustworthy immediately after [`is_well_formed`](Self::is_well_formed).
    pub fn well_formed(&self) -> bool {
        self.well_formed
    }

    /// Wire a predecessor/successor pair.
    ///
    /// Gaining a second successor promotes a `Oneway` source to `Twoway`.
    /// No-op when either endpoint no longer resolves.
    pub fn add_edge(&mut self, src: BlockId, dst: BlockId) {
        if self.block(src).is_none() || self.block(dst).is_none() {
            return;
        }

        if let Some(dst_bb) = self.block_mut(dst) {
            dst_bb.add_predecessor(src);
        }
        if let Some(src_bb) = self.block_mut(src) {
            src_bb.add_successor(dst);
            if src_bb.kind == BlockKind::Oneway && src_bb.num_successors() > 1 {
                src_bb.kind = BlockKind::Twoway;
            }
        }
    }

    /// Wire an edge to a target address, creating an incomplete placeholder
    /// when no block starts there yet.
    ///
    /// Most edges are wired this way during construction, since branch
    /// targets are usually discovered before their code is decoded.
    pub fn add_edge_to_addr(&mut self, src: BlockId, addr: Address) {
        let dst = match self.bb_starting_at(addr) {
            Some(id) => id,
            None => self.create_incomplete_bb(addr),
        };
        self.add_edge(src, dst);
    }

    /// Remove a block from the graph.
    ///
    /// Severs caller backlinks for every call statement in the block, clears
    /// cached phi annotations on every other block (dataflow must be
    /// recomputed procedure-wide after a structural change), drops the index
    /// entry and tombstones the arena slot. Neighbors' edge lists are not
    /// pruned beyond that; the validator reports any edge still naming the
    /// removed block.
    pub fn remove_bb(&mut self, id: BlockId, procs: &mut ProcTable) {
        let Some(bb) = self.block(id) else {
            log::warn!("tried to remove block {id}; it is not owned by this CFG");
            return;
        };
        let low_addr = bb.low_addr;

        let severed: Vec<(ProcId, StmtId)> = bb
            .stmts
            .iter()
            .filter_map(|s| s.call_dest().map(|callee| (callee, s.id)))
            .filter(|&(callee, _)| procs.get(callee).is_some_and(|p| !p.is_lib))
            .collect();
        for (callee, stmt) in severed {
            procs.remove_caller(callee, stmt);
        }

        let in_map = self.start_map.get(&low_addr) == Some(&id);
        let orphan_pos = self.orphans.iter().position(|&o| o == id);

        if in_map || orphan_pos.is_some() {
            // Dataflow has to be redone for the whole procedure now
            for (idx, slot) in self.arena.iter_mut().enumerate() {
                if idx != id.0 as usize {
                    if let Some(other) = slot.as_mut() {
                        other.clear_phis();
                    }
                }
            }

            if in_map {
                self.start_map.remove(&low_addr);
            } else if let Some(pos) = orphan_pos {
                self.orphans.remove(pos);
            }
        } else {
            log::warn!("tried to remove block at address {low_addr}; does not exist in CFG");
        }

        self.arena[id.0 as usize] = None;
    }

    /// Whole-graph consistency check, run once construction is believed
    /// complete.
    ///
    /// Fails fast on the first violation, logging the offending address
    /// pair. The result is cached in [`well_formed`](Self::well_formed).
    pub fn is_well_formed(&mut self) -> bool {
        let ok = self.check_well_formed();
        self.well_formed = ok;
        ok
    }

    fn check_well_formed(&self) -> bool {
        for bb in self.iter() {
            if bb.is_incomplete() {
                log::error!(
                    "CFG is not well formed: block at address {} is incomplete",
                    bb.low_addr
                );
                return false;
            }
            if bb.proc != self.proc {
                log::error!(
                    "CFG is not well formed: block at address {} does not belong to proc#{}",
                    bb.low_addr,
                    self.proc.0
                );
                return false;
            }

            for &pred in &bb.preds {
                let Some(pred_bb) = self.block(pred) else {
                    log::error!(
                        "CFG is not well formed: block at {} has a predecessor that no longer exists",
                        bb.low_addr
                    );
                    return false;
                };
                if !pred_bb.is_predecessor_of(bb.id) {
                    log::error!(
                        "CFG is not well formed: edge from block at {} to block at {} is malformed",
                        pred_bb.low_addr,
                        bb.low_addr
                    );
                    return false;
                }
                if pred_bb.proc != bb.proc {
                    log::error!(
                        "CFG is not well formed: interprocedural edge from block at {} to block at {}",
                        pred_bb.low_addr,
                        bb.low_addr
                    );
                    return false;
                }
            }

            for &succ in &bb.succs {
                let Some(succ_bb) = self.block(succ) else {
                    log::error!(
                        "CFG is not well formed: block at {} has a successor that no longer exists",
                        bb.low_addr
                    );
                    return false;
                };
                if !succ_bb.is_successor_of(bb.id) {
                    log::error!(
                        "CFG is not well formed: edge from block at {} to block at {} is malformed",
                        bb.low_addr,
                        succ_bb.low_addr
                    );
                    return false;
                }
                if succ_bb.proc != bb.proc {
                    log::error!(
                        "CFG is not well formed: interprocedural edge from block at {} to block at {}",
                        bb.low_addr,
                        succ_bb.low_addr
                    );
                    return false;
                }
            }
        }

        true
    }

    /// First return block in address order, or the best approximation.
    ///
    /// A procedure without an explicit return can still have a well-defined
    /// last block: the last call whose callee is a non-library procedure
    /// known never to return.
    pub fn find_ret_node(&self, procs: &ProcTable) -> Option<BlockId> {
        let mut ret_node = None;

        for bb in self.iter() {
            match bb.kind {
                BlockKind::Ret => return Some(bb.id),
                BlockKind::Call => {
                    let callee = bb.stmts.iter().find_map(|s| s.call_dest());
                    if let Some(callee) = callee {
                        if procs
                            .get(callee)
                            .is_some_and(|p| !p.is_lib && p.no_return)
                        {
                            ret_node = Some(bb.id);
                        }
                    }
                }
                _ => {}
            }
        }

        ret_node
    }

    /// Run the per-block statement simplification pass over the whole graph
    pub fn simplify(&mut self) {
        log::debug!("simplifying CFG of proc#{}", self.proc.0);
        for id in self.block_ids() {
            if let Some(bb) = self.block_mut(id) {
                bb.simplify();
            }
        }
    }

    /// Soft reset for the re-decode workflow.
    ///
    /// Drops the address index, orphan list, implicit-definition cache and
    /// entry/exit markers, but deliberately keeps the arena: statements
    /// owned by the old blocks must stay alive for callers that still hold
    /// handles into them. The memory is reclaimed when the `ProcCfg` itself
    /// is dropped.
    pub fn clear(&mut self) {
        self.start_map.clear();
        self.orphans.clear();
        self.implicit_map.clear();
        self.entry = None;
        self.exit = None;
        self.well_formed = true;
    }

    /// Mint a statement handle unique within this CFG
    pub fn mint_stmt_id(&mut self) -> StmtId {
        let id = StmtId(self.next_stmt);
        self.next_stmt += 1;
        id
    }

    pub(crate) fn alloc(&mut self, make: impl FnOnce(BlockId) -> BasicBlock) -> BlockId {
        let id = BlockId(self.arena.len() as u32);
        self.arena.push(Some(make(id)));
        id
    }

    /// Put a block into the address index.
    ///
    /// Blocks at the zero sentinel go to the orphan list, which permits
    /// duplicates; everything else keys the ordered map, replacing any
    /// previous entry at the same address.
    pub(crate) fn insert_bb(&mut self, id: BlockId) {
        let Some(bb) = self.block(id) else {
            return;
        };
        debug_assert!(bb.low_addr.is_valid());
        let low_addr = bb.low_addr;

        if low_addr == Address::ZERO {
            if !self.orphans.contains(&id) {
                self.orphans.push(id);
            }
        } else {
            self.start_map.insert(low_addr, id);
        }
    }

    pub(crate) fn implicit_map(&self) -> &HashMap<Expr, StmtId> {
        &self.implicit_map
    }

    pub(crate) fn implicit_map_mut(&mut self) -> &mut HashMap<Expr, StmtId> {
        &mut self.implicit_map
    }
}
