//! Incremental CFG construction
//!
//! Decoding discovers code out of order: a branch target is usually known
//! before the code at that target has been decoded, and a later discovery
//! can land in the middle of a block that already exists. The operations
//! here absorb all of that: placeholders reserve addresses for forward
//! references, and overlapping discoveries are resolved by splitting, with
//! existing complete blocks always winning over newly decoded instructions.

use crate::cfg::{BasicBlock, BlockId, BlockKind, ProcCfg};
use crate::error::{Error, Result};
use crate::ir::{Address, MachineInstruction};
use std::ops::Bound;

impl ProcCfg {
    /// Create a complete block from a decoded instruction batch.
    ///
    /// Returns the block that should receive the out-edges for this batch:
    /// - `Ok(Some(id))` for a newly created or newly completed block. When
    ///   the new block overlapped a pending placeholder, `id` is the
    ///   placeholder, which now carries the tail of the batch.
    /// - `Ok(None)` when a complete block already starts at the batch's
    ///   address, or when the batch's tail overlapped an already complete
    ///   block whose out-edges exist. Both are expected during decoding.
    /// - `Err` only when the batch starts at [`Address::INVALID`], which
    ///   means the decoder itself is broken.
    pub fn create_bb(
        &mut self,
        kind: BlockKind,
        insns: Vec<MachineInstruction>,
    ) -> Result<Option<BlockId>> {
        let start_addr = match insns.first() {
            Some(first) => first.addr,
            None => return Err(Error::EmptyBlock),
        };
        if !start_addr.is_valid() {
            log::error!("refusing to create a block starting at an invalid address");
            return Err(Error::InvalidBlockAddress { addr: start_addr });
        }

        let proc = self.proc();

        // Orphans have no real address; they never participate in the
        // index ordering or in overlap resolution.
        if start_addr == Address::ZERO {
            let id = self.alloc(|id| BasicBlock::new(id, proc, kind, insns));
            self.insert_bb(id);
            return Ok(Some(id));
        }

        let current = match self.bb_starting_at(start_addr) {
            Some(existing) => {
                let Some(bb) = self.block_mut(existing) else {
                    return Err(Error::internal(format!(
                        "address index names a block that no longer exists at {start_addr}"
                    )));
                };
                if !bb.is_incomplete() {
                    log::debug!(
                        "not creating a block at address {start_addr} because a block already exists"
                    );
                    return Ok(None);
                }
                // A forward reference reserved this address; fill it in,
                // keeping the edges recorded while it was pending.
                bb.complete_with(insns);
                bb.kind = kind;
                existing
            }
            None => {
                let id = self.alloc(|id| BasicBlock::new(id, proc, kind, insns));
                self.insert_bb(id);
                id
            }
        };

        // The preceding indexed block may reach into the new one; truncate
        // it so the new block's start becomes its fall-through target.
        let prev = self
            .start_map
            .range(..start_addr)
            .next_back()
            .map(|(_, &id)| id);
        if let Some(prev) = prev {
            let reaches_in = self
                .block(prev)
                .is_some_and(|bb| !bb.is_incomplete() && bb.high_addr() >= start_addr);
            if reaches_in {
                self.split_bb(prev, start_addr, Some(current));
            }
        }

        // The new block may in turn reach into later indexed blocks. A
        // split that completes a placeholder hands it the batch's tail,
        // which can itself overlap the block after the placeholder, so the
        // check repeats on the high half until the chain settles.
        let mut current = current;
        loop {
            let (current_low, current_high) = match self.block(current) {
                Some(bb) => (bb.low_addr(), bb.high_addr()),
                None => break,
            };
            let next = self
                .start_map
                .range((Bound::Excluded(current_low), Bound::Unbounded))
                .next()
                .map(|(&addr, &id)| (addr, id));

            let Some((next_addr, next_id)) = next else {
                break;
            };
            if next_addr > current_high {
                break;
            }

            let next_was_incomplete = self.block(next_id).is_some_and(BasicBlock::is_incomplete);

            self.split_bb(current, next_addr, Some(next_id));

            // A completed placeholder now carries the batch's tail and
            // must receive the out-edges; a block that was already
            // complete has its out-edges in place.
            if next_was_incomplete {
                current = next_id;
            } else {
                log::debug!(
                    "not returning the block at address {start_addr}; its tail overlapped an existing block"
                );
                return Ok(None);
            }
        }

        Ok(Some(current))
    }

    /// Reserve `addr` with an incomplete placeholder block
    pub fn create_incomplete_bb(&mut self, addr: Address) -> BlockId {
        let proc = self.proc();
        let id = self.alloc(|id| BasicBlock::new_incomplete(id, proc, addr));
        self.insert_bb(id);
        id
    }

    /// Make sure a block starts at `addr`, splitting a covering block if
    /// needed.
    ///
    /// Returns `true` when a complete block now starts at `addr`, `false`
    /// when the address is only reserved by a placeholder. When a split
    /// retargets the block `current` points at, the handle is updated to
    /// the high half so the caller keeps adding out-edges to the right
    /// block.
    pub fn ensure_bb_exists(&mut self, addr: Address, mut current: Option<&mut BlockId>) -> bool {
        let overlapping = match self.bb_starting_at(addr) {
            Some(id) => Some(id),
            None => self
                .start_map
                .range(..addr)
                .next_back()
                .map(|(_, &id)| id)
                .filter(|&id| self.block(id).is_some_and(|bb| bb.contains_addr(addr))),
        };

        let Some(overlapping) = overlapping else {
            self.create_incomplete_bb(addr);
            return false;
        };

        let (low_addr, incomplete) = match self.block(overlapping) {
            Some(bb) => (bb.low_addr(), bb.is_incomplete()),
            None => {
                self.create_incomplete_bb(addr);
                return false;
            }
        };

        if incomplete {
            return false;
        }

        if low_addr < addr {
            // addr lands mid-block; split so it becomes a block start
            self.split_bb(overlapping, addr, None);

            if let Some(current) = current.as_deref_mut() {
                if *current == overlapping {
                    if let Some(high) = self.bb_starting_at(addr) {
                        *current = high;
                    }
                }
            }
        }

        true
    }

    /// Split `bb` at `split_addr`, producing a low half that falls through
    /// to the high half.
    ///
    /// With `existing` naming an already complete block, the low half is
    /// truncated against it and the overlapping tail instructions are
    /// discarded; the complete block's data wins. Otherwise the tail is
    /// moved into `existing`'s placeholder (or a fresh one), which inherits
    /// all of `bb`'s successors and its kind.
    ///
    /// Returns the high half, or `bb` unchanged when no instruction starts
    /// exactly at `split_addr` (a jump into the middle of an instruction is
    /// a decode anomaly, not a fatal error).
    pub fn split_bb(
        &mut self,
        bb: BlockId,
        split_addr: Address,
        existing: Option<BlockId>,
    ) -> BlockId {
        let split_at = match self.block(bb) {
            Some(low) => low
                .instructions()
                .iter()
                .position(|insn| insn.addr == split_addr),
            None => return bb,
        };
        let Some(split_at) = split_at else {
            let low_addr = self.block(bb).map(BasicBlock::low_addr);
            log::warn!(
                "cannot split block at address {} at split address {split_addr}",
                low_addr.unwrap_or(Address::INVALID)
            );
            return bb;
        };

        let existing_complete = existing
            .filter(|&id| self.block(id).is_some_and(|high| !high.is_incomplete()));

        if let Some(high) = existing_complete {
            // The high part already exists; drop the overlapping tail.
            let old_succs = match self.block_mut(bb) {
                Some(low) => {
                    low.insns.truncate(split_at);
                    low.update_addresses();
                    low.set_kind(BlockKind::Fall);
                    let succs = low.successors().to_vec();
                    low.remove_all_successors();
                    succs
                }
                None => return bb,
            };
            for succ in old_succs {
                if let Some(succ_bb) = self.block_mut(succ) {
                    succ_bb.remove_predecessor(bb);
                }
            }
            // The high block keeps its recorded predecessors: it may be a
            // placeholder that collected in-edges before being completed,
            // and those sources still list it as a successor.
            if let Some(high_bb) = self.block_mut(high) {
                high_bb.update_addresses();
            }
            self.add_edge(bb, high);
            self.insert_bb(high);
            return high;
        }

        let fresh = existing.is_none();
        let high = match existing {
            Some(placeholder) => placeholder,
            None => self.create_incomplete_bb(split_addr),
        };

        // Transfer ownership of the tail instructions; nothing is copied.
        let (tail, old_kind, old_succs) = match self.block_mut(bb) {
            Some(low) => {
                let tail = low.insns.split_off(split_at);
                low.update_addresses();
                let old_kind = low.kind();
                low.set_kind(BlockKind::Fall);
                let succs = low.successors().to_vec();
                low.remove_all_successors();
                (tail, old_kind, succs)
            }
            None => return bb,
        };

        if let Some(high_bb) = self.block_mut(high) {
            debug_assert_eq!(high_bb.num_successors(), 0);
            if fresh {
                debug_assert_eq!(high_bb.num_predecessors(), 0);
            }
            high_bb.complete_with(tail);
            high_bb.set_kind(old_kind);
        }

        // The high half inherits every former successor of the low half.
        for &succ in &old_succs {
            if let Some(succ_bb) = self.block_mut(succ) {
                succ_bb.remove_predecessor(bb);
                succ_bb.add_predecessor(high);
            }
        }
        if let Some(high_bb) = self.block_mut(high) {
            for &succ in &old_succs {
                high_bb.add_successor(succ);
            }
        }

        self.add_edge(bb, high);
        high
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::ProcId;

    fn insns(start: u64, end: u64) -> Vec<MachineInstruction> {
        (start..end)
            .step_by(4)
            .map(|a| MachineInstruction::new(Address(a), 4, "insn"))
            .collect()
    }

    #[test]
    fn test_create_bb_rejects_invalid_address() {
        let mut cfg = ProcCfg::new(ProcId(0));
        let batch = vec![MachineInstruction::new(Address::INVALID, 4, "insn")];
        assert!(matches!(
            cfg.create_bb(BlockKind::Fall, batch),
            Err(Error::InvalidBlockAddress { .. })
        ));
    }

    #[test]
    fn test_create_bb_rejects_empty_batch() {
        let mut cfg = ProcCfg::new(ProcId(0));
        assert!(matches!(
            cfg.create_bb(BlockKind::Fall, Vec::new()),
            Err(Error::EmptyBlock)
        ));
    }

    #[test]
    fn test_duplicate_create_is_a_noop() {
        let mut cfg = ProcCfg::new(ProcId(0));
        let first = cfg.create_bb(BlockKind::Fall, insns(0x10, 0x20)).unwrap();
        assert!(first.is_some());
        let second = cfg.create_bb(BlockKind::Fall, insns(0x10, 0x20)).unwrap();
        assert!(second.is_none());
        assert_eq!(cfg.num_bbs(), 1);
    }

    #[test]
    fn test_create_bb_completes_placeholder_in_place() {
        let mut cfg = ProcCfg::new(ProcId(0));
        let src = cfg
            .create_bb(BlockKind::Oneway, insns(0x100, 0x104))
            .unwrap()
            .unwrap();
        cfg.add_edge_to_addr(src, Address(0x10));

        let placeholder = cfg.bb_starting_at(Address(0x10)).unwrap();
        assert!(cfg.block(placeholder).unwrap().is_incomplete());

        let id = cfg
            .create_bb(BlockKind::Ret, insns(0x10, 0x20))
            .unwrap()
            .unwrap();
        assert_eq!(id, placeholder);

        let bb = cfg.block(id).unwrap();
        assert!(!bb.is_incomplete());
        assert_eq!(bb.kind(), BlockKind::Ret);
        assert_eq!(bb.predecessors(), &[src]);
    }

    #[test]
    fn test_late_overlapping_batch_truncates_against_existing() {
        // [0x10, 0x20) exists; [0x18, 0x30) arrives later. The existing
        // block is truncated at 0x18 and falls through to the new one.
        let mut cfg = ProcCfg::new(ProcId(0));
        let first = cfg
            .create_bb(BlockKind::Ret, insns(0x10, 0x20))
            .unwrap()
            .unwrap();
        let second = cfg
            .create_bb(BlockKind::Ret, insns(0x18, 0x30))
            .unwrap()
            .unwrap();

        let low = cfg.block(first).unwrap();
        assert_eq!(low.low_addr(), Address(0x10));
        assert_eq!(low.high_addr(), Address(0x14));
        assert_eq!(low.kind(), BlockKind::Fall);
        assert_eq!(low.successors(), &[second]);

        let high = cfg.block(second).unwrap();
        assert_eq!(high.low_addr(), Address(0x18));
        assert_eq!(high.high_addr(), Address(0x2c));
        assert_eq!(high.predecessors(), &[first]);

        assert!(cfg.is_well_formed());
    }

    #[test]
    fn test_forward_overlap_truncates_new_batch() {
        // [0x20, 0x30) exists; [0x10, 0x28) arrives later. The new block
        // keeps [0x10, 0x20) and falls through; the existing data wins.
        let mut cfg = ProcCfg::new(ProcId(0));
        let second = cfg
            .create_bb(BlockKind::Ret, insns(0x20, 0x30))
            .unwrap()
            .unwrap();
        let result = cfg.create_bb(BlockKind::Ret, insns(0x10, 0x28)).unwrap();
        assert!(result.is_none());

        let first = cfg.bb_starting_at(Address(0x10)).unwrap();
        let low = cfg.block(first).unwrap();
        assert_eq!(low.high_addr(), Address(0x1c));
        assert_eq!(low.kind(), BlockKind::Fall);
        assert_eq!(low.successors(), &[second]);
        assert!(cfg.is_well_formed());
    }

    #[test]
    fn test_forward_overlap_completes_placeholder_with_tail() {
        // A placeholder at 0x20, then a batch [0x10, 0x30): the tail
        // [0x20, 0x30) completes the placeholder, which is returned so the
        // caller adds out-edges to it.
        let mut cfg = ProcCfg::new(ProcId(0));
        let placeholder = cfg.create_incomplete_bb(Address(0x20));
        let result = cfg
            .create_bb(BlockKind::Twoway, insns(0x10, 0x30))
            .unwrap()
            .unwrap();
        assert_eq!(result, placeholder);

        let high = cfg.block(placeholder).unwrap();
        assert!(!high.is_incomplete());
        assert_eq!(high.kind(), BlockKind::Twoway);
        assert_eq!(high.low_addr(), Address(0x20));
        assert_eq!(high.high_addr(), Address(0x2c));

        let low = cfg.bb_starting_at(Address(0x10)).unwrap();
        assert_eq!(cfg.block(low).unwrap().kind(), BlockKind::Fall);
        assert_eq!(cfg.block(low).unwrap().successors(), &[placeholder]);
    }

    #[test]
    fn test_backward_truncation_keeps_placeholder_edges() {
        // A branch records an edge to 0x18 before that code is decoded,
        // and 0x18 sits inside an already complete block. Completing the
        // placeholder must keep the recorded edge while the covering block
        // is truncated against it.
        let mut cfg = ProcCfg::new(ProcId(0));
        let first = cfg
            .create_bb(BlockKind::Ret, insns(0x10, 0x20))
            .unwrap()
            .unwrap();
        let src = cfg
            .create_bb(BlockKind::Oneway, insns(0x100, 0x104))
            .unwrap()
            .unwrap();
        cfg.add_edge_to_addr(src, Address(0x18));

        let target = cfg
            .create_bb(BlockKind::Ret, insns(0x18, 0x30))
            .unwrap()
            .unwrap();

        let high = cfg.block(target).unwrap();
        assert!(high.is_successor_of(src));
        assert!(high.is_successor_of(first));
        assert_eq!(cfg.block(src).unwrap().successors(), &[target]);
        assert_eq!(cfg.block(first).unwrap().successors(), &[target]);
        assert_eq!(cfg.block(first).unwrap().high_addr(), Address(0x14));
        assert!(cfg.is_well_formed());
    }

    #[test]
    fn test_forward_overlap_cascades_past_completed_placeholder() {
        // A placeholder at 0x20 and a complete block at 0x40, then one
        // long batch over both. The tail handed to the placeholder still
        // overlaps the complete block and must be truncated in turn.
        let mut cfg = ProcCfg::new(ProcId(0));
        let mid = cfg.create_incomplete_bb(Address(0x20));
        let last = cfg
            .create_bb(BlockKind::Ret, insns(0x40, 0x50))
            .unwrap()
            .unwrap();

        let result = cfg.create_bb(BlockKind::Ret, insns(0x10, 0x50)).unwrap();
        assert!(result.is_none());

        let first = cfg.bb_starting_at(Address(0x10)).unwrap();
        assert_eq!(cfg.block(first).unwrap().high_addr(), Address(0x1c));
        assert_eq!(cfg.block(first).unwrap().successors(), &[mid]);
        assert_eq!(cfg.block(mid).unwrap().high_addr(), Address(0x3c));
        assert_eq!(cfg.block(mid).unwrap().kind(), BlockKind::Fall);
        assert_eq!(cfg.block(mid).unwrap().successors(), &[last]);
        assert!(cfg.is_well_formed());
    }

    #[test]
    fn test_forward_overlap_returns_last_completed_placeholder() {
        let mut cfg = ProcCfg::new(ProcId(0));
        let a = cfg.create_incomplete_bb(Address(0x20));
        let b = cfg.create_incomplete_bb(Address(0x40));

        let result = cfg
            .create_bb(BlockKind::Twoway, insns(0x10, 0x50))
            .unwrap()
            .unwrap();

        // the final tail lives in the last placeholder; out-edges go there
        assert_eq!(result, b);
        assert_eq!(cfg.block(b).unwrap().kind(), BlockKind::Twoway);
        assert_eq!(cfg.block(a).unwrap().kind(), BlockKind::Fall);
        assert_eq!(cfg.block(a).unwrap().successors(), &[b]);
        assert!(cfg.is_well_formed());
    }

    #[test]
    fn test_ensure_bb_exists_splits_covering_block() {
        let mut cfg = ProcCfg::new(ProcId(0));
        let mut current = cfg
            .create_bb(BlockKind::Ret, insns(0x10, 0x30))
            .unwrap()
            .unwrap();
        let original = current;

        assert!(cfg.ensure_bb_exists(Address(0x18), Some(&mut current)));
        assert_ne!(current, original);

        let low = cfg.block(original).unwrap();
        assert_eq!(low.kind(), BlockKind::Fall);
        assert_eq!(low.high_addr(), Address(0x14));
        assert_eq!(low.successors(), &[current]);

        let high = cfg.block(current).unwrap();
        assert_eq!(high.low_addr(), Address(0x18));
        assert_eq!(high.kind(), BlockKind::Ret);
        assert!(cfg.is_well_formed());
    }

    #[test]
    fn test_ensure_bb_exists_reserves_unknown_addr() {
        let mut cfg = ProcCfg::new(ProcId(0));
        assert!(!cfg.ensure_bb_exists(Address(0x40), None));
        assert!(cfg.is_start_of_incomplete_bb(Address(0x40)));
        // a second call sees the placeholder and still reports unresolved
        assert!(!cfg.ensure_bb_exists(Address(0x40), None));
    }

    #[test]
    fn test_split_conserves_instructions() {
        let mut cfg = ProcCfg::new(ProcId(0));
        let id = cfg
            .create_bb(BlockKind::Ret, insns(0x10, 0x30))
            .unwrap()
            .unwrap();
        let total = cfg.block(id).unwrap().instruction_count();

        let high = cfg.split_bb(id, Address(0x20), None);
        assert_ne!(high, id);

        let low_count = cfg.block(id).unwrap().instruction_count();
        let high_count = cfg.block(high).unwrap().instruction_count();
        assert_eq!(low_count + high_count, total);
        assert_eq!(cfg.block(high).unwrap().low_addr(), Address(0x20));
    }

    #[test]
    fn test_split_transfers_successors_to_high_half() {
        let mut cfg = ProcCfg::new(ProcId(0));
        let id = cfg
            .create_bb(BlockKind::Twoway, insns(0x10, 0x30))
            .unwrap()
            .unwrap();
        let taken = cfg
            .create_bb(BlockKind::Ret, insns(0x100, 0x104))
            .unwrap()
            .unwrap();
        let fall = cfg
            .create_bb(BlockKind::Ret, insns(0x200, 0x204))
            .unwrap()
            .unwrap();
        cfg.add_edge(id, taken);
        cfg.add_edge(id, fall);

        let high = cfg.split_bb(id, Address(0x20), None);

        let low = cfg.block(id).unwrap();
        assert_eq!(low.kind(), BlockKind::Fall);
        assert_eq!(low.successors(), &[high]);

        let high_bb = cfg.block(high).unwrap();
        assert_eq!(high_bb.kind(), BlockKind::Twoway);
        assert_eq!(high_bb.successors(), &[taken, fall]);
        assert!(cfg.block(taken).unwrap().is_successor_of(high));
        assert!(cfg.block(fall).unwrap().is_successor_of(high));
        assert!(!cfg.block(taken).unwrap().is_successor_of(id));
        assert!(cfg.is_well_formed());
    }

    #[test]
    fn test_split_at_non_boundary_is_a_noop() {
        let mut cfg = ProcCfg::new(ProcId(0));
        let id = cfg
            .create_bb(BlockKind::Ret, insns(0x10, 0x20))
            .unwrap()
            .unwrap();
        // 0x12 is inside the first instruction
        let result = cfg.split_bb(id, Address(0x12), None);
        assert_eq!(result, id);
        assert_eq!(cfg.block(id).unwrap().instruction_count(), 4);
    }

    #[test]
    fn test_orphan_blocks_may_share_the_sentinel() {
        let mut cfg = ProcCfg::new(ProcId(0));
        let a = cfg
            .create_bb(BlockKind::Fall, insns(0x0, 0x4))
            .unwrap()
            .unwrap();
        let b = cfg
            .create_bb(BlockKind::Fall, insns(0x0, 0x4))
            .unwrap()
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(cfg.num_bbs(), 2);
        assert!(cfg.has_bb(a));
        assert!(cfg.has_bb(b));
    }
}
