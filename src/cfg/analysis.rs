//! Read-only graph analysis over a finished CFG
//!
//! The mutable CFG is an arena plus an address index, which is the right
//! shape for incremental construction but not for graph algorithms. Once
//! construction settles, analyses run on an exported petgraph snapshot
//! instead of re-implementing traversals over the arena.

use crate::cfg::{BlockId, ProcCfg};
use petgraph::algo::dominators::{simple_fast, Dominators};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Classification of an exported edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Execution continues at the next address
    Fall,
    /// A branch was taken to get here
    Taken,
}

impl ProcCfg {
    /// Export a snapshot of the graph for analysis.
    ///
    /// Nodes carry block ids; the returned map resolves a block id to its
    /// node index. Edges to blocks that no longer resolve are skipped, so
    /// the snapshot is usable even on a graph the validator would reject.
    pub fn to_petgraph(&self) -> (DiGraph<BlockId, EdgeKind>, HashMap<BlockId, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();

        for bb in self.iter() {
            nodes.insert(bb.id(), graph.add_node(bb.id()));
        }

        for bb in self.iter() {
            let Some(&src) = nodes.get(&bb.id()) else {
                continue;
            };
            let fall_addr = bb.fall_through_addr();

            for &succ in bb.successors() {
                let Some(succ_bb) = self.block(succ) else {
                    continue;
                };
                let Some(&dst) = nodes.get(&succ) else {
                    continue;
                };
                let kind = if fall_addr == Some(succ_bb.low_addr()) {
                    EdgeKind::Fall
                } else {
                    EdgeKind::Taken
                };
                graph.add_edge(src, dst, kind);
            }
        }

        (graph, nodes)
    }

    /// Compute the dominator tree rooted at the entry block.
    ///
    /// Returns `None` when no entry block is set.
    pub fn dominators(&self) -> Option<Dominators<NodeIndex>> {
        let entry = self.entry_bb()?;
        let (graph, nodes) = self.to_petgraph();
        let root = *nodes.get(&entry)?;
        Some(simple_fast(&graph, root))
    }
}
