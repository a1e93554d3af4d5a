//! CFG visualization module
//!
//! This module contains visualization utilities for CFGs: DOT export for
//! graphing tools and a plain-text rendering for logs and debugging.

use crate::cfg::analysis::EdgeKind;
use crate::cfg::{BasicBlock, ProcCfg};
use std::fmt::Write;

/// DOT generation options
#[derive(Debug, Clone)]
pub struct DotOptions {
    /// Include edge labels
    pub include_labels: bool,
    /// Include edge colors
    pub include_colors: bool,
    /// Include node details
    pub include_node_details: bool,
}

impl Default for DotOptions {
    fn default() -> Self {
        Self {
            include_labels: true,
            include_colors: true,
            include_node_details: false,
        }
    }
}

/// Generate DOT representation of a CFG
pub fn generate_dot(cfg: &ProcCfg, options: &DotOptions) -> String {
    let (graph, _) = cfg.to_petgraph();

    let mut dot = String::new();
    dot.push_str("digraph CFG {\n");
    dot.push_str("  rankdir=TB;\n");
    dot.push_str("  node [shape=box];\n\n");

    // Add nodes
    for node in graph.node_indices() {
        if let Some(&id) = graph.node_weight(node) {
            if let Some(block) = cfg.block(id) {
                let label = format_block_label(block, options);
                let _ = writeln!(dot, "  {} [label=\"{}\"];", node.index(), label);
            }
        }
    }

    dot.push('\n');

    // Add edges with labels and colors
    for edge in graph.edge_indices() {
        let Some((tail, head)) = graph.edge_endpoints(edge) else {
            continue;
        };
        let Some(edge_kind) = graph.edge_weight(edge) else {
            continue;
        };

        let mut edge_str = format!("  {} -> {}", tail.index(), head.index());
        let mut attributes = Vec::new();

        if options.include_labels {
            attributes.push(format!("label=\"{}\"", edge_label(edge_kind)));
        }

        if options.include_colors {
            attributes.push(format!("color=\"{}\"", edge_color(edge_kind)));
        }

        if !attributes.is_empty() {
            edge_str.push_str(&format!(" [{}]", attributes.join(", ")));
        }

        edge_str.push_str(";\n");
        dot.push_str(&edge_str);
    }

    dot.push_str("}\n");
    dot
}

/// Format a block label for DOT
fn format_block_label(block: &BasicBlock, options: &DotOptions) -> String {
    if options.include_node_details {
        format!(
            "{} [{}]\\n{}..{} ({} instructions)",
            block.id(),
            block.kind(),
            block.low_addr(),
            block.high_addr(),
            block.instruction_count()
        )
    } else {
        format!("{} [{}]", block.id(), block.kind())
    }
}

fn edge_label(kind: &EdgeKind) -> &'static str {
    match kind {
        EdgeKind::Fall => "fall",
        EdgeKind::Taken => "taken",
    }
}

fn edge_color(kind: &EdgeKind) -> &'static str {
    match kind {
        EdgeKind::Fall => "blue",
        EdgeKind::Taken => "red",
    }
}

impl ProcCfg {
    /// Plain-text rendering: one block per line in address order, with its
    /// kind, address range and edge lists, followed by its statements.
    pub fn to_text(&self) -> String {
        let mut out = String::from("Control Flow Graph:\n");

        for bb in self.iter() {
            let preds: Vec<String> = bb.predecessors().iter().map(|p| p.to_string()).collect();
            let succs: Vec<String> = bb.successors().iter().map(|s| s.to_string()).collect();
            let _ = writeln!(
                out,
                "{} [{}] {}..{} in: [{}] out: [{}]",
                bb.id(),
                if bb.is_incomplete() {
                    "incomplete".to_string()
                } else {
                    bb.kind().to_string()
                },
                bb.low_addr(),
                bb.high_addr(),
                preds.join(", "),
                succs.join(", ")
            );

            for stmt in bb.statements() {
                let _ = writeln!(out, "    {}", stmt);
            }
        }

        out
    }
}
