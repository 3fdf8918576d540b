//! Structural validation of a built flow graph
//!
//! Checks the invariants later passes rely on: the block ranges partition
//! the node stream, predecessor/successor lists mirror each other, and every
//! reachable block's idom chain terminates at block 0. Violations are
//! internal faults, not user-facing errors; callers assert on them in debug
//! builds.

use std::fmt;

use crate::ast::BlockId;

use super::FlowGraph;

#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Block ranges leave a gap, overlap, or run past the node stream.
    BrokenPartition { block: BlockId, detail: String },

    /// A successor entry has no matching predecessor entry (or vice versa).
    EdgeMismatch { from: BlockId, to: BlockId },

    /// Following idoms from a reachable block does not reach block 0.
    IdomCycle { block: BlockId },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::BrokenPartition { block, detail } => {
                write!(f, "broken block partition at {}: {}", block, detail)
            }
            ValidationError::EdgeMismatch { from, to } => {
                write!(f, "edge {} -> {} not mirrored", from, to)
            }
            ValidationError::IdomCycle { block } => {
                write!(f, "idom chain from {} does not reach block 0", block)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

pub fn validate(graph: &FlowGraph) -> Result<(), ValidationError> {
    check_partition(graph)?;
    check_edges(graph)?;
    check_idom_chains(graph)?;
    Ok(())
}

fn check_partition(graph: &FlowGraph) -> Result<(), ValidationError> {
    let sentinel = &graph.blocks[0];
    if !sentinel.is_empty() {
        return Err(ValidationError::BrokenPartition {
            block: sentinel.id,
            detail: "sentinel block is not empty".into(),
        });
    }
    let mut covered = 0usize;
    for block in &graph.blocks[1..] {
        if block.begin as usize != covered {
            return Err(ValidationError::BrokenPartition {
                block: block.id,
                detail: format!("range starts at {}, expected {}", block.begin, covered),
            });
        }
        if block.is_empty() {
            return Err(ValidationError::BrokenPartition {
                block: block.id,
                detail: "empty block was not merged".into(),
            });
        }
        covered += block.len as usize;
    }
    if covered != graph.order.len() {
        return Err(ValidationError::BrokenPartition {
            block: BlockId::invalid(),
            detail: format!("{} of {} nodes covered", covered, graph.order.len()),
        });
    }
    Ok(())
}

fn check_edges(graph: &FlowGraph) -> Result<(), ValidationError> {
    for block in &graph.blocks {
        for &succ in &block.succs {
            let forth = block.succs.iter().filter(|&&s| s == succ).count();
            let back = graph
                .block(succ)
                .preds
                .iter()
                .filter(|&&p| p == block.id)
                .count();
            if forth != back {
                return Err(ValidationError::EdgeMismatch {
                    from: block.id,
                    to: succ,
                });
            }
        }
    }
    Ok(())
}

fn check_idom_chains(graph: &FlowGraph) -> Result<(), ValidationError> {
    let n = graph.blocks.len();
    for block in graph.blocks.iter().skip(1) {
        if !block.reachable {
            continue;
        }
        let mut x = block.idom;
        let mut steps = 0;
        while x != BlockId::OUTSIDE {
            x = graph.block(x).idom;
            steps += 1;
            if steps > n {
                return Err(ValidationError::IdomCycle { block: block.id });
            }
        }
    }
    Ok(())
}
