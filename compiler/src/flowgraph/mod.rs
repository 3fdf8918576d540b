//! Flow-graph construction for function bodies
//!
//! Transforms a linearized function body into basic blocks with dominator
//! tree, dominance frontiers, phi nodes, and SSA version numbers:
//!
//! ```,ignore
//! AST → node stream + edges → basic blocks → dominators → frontiers → SSA
//! ```
//!
//! Each stage consumes only the output of the previous stages plus the AST
//! itself. Everything here is per-function: one call to [`build_flow_graph`]
//! owns all of its intermediate state and nothing survives into the next
//! function's construction.

use std::fmt;

use diagnostics::{BudgetExhausted, DiagnosticEngine};
use log::debug;
use source_map::SourceLocation;

use crate::ast::{AstArena, BlockId, NodeId, NodeKind};

pub mod block;
pub mod dump;
pub mod validation;

pub(crate) mod dominance;
pub(crate) mod linearize;
pub(crate) mod ssa;

#[cfg(test)]
mod ssa_test;

pub use block::{BasicBlock, PhiNode, PhiSource};
pub use linearize::{EdgeKind, FlowEdge, NodeStream, MAX_NODE_INDEX};

/// Options for flow-graph construction
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    /// Run the structural validation pass after construction. Failures are
    /// internal faults, reported via `debug_assert!` and the log.
    pub validate: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            validate: cfg!(debug_assertions),
        }
    }
}

/// Statistics from one function's flow-graph construction
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowgraphStats {
    /// Nodes in the linearized stream
    pub nodes: usize,
    /// Recorded control-flow edges (node level)
    pub edges: usize,
    /// Basic blocks, including the block-0 sentinel
    pub blocks: usize,
    /// Blocks not reachable from the entry block
    pub unreachable_blocks: usize,
    /// Full passes the dominator fixpoint needed
    pub dominator_passes: usize,
    /// Phi nodes placed
    pub phi_nodes: usize,
}

/// Errors that abort flow-graph construction
#[derive(Debug, Clone)]
pub enum FlowgraphError {
    /// The function body has more nodes than a sequence index can address.
    /// Fatal for this function only; the caller discards the partial state
    /// and continues with the next function.
    FunctionTooLarge {
        nodes: usize,
        location: SourceLocation,
    },

    /// The diagnostic budget of the compilation unit is exhausted. Fatal for
    /// the whole unit.
    TooManyDiagnostics(BudgetExhausted),
}

impl fmt::Display for FlowgraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowgraphError::FunctionTooLarge { nodes, .. } => {
                write!(
                    f,
                    "function too large: {} nodes exceed the {} node limit",
                    nodes,
                    MAX_NODE_INDEX + 1
                )
            }
            FlowgraphError::TooManyDiagnostics(inner) => inner.fmt(f),
        }
    }
}

impl std::error::Error for FlowgraphError {}

impl From<BudgetExhausted> for FlowgraphError {
    fn from(inner: BudgetExhausted) -> Self {
        FlowgraphError::TooManyDiagnostics(inner)
    }
}

/// Complete flow graph of one function
#[derive(Debug)]
pub struct FlowGraph {
    /// The function node; also the single exit node of the body.
    pub function: NodeId,
    /// The linearized node stream; block ranges index into this.
    pub order: Vec<NodeId>,
    /// Basic blocks, indexed by raw [`BlockId`]. Block 0 is the sentinel.
    pub blocks: Vec<BasicBlock>,
    pub stats: FlowgraphStats,
}

impl FlowGraph {
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    pub fn entry(&self) -> &BasicBlock {
        &self.blocks[BlockId::ENTRY.index()]
    }

    /// Node ids belonging to a block, in stream order.
    pub fn nodes_in(&self, id: BlockId) -> &[NodeId] {
        let block = self.block(id);
        &self.order[block.range()]
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn reachable_blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter().filter(|b| b.reachable)
    }

    /// Depth-first block order over successor edges, starting at block 0.
    pub fn dfs_order(&self) -> Vec<BlockId> {
        let mut visited = vec![false; self.blocks.len()];
        let mut result = Vec::with_capacity(self.blocks.len());
        let mut stack = vec![BlockId::OUTSIDE];
        while let Some(id) = stack.pop() {
            if visited[id.index()] {
                continue;
            }
            visited[id.index()] = true;
            result.push(id);
            for &succ in self.block(id).succs.iter().rev() {
                if !visited[succ.index()] {
                    stack.push(succ);
                }
            }
        }
        result
    }

    /// Breadth-first block order over successor edges, starting at block 0.
    pub fn bfs_order(&self) -> Vec<BlockId> {
        let mut visited = vec![false; self.blocks.len()];
        let mut result = Vec::with_capacity(self.blocks.len());
        let mut queue = std::collections::VecDeque::new();
        visited[BlockId::OUTSIDE.index()] = true;
        queue.push_back(BlockId::OUTSIDE);
        while let Some(id) = queue.pop_front() {
            result.push(id);
            for &succ in &self.block(id).succs {
                if !visited[succ.index()] {
                    visited[succ.index()] = true;
                    queue.push_back(succ);
                }
            }
        }
        result
    }
}

/// Run the whole pipeline for one function body.
///
/// The arena is annotated in place (sequence indices, branch/join marks,
/// block assignment, SSA versions); recoverable problems go through
/// `diagnostics`. See [`FlowgraphError`] for the two abort cases.
pub fn build_flow_graph(
    arena: &mut AstArena,
    function: NodeId,
    diagnostics: &mut DiagnosticEngine,
    options: &BuildOptions,
) -> Result<FlowGraph, FlowgraphError> {
    debug_assert!(matches!(
        arena.node(function).kind,
        NodeKind::Function { .. }
    ));

    let stream = linearize::Linearizer::new(arena, diagnostics, function).run()?;
    let mut blocks = block::build_blocks(arena, &stream);
    let dominator_passes = dominance::compute_dominators(&mut blocks);
    dominance::compute_frontiers(&mut blocks);
    let phi_nodes =
        ssa::SsaBuilder::new(arena, &mut blocks, &stream.order, diagnostics).run()?;

    let stats = FlowgraphStats {
        nodes: stream.order.len(),
        edges: stream.edges.len(),
        blocks: blocks.len(),
        unreachable_blocks: blocks.iter().filter(|b| !b.reachable).count(),
        dominator_passes,
        phi_nodes,
    };
    debug!(
        "flow graph built: {} nodes, {} blocks ({} unreachable), {} phis, {} dominator passes",
        stats.nodes, stats.blocks, stats.unreachable_blocks, stats.phi_nodes, stats.dominator_passes
    );

    let graph = FlowGraph {
        function,
        order: stream.order,
        blocks,
        stats,
    };

    if options.validate {
        if let Err(fault) = validation::validate(&graph) {
            log::error!("flow graph validation failed: {}", fault);
            debug_assert!(false, "flow graph validation failed: {}", fault);
        }
    }

    Ok(graph)
}
