//! Basic blocks and the block builder
//!
//! Partitions the linearized node stream into basic blocks and resolves the
//! recorded node-level edges into block-level predecessor/successor lists.
//! A block boundary opens immediately before every join node and immediately
//! after every branch node; the node ranges of all blocks partition the
//! stream with no gaps or overlaps.
//!
//! Edge endpoints are never deduplicated: a block may list the same
//! successor twice when two distinct edges target it. The dominance and
//! frontier algorithms tolerate the duplicates.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Range;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::ast::{AstArena, BlockId, VarKey, Version};

use super::linearize::NodeStream;

/// A pseudo-definition at a control-flow merge point.
///
/// Selects among the versions of one variable arriving from the block's
/// predecessors. `incoming` holds one entry per distinct reaching
/// definition — not necessarily one per predecessor: predecessors that share
/// a definition share an entry, and paths that bypass every predecessor-local
/// definition are covered by a single entry sourced above the block's idom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhiNode {
    pub key: VarKey,
    /// The version this phi defines.
    pub version: Version,
    pub incoming: Vec<PhiSource>,
}

/// One incoming definition of a phi node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhiSource {
    pub block: BlockId,
    pub version: Version,
}

impl fmt::Display for PhiSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block, self.version)
    }
}

/// A maximal straight-line run of nodes with one entry and one exit
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    /// First sequence index of this block's node range.
    pub begin: u32,
    /// Number of nodes in the range; 0 only for the block-0 sentinel.
    pub len: u32,
    /// Immediate dominator. [`BlockId::OUTSIDE`] doubles as "none": block 0
    /// is the dominator-tree root and unreachable blocks stay at 0.
    pub idom: BlockId,
    /// Reachable from the entry block along successor edges.
    pub reachable: bool,
    pub preds: SmallVec<[BlockId; 4]>,
    pub succs: SmallVec<[BlockId; 4]>,
    /// Dominance frontier: blocks where this block's definitions stop being
    /// guaranteed to dominate.
    pub frontier: BTreeSet<BlockId>,
    /// Phi nodes at this block's entry, in placement order.
    pub phis: IndexMap<VarKey, PhiNode>,
    /// Variables this block reads, ignoring cross-block flow.
    pub inputs: BTreeSet<VarKey>,
    /// Variables this block writes, each with the version of the last
    /// definition in program order (after SSA renaming).
    pub outputs: BTreeMap<VarKey, Version>,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            begin: 0,
            len: 0,
            idom: BlockId::OUTSIDE,
            reachable: false,
            preds: SmallVec::new(),
            succs: SmallVec::new(),
            frontier: BTreeSet::new(),
            phis: IndexMap::new(),
            inputs: BTreeSet::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// The node-stream range `[begin, begin + len)`.
    pub fn range(&self) -> Range<usize> {
        self.begin as usize..(self.begin + self.len) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn phi(&self, key: VarKey) -> Option<&PhiNode> {
        self.phis.get(&key)
    }
}

/// Partition the node stream into basic blocks and resolve edges.
pub(crate) fn build_blocks(arena: &mut AstArena, stream: &NodeStream) -> Vec<BasicBlock> {
    let mut blocks = vec![BasicBlock::new(BlockId::OUTSIDE)];
    let n = stream.order.len();

    let mut begin = 0usize;
    for i in 0..n {
        let node = arena.node(stream.order[i]);
        // A join starts a new block; a zero-length run is merged into the
        // previous block instead of materializing.
        if node.is_join() && i > begin {
            close_block(&mut blocks, arena, stream, begin, i);
            begin = i;
        }
        if arena.node(stream.order[i]).is_branch {
            close_block(&mut blocks, arena, stream, begin, i + 1);
            begin = i + 1;
        }
    }
    if begin < n {
        close_block(&mut blocks, arena, stream, begin, n);
    }

    // The sentinel always flows into the entry block.
    if blocks.len() > 1 {
        blocks[BlockId::OUTSIDE.index()].succs.push(BlockId::ENTRY);
        blocks[BlockId::ENTRY.index()].preds.push(BlockId::OUTSIDE);
    }

    for edge in &stream.edges {
        let from = arena.node(edge.from).block;
        let to = arena.node(edge.to).block;
        debug_assert!(from.is_valid() && to.is_valid());
        blocks[from.index()].succs.push(to);
        blocks[to.index()].preds.push(from);
    }

    blocks
}

fn close_block(
    blocks: &mut Vec<BasicBlock>,
    arena: &mut AstArena,
    stream: &NodeStream,
    begin: usize,
    end: usize,
) {
    debug_assert!(begin < end);
    let id = BlockId::from_raw(blocks.len() as u32);
    let mut block = BasicBlock::new(id);
    block.begin = begin as u32;
    block.len = (end - begin) as u32;
    for &node_id in &stream.order[begin..end] {
        arena.node_mut(node_id).block = id;
    }
    blocks.push(block);
}
