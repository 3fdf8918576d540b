//! Dominator tree and dominance frontiers
//!
//! Iterative dataflow over the block graph. Blocks with a single predecessor
//! take it as their immediate dominator directly; blocks with several
//! predecessors are recomputed until a full pass changes nothing. Merging two
//! candidate dominators walks one idom chain into a reusable scratch marking
//! table and then walks the other chain until it hits a marked block; the
//! table is cleared between merges.
//!
//! A merge can fail transiently: while other blocks are still settling, a
//! predecessor's idom chain may not reach block 0 yet (an undefined idom or
//! a temporary cycle). That predecessor is simply skipped for the current
//! pass; it contributes once the chain settles.
//!
//! Unreachable blocks are excluded from the iteration but still get the
//! single-predecessor fast path, which can leave mutually-unreachable blocks
//! dominating each other in a cycle. Those chains are detected after the
//! fixpoint and reset, since a cyclic idom relation would make every later
//! tree walk infinite.

use std::collections::VecDeque;

use log::trace;

use crate::ast::BlockId;

use super::block::BasicBlock;

/// Scratch state for the dominator computation, reused across merges.
struct DominatorBuilder<'a> {
    blocks: &'a mut [BasicBlock],
    /// Depth of each block in the current idom tree; kept in step with idom
    /// updates so ancestors always order before descendants.
    level: Vec<u32>,
    /// Ancestor marks for the chain intersection.
    scratch: Vec<bool>,
    /// Blocks marked in `scratch`, for cheap clearing.
    marked: Vec<u32>,
}

/// Compute reachability and immediate dominators for every block.
///
/// Returns the number of full passes the fixpoint needed.
pub(crate) fn compute_dominators(blocks: &mut [BasicBlock]) -> usize {
    let n = blocks.len();
    if n <= 1 {
        if let Some(sentinel) = blocks.first_mut() {
            sentinel.reachable = true;
        }
        return 0;
    }
    debug_assert!(blocks[BlockId::OUTSIDE.index()]
        .succs
        .contains(&BlockId::ENTRY));

    mark_reachable(blocks);

    let mut builder = DominatorBuilder {
        blocks,
        level: vec![0; n],
        scratch: vec![false; n],
        marked: Vec::with_capacity(n),
    };
    builder.fast_path();
    let passes = builder.iterate();
    builder.break_idom_cycles();
    passes
}

/// Walk successor edges from the sentinel and flag every reached block.
fn mark_reachable(blocks: &mut [BasicBlock]) {
    let mut queue = VecDeque::new();
    blocks[BlockId::OUTSIDE.index()].reachable = true;
    queue.push_back(BlockId::OUTSIDE);
    while let Some(b) = queue.pop_front() {
        let mut i = 0;
        while i < blocks[b.index()].succs.len() {
            let succ = blocks[b.index()].succs[i];
            i += 1;
            if !blocks[succ.index()].reachable {
                blocks[succ.index()].reachable = true;
                queue.push_back(succ);
            }
        }
    }
}

impl<'a> DominatorBuilder<'a> {
    /// Blocks with exactly one predecessor take it as idom, no iteration.
    fn fast_path(&mut self) {
        for b in 1..self.blocks.len() {
            if self.blocks[b].preds.len() == 1 {
                let pred = self.blocks[b].preds[0];
                if pred.index() != b {
                    self.set_idom(b, pred);
                }
            }
        }
    }

    /// Recompute multi-predecessor blocks until nothing changes.
    fn iterate(&mut self) -> usize {
        let n = self.blocks.len();
        let mut passes = 0;
        loop {
            passes += 1;
            let mut changed = false;
            for b in 1..n {
                if !self.blocks[b].reachable || self.blocks[b].preds.len() < 2 {
                    continue;
                }
                let preds = self.blocks[b].preds.clone();
                let mut candidate: Option<BlockId> = None;
                for &p in &preds {
                    if !self.blocks[p.index()].reachable || !self.settled(p) {
                        continue;
                    }
                    candidate = Some(match candidate {
                        None => p,
                        // An unresolved merge keeps the current candidate;
                        // the skipped predecessor settles in a later pass.
                        Some(c) => self.common_ancestor(c, p).unwrap_or(c),
                    });
                }
                if let Some(new_idom) = candidate {
                    if new_idom.index() != b && self.blocks[b].idom != new_idom {
                        self.set_idom(b, new_idom);
                        changed = true;
                    }
                }
            }
            trace!("dominator pass {}: changed={}", passes, changed);
            if !changed {
                break;
            }
        }
        passes
    }

    /// Whether a block's idom chain is usable as a merge operand yet.
    ///
    /// Block 0 and the entry block legitimately sit at idom 0; on any other
    /// block, idom 0 means "not computed yet".
    fn settled(&self, b: BlockId) -> bool {
        b == BlockId::OUTSIDE
            || b == BlockId::ENTRY
            || self.blocks[b.index()].idom != BlockId::OUTSIDE
    }

    fn set_idom(&mut self, b: usize, idom: BlockId) {
        self.blocks[b].idom = idom;
        self.level[b] = self.level[idom.index()] + 1;
    }

    /// Nearest common ancestor of `a` and `b` in the current idom tree.
    ///
    /// `None` when either chain cannot reach block 0 yet.
    fn common_ancestor(&mut self, a: BlockId, b: BlockId) -> Option<BlockId> {
        self.clear_marks();

        let mut x = a;
        loop {
            self.mark(x);
            if x == BlockId::OUTSIDE {
                break;
            }
            if x != BlockId::ENTRY && self.blocks[x.index()].idom == BlockId::OUTSIDE {
                return None;
            }
            let next = self.blocks[x.index()].idom;
            if self.is_marked(next) && next != BlockId::OUTSIDE {
                return None;
            }
            x = next;
        }

        let n = self.blocks.len();
        let mut y = b;
        let mut steps = 0;
        loop {
            if self.is_marked(y) {
                return Some(y);
            }
            if y != BlockId::ENTRY && self.blocks[y.index()].idom == BlockId::OUTSIDE {
                return None;
            }
            y = self.blocks[y.index()].idom;
            steps += 1;
            if steps > n {
                return None;
            }
        }
    }

    /// Reset the idoms of cyclic chains left behind among unreachable blocks.
    fn break_idom_cycles(&mut self) {
        let n = self.blocks.len();
        for b in 0..n {
            if self.blocks[b].reachable {
                continue;
            }
            self.clear_marks();
            let mut chain = Vec::new();
            let mut x = BlockId::from_raw(b as u32);
            loop {
                if x == BlockId::OUTSIDE {
                    break;
                }
                if self.is_marked(x) {
                    // Ids repeat, so the whole chain sits on an unreachable
                    // loop; level order can never hold along it.
                    trace!("breaking cyclic idom chain through {}", x);
                    for &c in &chain {
                        self.blocks[c as usize].idom = BlockId::OUTSIDE;
                        self.level[c as usize] = 0;
                    }
                    break;
                }
                self.mark(x);
                chain.push(x.as_raw());
                x = self.blocks[x.index()].idom;
            }
        }
    }

    fn mark(&mut self, b: BlockId) {
        if !self.scratch[b.index()] {
            self.scratch[b.index()] = true;
            self.marked.push(b.as_raw());
        }
    }

    fn is_marked(&self, b: BlockId) -> bool {
        self.scratch[b.index()]
    }

    fn clear_marks(&mut self) {
        for &m in &self.marked {
            self.scratch[m as usize] = false;
        }
        self.marked.clear();
    }
}

/// Compute every block's dominance frontier.
///
/// For each block with two or more predecessors, walk up from every
/// predecessor to (exclusively) the block's immediate dominator, adding the
/// block to the frontier of each block visited. Blocks with fewer than two
/// predecessors contribute nothing, and unreachable blocks are skipped
/// entirely.
pub(crate) fn compute_frontiers(blocks: &mut [BasicBlock]) {
    let n = blocks.len();
    for b in 0..n {
        if !blocks[b].reachable || blocks[b].preds.len() < 2 {
            continue;
        }
        let id = blocks[b].id;
        let idom = blocks[b].idom;
        let preds = blocks[b].preds.clone();
        for &p in &preds {
            if !blocks[p.index()].reachable {
                continue;
            }
            let mut runner = p;
            while runner != idom {
                blocks[runner.index()].frontier.insert(id);
                if runner == BlockId::OUTSIDE {
                    debug_assert!(false, "frontier walk from {} ran past block 0", p);
                    break;
                }
                runner = blocks[runner.index()].idom;
            }
        }
    }
}
