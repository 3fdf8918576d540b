//! SSA construction: phi placement, version renaming, and the
//! uninitialized-variable analysis
//!
//! Runs in ordered stages over the finished block graph:
//!
//! 1. collect each block's read/written variable sets
//! 2. place phi nodes at dominance frontiers of every definition, iterating
//!    over definitions that phi nodes themselves introduce
//! 3. hand out version numbers in program order (a block's phi first, then
//!    its writes; `outputs` keeps the last definition)
//! 4. resolve each phi's incoming definitions, then propagate partial
//!    initialization from block 0, then resolve every ordinary read
//!
//! Reads that resolve to the `UNINITIALIZED` sentinel are a hard error,
//! reads of `PARTIALLY_INITIALIZED` a warning; both are healed by writing
//! version 0 into the enclosing block's outputs so the same path is not
//! diagnosed again.

use std::collections::{BTreeSet, VecDeque};

use log::trace;

use diagnostics::{Diagnostic, DiagnosticEngine};

use crate::ast::collections::{new_id_map, IdMap};
use crate::ast::{AstArena, BlockId, NodeId, VarKey, Version};
use crate::error_codes;

use super::block::{BasicBlock, PhiNode, PhiSource};
use super::FlowgraphError;

pub(crate) struct SsaBuilder<'a> {
    arena: &'a mut AstArena,
    blocks: &'a mut [BasicBlock],
    order: &'a [NodeId],
    diagnostics: &'a mut DiagnosticEngine,
    /// Next unissued version per variable; versions are never reused.
    next_version: IdMap<VarKey, u32>,
    /// Variables whose phi resolution surfaced a sentinel version.
    check_list: BTreeSet<VarKey>,
    phi_count: usize,
}

impl<'a> SsaBuilder<'a> {
    pub(crate) fn new(
        arena: &'a mut AstArena,
        blocks: &'a mut [BasicBlock],
        order: &'a [NodeId],
        diagnostics: &'a mut DiagnosticEngine,
    ) -> Self {
        Self {
            arena,
            blocks,
            order,
            diagnostics,
            next_version: new_id_map(),
            check_list: BTreeSet::new(),
            phi_count: 0,
        }
    }

    /// Run all stages. Returns the number of phi nodes placed.
    pub(crate) fn run(mut self) -> Result<usize, FlowgraphError> {
        self.collect_block_vars();
        self.place_phis();
        self.assign_versions();
        self.resolve_phi_incomings();
        self.propagate_partial_init();
        self.resolve_reads()?;
        Ok(self.phi_count)
    }

    fn fresh(&mut self, key: VarKey) -> Version {
        let counter = self.next_version.entry(key).or_insert(0);
        let version = Version::new(*counter);
        *counter += 1;
        version
    }

    /// Stage 1: per-block input/output variable sets, no cross-block flow.
    fn collect_block_vars(&mut self) {
        for b in 1..self.blocks.len() {
            if !self.blocks[b].reachable {
                continue;
            }
            for i in self.blocks[b].range() {
                let Some(var) = self.arena.node(self.order[i]).var else {
                    continue;
                };
                if var.is_read {
                    self.blocks[b].inputs.insert(var.key);
                }
                if var.is_written {
                    self.blocks[b]
                        .outputs
                        .insert(var.key, Version::UNINITIALIZED);
                }
            }
        }
    }

    /// Stage 2: place a phi for every variable at the dominance frontier of
    /// each of its definitions, treating freshly placed phis as definitions
    /// in turn until no frontier block is missing one.
    fn place_phis(&mut self) {
        let mut keys: BTreeSet<VarKey> = BTreeSet::new();
        for block in self.blocks.iter().filter(|b| b.reachable) {
            keys.extend(block.outputs.keys().copied());
        }

        for key in keys {
            let mut worklist: Vec<usize> = (1..self.blocks.len())
                .filter(|&b| self.blocks[b].reachable && self.blocks[b].outputs.contains_key(&key))
                .collect();
            let mut placed: BTreeSet<BlockId> = BTreeSet::new();
            while let Some(def_block) = worklist.pop() {
                let frontier: Vec<BlockId> =
                    self.blocks[def_block].frontier.iter().copied().collect();
                for f in frontier {
                    if !placed.insert(f) || self.blocks[f.index()].phis.contains_key(&key) {
                        continue;
                    }
                    self.blocks[f.index()].phis.insert(
                        key,
                        PhiNode {
                            key,
                            version: Version::UNINITIALIZED,
                            incoming: Vec::new(),
                        },
                    );
                    self.phi_count += 1;
                    trace!("phi for {} at {}", key, f);
                    if !self.blocks[f.index()].outputs.contains_key(&key) {
                        worklist.push(f.index());
                    }
                }
            }
        }
    }

    /// Stage 3: program-order version numbering. A block's phi defines
    /// before its first write; `outputs` ends up holding the version of the
    /// last definition.
    fn assign_versions(&mut self) {
        for b in 1..self.blocks.len() {
            if !self.blocks[b].reachable {
                continue;
            }
            let phi_keys: Vec<VarKey> = self.blocks[b].phis.keys().copied().collect();
            for key in phi_keys {
                let version = self.fresh(key);
                self.blocks[b].phis.get_mut(&key).unwrap().version = version;
                self.blocks[b].outputs.insert(key, version);
            }
            for i in self.blocks[b].range() {
                let node_id = self.order[i];
                let Some(var) = self.arena.node(node_id).var else {
                    continue;
                };
                if var.is_written {
                    let version = self.fresh(var.key);
                    self.arena
                        .node_mut(node_id)
                        .var
                        .as_mut()
                        .unwrap()
                        .output_version = Some(version);
                    self.blocks[b].outputs.insert(var.key, version);
                }
            }
        }
    }

    /// Nearest definition of `key` at or above `start` on the idom chain,
    /// stopping before `stop`. `None` when `stop` (or the root, walking past
    /// an undefined idom chain) is reached first.
    fn find_def_between(
        &self,
        start: BlockId,
        stop: BlockId,
        key: VarKey,
    ) -> Option<(BlockId, Version)> {
        let mut x = start;
        loop {
            if x == stop {
                return None;
            }
            let block = &self.blocks[x.index()];
            if let Some(&version) = block.outputs.get(&key) {
                return Some((x, version));
            }
            if let Some(phi) = block.phis.get(&key) {
                return Some((x, phi.version));
            }
            if x == BlockId::OUTSIDE {
                return None;
            }
            x = block.idom;
        }
    }

    /// Nearest definition of `key` at or above `start`; when none exists
    /// anywhere, synthesize one in block 0. Variables defined outside the
    /// function body (arguments, object fields) get a real version there;
    /// everything else gets the `UNINITIALIZED` sentinel.
    fn find_def_or_synthesize(&mut self, start: BlockId, key: VarKey) -> (BlockId, Version) {
        let mut x = start;
        loop {
            if let Some(&version) = self.blocks[x.index()].outputs.get(&key) {
                return (x, version);
            }
            if let Some(version) = self.blocks[x.index()].phis.get(&key).map(|p| p.version) {
                return (x, version);
            }
            if x == BlockId::OUTSIDE {
                let version = if key.storage.defined_on_entry() {
                    self.fresh(key)
                } else {
                    Version::UNINITIALIZED
                };
                self.blocks[BlockId::OUTSIDE.index()]
                    .outputs
                    .insert(key, version);
                return (BlockId::OUTSIDE, version);
            }
            x = self.blocks[x.index()].idom;
        }
    }

    /// Stage 4a: resolve each phi's incoming definitions.
    ///
    /// Per predecessor, search upward to (exclusively) the phi block's own
    /// idom; duplicate reaching definitions collapse into one entry. When
    /// the entries do not cover every predecessor, one more entry sourced at
    /// or above the idom covers the remaining paths.
    fn resolve_phi_incomings(&mut self) {
        for b in 1..self.blocks.len() {
            if !self.blocks[b].reachable {
                continue;
            }
            let phi_keys: Vec<VarKey> = self.blocks[b].phis.keys().copied().collect();
            let stop = self.blocks[b].idom;
            for key in phi_keys {
                let preds = self.blocks[b].preds.clone();
                let mut incoming: Vec<PhiSource> = Vec::new();
                for &p in &preds {
                    if p != BlockId::OUTSIDE && !self.blocks[p.index()].reachable {
                        continue;
                    }
                    if let Some((block, version)) = self.find_def_between(p, stop, key) {
                        if !incoming.iter().any(|s| s.block == block) {
                            incoming.push(PhiSource { block, version });
                        }
                    }
                }
                if incoming.len() < preds.len() {
                    let (block, version) = self.find_def_or_synthesize(stop, key);
                    if !incoming.iter().any(|s| s.block == block) {
                        incoming.push(PhiSource { block, version });
                    }
                }
                debug_assert!(!incoming.is_empty());
                if incoming.iter().any(|s| s.version.is_sentinel()) {
                    self.check_list.insert(key);
                }
                self.blocks[b].phis.get_mut(&key).unwrap().incoming = incoming;
            }
        }
    }

    /// Stage 4b: walk forward from block 0 along paths that never define a
    /// checked variable; every phi met on the way defines the variable only
    /// partially and is downgraded to the sentinel.
    fn propagate_partial_init(&mut self) {
        let check_list: Vec<VarKey> = self.check_list.iter().copied().collect();
        for key in check_list {
            let mut visited = vec![false; self.blocks.len()];
            let mut queue = VecDeque::new();
            visited[BlockId::OUTSIDE.index()] = true;
            queue.push_back(BlockId::OUTSIDE);
            while let Some(b) = queue.pop_front() {
                let succs = self.blocks[b.index()].succs.clone();
                for s in succs {
                    let block = &mut self.blocks[s.index()];
                    if let Some(phi) = block.phis.get_mut(&key) {
                        let old = phi.version;
                        phi.version = Version::PARTIALLY_INITIALIZED;
                        if block.outputs.get(&key) == Some(&old) {
                            block.outputs.insert(key, Version::PARTIALLY_INITIALIZED);
                        }
                        trace!("phi for {} at {} is partially initialized", key, s);
                    }
                    // Paths that never redefine the variable keep carrying
                    // the uncertainty forward.
                    if !self.blocks[s.index()].outputs.contains_key(&key)
                        && !visited[s.index()]
                    {
                        visited[s.index()] = true;
                        queue.push_back(s);
                    }
                }
            }
        }
    }

    /// Version visible at the entry of `b` for `key`.
    fn entry_version(&mut self, b: usize, key: VarKey) -> Version {
        if let Some(phi) = self.blocks[b].phis.get(&key) {
            return phi.version;
        }
        let idom = self.blocks[b].idom;
        self.find_def_or_synthesize(idom, key).1
    }

    /// Stage 5: resolve every ordinary read, diagnosing and healing sentinel
    /// versions. Reads happen before writes on the same node, so a compound
    /// assignment consumes the previous version and produces a new one.
    fn resolve_reads(&mut self) -> Result<(), FlowgraphError> {
        for b in 1..self.blocks.len() {
            if !self.blocks[b].reachable {
                continue;
            }
            let mut current: IdMap<VarKey, Version> = new_id_map();
            for i in self.blocks[b].range() {
                let node_id = self.order[i];
                let Some(var) = self.arena.node(node_id).var else {
                    continue;
                };
                let key = var.key;
                if var.is_read {
                    let version = match current.get(&key).copied() {
                        Some(v) => v,
                        None => {
                            let v = self.entry_version(b, key);
                            current.insert(key, v);
                            v
                        }
                    };
                    self.arena
                        .node_mut(node_id)
                        .var
                        .as_mut()
                        .unwrap()
                        .input_version = Some(version);
                    if version == Version::UNINITIALIZED {
                        let location = self.arena.node(node_id).location;
                        self.report(
                            Diagnostic::error(
                                format!("uninitialized variable `{}` used", key),
                                location,
                            )
                            .code(error_codes::UNINITIALIZED_VARIABLE)
                            .build(),
                        )?;
                        self.heal(b, key, &mut current);
                    } else if version == Version::PARTIALLY_INITIALIZED {
                        let location = self.arena.node(node_id).location;
                        self.report(
                            Diagnostic::warning(
                                format!("possibly uninitialized variable `{}` used", key),
                                location,
                            )
                            .code(error_codes::POSSIBLY_UNINITIALIZED)
                            .build(),
                        )?;
                        self.heal(b, key, &mut current);
                    }
                }
                if var.is_written {
                    debug_assert!(var.output_version.is_some());
                    if let Some(version) = var.output_version {
                        current.insert(key, version);
                    }
                }
            }
        }
        Ok(())
    }

    /// Pretend the variable holds version 0 from here on, so the same path
    /// is not diagnosed again by this or any later pass. A real later
    /// definition in the block keeps its place in `outputs`.
    fn heal(&mut self, b: usize, key: VarKey, current: &mut IdMap<VarKey, Version>) {
        current.insert(key, Version::ZERO);
        match self.blocks[b].outputs.get(&key) {
            Some(v) if v.is_real() => {}
            _ => {
                self.blocks[b].outputs.insert(key, Version::ZERO);
            }
        }
    }

    fn report(&mut self, diagnostic: Diagnostic) -> Result<(), FlowgraphError> {
        self.diagnostics.report(diagnostic)?;
        Ok(())
    }
}

/// Uninitialized analysis helpers shared by tests
#[cfg(test)]
pub(crate) fn non_sentinel_versions(blocks: &[BasicBlock], arena: &AstArena, order: &[NodeId]) -> Vec<(VarKey, Version)> {
    let mut versions = Vec::new();
    for block in blocks {
        for phi in block.phis.values() {
            if phi.version.is_real() {
                versions.push((phi.key, phi.version));
            }
        }
    }
    for &node_id in order {
        if let Some(var) = arena.node(node_id).var {
            if let Some(v) = var.output_version {
                if v.is_real() {
                    versions.push((var.key, v));
                }
            }
        }
    }
    versions
}

#[cfg(test)]
mod tests {
    use crate::ast::StorageClass;

    #[test]
    fn storage_classes_defined_on_entry() {
        assert!(StorageClass::Argument.defined_on_entry());
        assert!(StorageClass::ObjectField.defined_on_entry());
        assert!(!StorageClass::Local.defined_on_entry());
        assert!(!StorageClass::VirtualRegister.defined_on_entry());
        assert!(!StorageClass::None.defined_on_entry());
    }
}
