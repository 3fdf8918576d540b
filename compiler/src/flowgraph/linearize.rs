//! Node stream builder and edge collector
//!
//! Walks a function body bottom-up (children fully linearized before their
//! parent), assigns each node a dense sequence index, and records directed
//! control-flow edges between nodes. Edges are tagged either [`EdgeKind::Flow`]
//! (sequential/conditional structure) or [`EdgeKind::Jump`] (goto-class:
//! `goto`, `break`, `continue`, `return`).
//!
//! Edge sources are marked branch nodes; edge targets are marked join
//! points, separately for structural and goto edges. After the walk, a
//! structural join that is not the target of a backward `goto` receives an
//! implicit fallthrough edge from the node just before it in the stream,
//! unless that node already branches somewhere else — a goto-class node
//! never falls through.

use fxhash::FxHashMap;
use log::trace;
use smallvec::SmallVec;

use diagnostics::{Diagnostic, DiagnosticEngine};

use crate::ast::{AstArena, NodeId, NodeKind};
use crate::error_codes;

use super::FlowgraphError;

/// Largest sequence index the node stream can address.
pub const MAX_NODE_INDEX: usize = u16::MAX as usize;

/// Kind of a recorded control-flow edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Implicit structural flow: sequential or conditional
    Flow,
    /// Explicit jump: `goto`, `break`, `continue`, `return`
    Jump,
}

/// A directed control-flow edge between two AST nodes
#[derive(Debug, Clone, Copy)]
pub struct FlowEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
}

/// Output of the linearization walk
#[derive(Debug)]
pub struct NodeStream {
    /// Nodes in sequence order; `order[i]` has sequence index `i`.
    pub order: Vec<NodeId>,
    /// Recorded edges, in the order they were collected.
    pub edges: Vec<FlowEdge>,
}

/// One enclosing loop or switch during the walk
struct Frame {
    /// Node a `break` jumps to (the loop/switch node itself)
    break_target: NodeId,
    /// Switch frames stop `break` but are skipped by `continue`
    is_loop: bool,
    /// `continue` nodes waiting for their target to be linearized
    pending_continues: Vec<NodeId>,
}

pub(crate) struct Linearizer<'a> {
    arena: &'a mut AstArena,
    diagnostics: &'a mut DiagnosticEngine,
    function: NodeId,
    order: Vec<NodeId>,
    edges: Vec<FlowEdge>,
    frames: Vec<Frame>,
    labels: FxHashMap<String, NodeId>,
    /// Indices into `edges` of explicit `goto` edges, for backward marking
    goto_edges: Vec<usize>,
}

impl<'a> Linearizer<'a> {
    pub(crate) fn new(
        arena: &'a mut AstArena,
        diagnostics: &'a mut DiagnosticEngine,
        function: NodeId,
    ) -> Self {
        Self {
            arena,
            diagnostics,
            function,
            order: Vec::new(),
            edges: Vec::new(),
            frames: Vec::new(),
            labels: FxHashMap::default(),
            goto_edges: Vec::new(),
        }
    }

    pub(crate) fn run(mut self) -> Result<NodeStream, FlowgraphError> {
        // A rerun on the same arena must start from a clean slate.
        self.arena.reset_subtree(self.function);

        // Labels can be referenced before they are linearized, so collect
        // them up front.
        let mut labels = FxHashMap::default();
        self.arena.visit_subtree(self.function, &mut |id, node| {
            if let NodeKind::Label { name } = &node.kind {
                labels.insert(name.clone(), id);
            }
        });
        self.labels = labels;

        let body: SmallVec<[NodeId; 4]> = self.arena.node(self.function).children.clone();
        for &stmt in &body {
            self.visit(stmt)?;
        }
        // The function node is linearized last and doubles as the exit node.
        self.emit(self.function)?;
        debug_assert!(self.frames.is_empty());

        self.mark_backward_gotos();
        self.add_fallthrough_edges();

        trace!(
            "linearized {} nodes, {} edges",
            self.order.len(),
            self.edges.len()
        );
        Ok(NodeStream {
            order: self.order,
            edges: self.edges,
        })
    }

    /// Linearize one subtree. Returns the first node of the subtree in
    /// sequence order; the subtree root is always its last node.
    fn visit(&mut self, id: NodeId) -> Result<NodeId, FlowgraphError> {
        let kind = self.arena.node(id).kind.clone();
        let children: SmallVec<[NodeId; 4]> = self.arena.node(id).children.clone();

        match kind {
            NodeKind::If => {
                let cond = children[0];
                let first = self.visit(cond)?;
                let then_first = self.visit(children[1])?;
                let else_first = match children.get(2) {
                    Some(&e) => Some(self.visit(e)?),
                    None => None,
                };
                self.emit(id)?;

                self.add_edge(cond, then_first, EdgeKind::Flow);
                // An absent else branch flows straight to the join.
                self.add_edge(cond, else_first.unwrap_or(id), EdgeKind::Flow);
                // An arm ending in a jump never reaches the join.
                if !self.ends_with_jump(children[1]) {
                    self.add_edge(children[1], id, EdgeKind::Flow);
                }
                if let Some(&e) = children.get(2) {
                    if !self.ends_with_jump(e) {
                        self.add_edge(e, id, EdgeKind::Flow);
                    }
                }
                Ok(first)
            }

            NodeKind::Ternary => {
                let cond = children[0];
                let first = self.visit(cond)?;
                let then_first = self.visit(children[1])?;
                let else_first = self.visit(children[2])?;
                self.emit(id)?;

                self.add_edge(cond, then_first, EdgeKind::Flow);
                self.add_edge(cond, else_first, EdgeKind::Flow);
                if !self.ends_with_jump(children[1]) {
                    self.add_edge(children[1], id, EdgeKind::Flow);
                }
                if !self.ends_with_jump(children[2]) {
                    self.add_edge(children[2], id, EdgeKind::Flow);
                }
                Ok(first)
            }

            NodeKind::LogicalAnd | NodeKind::LogicalOr => {
                // Control flow in disguise: the right operand may be skipped.
                let lhs = children[0];
                let first = self.visit(lhs)?;
                let rhs_first = self.visit(children[1])?;
                self.emit(id)?;

                self.add_edge(lhs, rhs_first, EdgeKind::Flow);
                self.add_edge(lhs, id, EdgeKind::Flow);
                self.add_edge(children[1], id, EdgeKind::Flow);
                Ok(first)
            }

            NodeKind::While => {
                let cond = children[0];
                let body = children[1];
                let first = self.visit(cond)?;
                self.frames.push(Frame {
                    break_target: id,
                    is_loop: true,
                    pending_continues: Vec::new(),
                });
                let body_first = self.visit(body)?;
                let frame = self.frames.pop().unwrap();
                self.emit(id)?;

                self.add_edge(cond, body_first, EdgeKind::Flow);
                self.add_edge(cond, id, EdgeKind::Flow);
                if !self.ends_with_jump(body) {
                    self.add_edge(body, first, EdgeKind::Flow);
                }
                for c in frame.pending_continues {
                    self.add_edge(c, first, EdgeKind::Jump);
                }
                Ok(first)
            }

            NodeKind::DoWhile => {
                let body = children[0];
                let cond = children[1];
                self.frames.push(Frame {
                    break_target: id,
                    is_loop: true,
                    pending_continues: Vec::new(),
                });
                let first = self.visit(body)?;
                let frame = self.frames.pop().unwrap();
                let cond_first = self.visit(cond)?;
                self.emit(id)?;

                if !self.ends_with_jump(body) {
                    self.add_edge(body, cond_first, EdgeKind::Flow);
                }
                self.add_edge(cond, first, EdgeKind::Flow);
                self.add_edge(cond, id, EdgeKind::Flow);
                for c in frame.pending_continues {
                    self.add_edge(c, cond_first, EdgeKind::Jump);
                }
                Ok(first)
            }

            NodeKind::For => {
                // C-style: [init, cond, step, body], laid out init, cond,
                // body, step so the step is the continue target.
                let init = children[0];
                let cond = children[1];
                let step = children[2];
                let body = children[3];
                let first = self.visit(init)?;
                let cond_first = self.visit(cond)?;
                self.frames.push(Frame {
                    break_target: id,
                    is_loop: true,
                    pending_continues: Vec::new(),
                });
                let body_first = self.visit(body)?;
                let frame = self.frames.pop().unwrap();
                let step_first = self.visit(step)?;
                self.emit(id)?;

                self.add_edge(cond, body_first, EdgeKind::Flow);
                self.add_edge(cond, id, EdgeKind::Flow);
                if !self.ends_with_jump(body) {
                    self.add_edge(body, step_first, EdgeKind::Flow);
                }
                self.add_edge(step, cond_first, EdgeKind::Flow);
                for c in frame.pending_continues {
                    self.add_edge(c, step_first, EdgeKind::Jump);
                }
                Ok(first)
            }

            NodeKind::ForEach => {
                let iter = children[0];
                let body = children[1];
                let first = self.visit(iter)?;
                self.frames.push(Frame {
                    break_target: id,
                    is_loop: true,
                    pending_continues: Vec::new(),
                });
                let body_first = self.visit(body)?;
                let frame = self.frames.pop().unwrap();
                self.emit(id)?;

                // The iterator root is the per-iteration advance/check point.
                self.add_edge(iter, body_first, EdgeKind::Flow);
                self.add_edge(iter, id, EdgeKind::Flow);
                if !self.ends_with_jump(body) {
                    self.add_edge(body, iter, EdgeKind::Flow);
                }
                for c in frame.pending_continues {
                    self.add_edge(c, iter, EdgeKind::Jump);
                }
                Ok(first)
            }

            NodeKind::Switch => {
                let selector = children[0];
                let first = self.visit(selector)?;
                self.frames.push(Frame {
                    break_target: id,
                    is_loop: false,
                    pending_continues: Vec::new(),
                });
                let mut case_firsts: SmallVec<[NodeId; 4]> = SmallVec::new();
                for &case in &children[1..] {
                    case_firsts.push(self.visit(case)?);
                }
                let frame = self.frames.pop().unwrap();
                debug_assert!(frame.pending_continues.is_empty());
                self.emit(id)?;

                let mut has_default = false;
                for (i, &case) in children[1..].iter().enumerate() {
                    self.add_edge(selector, case_firsts[i], EdgeKind::Flow);
                    if matches!(
                        self.arena.node(case).kind,
                        NodeKind::Case { is_default: true }
                    ) {
                        has_default = true;
                    }
                    // A case not ended by a jump falls through to the next
                    // case, or to the switch join after the last one.
                    if !self.ends_with_jump(case) {
                        let next = case_firsts.get(i + 1).copied().unwrap_or(id);
                        self.add_edge(case, next, EdgeKind::Flow);
                    }
                }
                if !has_default {
                    self.add_edge(selector, id, EdgeKind::Flow);
                }
                Ok(first)
            }

            NodeKind::Goto { label } => {
                self.emit(id)?;
                match self.labels.get(&label).copied() {
                    Some(target) => {
                        let edge_index = self.edges.len();
                        self.add_edge(id, target, EdgeKind::Jump);
                        self.goto_edges.push(edge_index);
                    }
                    None => {
                        // Dropping the edge keeps the error list complete for
                        // later passes.
                        let location = self.arena.node(id).location;
                        self.report(
                            Diagnostic::error(
                                format!("goto to undefined label `{}`", label),
                                location,
                            )
                            .code(error_codes::UNRESOLVED_JUMP_TARGET)
                            .build(),
                        )?;
                    }
                }
                Ok(id)
            }

            NodeKind::Break => {
                self.emit(id)?;
                let target = self.frames.last().map(|f| f.break_target);
                match target {
                    Some(target) => self.add_edge(id, target, EdgeKind::Jump),
                    None => {
                        let location = self.arena.node(id).location;
                        self.report(
                            Diagnostic::error("break outside of loop or switch", location)
                                .code(error_codes::UNRESOLVED_JUMP_TARGET)
                                .build(),
                        )?;
                    }
                }
                Ok(id)
            }

            NodeKind::Continue => {
                self.emit(id)?;
                let enclosing_loop = self.frames.iter().rposition(|f| f.is_loop);
                match enclosing_loop {
                    Some(index) => self.frames[index].pending_continues.push(id),
                    None => {
                        let location = self.arena.node(id).location;
                        self.report(
                            Diagnostic::error("continue outside of loop", location)
                                .code(error_codes::UNRESOLVED_JUMP_TARGET)
                                .build(),
                        )?;
                    }
                }
                Ok(id)
            }

            NodeKind::Return => {
                let mut first = None;
                for &child in &children {
                    let f = self.visit(child)?;
                    first.get_or_insert(f);
                }
                self.emit(id)?;
                self.add_edge(id, self.function, EdgeKind::Jump);
                Ok(first.unwrap_or(id))
            }

            // Straight-line nodes: children in order, then the node itself.
            NodeKind::Function { .. }
            | NodeKind::Block
            | NodeKind::Case { .. }
            | NodeKind::Label { .. }
            | NodeKind::Var
            | NodeKind::Expr => {
                let mut first = None;
                for &child in &children {
                    let f = self.visit(child)?;
                    first.get_or_insert(f);
                }
                self.emit(id)?;
                Ok(first.unwrap_or(id))
            }
        }
    }

    /// Assign the next sequence index to `id`.
    fn emit(&mut self, id: NodeId) -> Result<(), FlowgraphError> {
        let seq = self.order.len();
        if seq > MAX_NODE_INDEX {
            return Err(FlowgraphError::FunctionTooLarge {
                nodes: seq + 1,
                location: self.arena.node(self.function).location,
            });
        }
        self.arena.node_mut(id).seq = seq as u32;
        self.order.push(id);
        Ok(())
    }

    fn add_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) {
        self.arena.node_mut(from).is_branch = true;
        match kind {
            EdgeKind::Flow => self.arena.node_mut(to).join_structural = true,
            EdgeKind::Jump => self.arena.node_mut(to).join_goto = true,
        }
        self.edges.push(FlowEdge { from, to, kind });
    }

    /// Whether control cannot run off the end of this statement.
    fn ends_with_jump(&self, id: NodeId) -> bool {
        let node = self.arena.node(id);
        if node.kind.is_jump() {
            return true;
        }
        match node.kind {
            NodeKind::Block | NodeKind::Case { .. } => node
                .children
                .last()
                .is_some_and(|&last| self.ends_with_jump(last)),
            _ => false,
        }
    }

    /// Flag targets of `goto` edges whose source comes later in the stream.
    fn mark_backward_gotos(&mut self) {
        for &edge_index in &self.goto_edges {
            let edge = self.edges[edge_index];
            let from_seq = self.arena.node(edge.from).seq;
            let to_seq = self.arena.node(edge.to).seq;
            if from_seq >= to_seq {
                self.arena.node_mut(edge.to).backward_goto_target = true;
            }
        }
    }

    /// Materialize the implicit sequential flow into structural joins.
    ///
    /// A structural join that is not the target of a backward `goto` is
    /// entered from the node just before it, unless that node already
    /// branches elsewhere (which includes every goto-class node). Pure goto
    /// joins get no fallthrough edge.
    fn add_fallthrough_edges(&mut self) {
        for i in 1..self.order.len() {
            let id = self.order[i];
            let node = self.arena.node(id);
            if !node.join_structural || node.backward_goto_target {
                continue;
            }
            let prev = self.order[i - 1];
            if !self.arena.node(prev).is_branch {
                self.add_edge(prev, id, EdgeKind::Flow);
            }
        }
    }

    fn report(&mut self, diagnostic: Diagnostic) -> Result<(), FlowgraphError> {
        self.diagnostics.report(diagnostic)?;
        Ok(())
    }
}
