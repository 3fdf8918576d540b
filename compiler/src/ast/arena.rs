//! Arena storage for AST nodes
//!
//! Nodes never move once allocated; the arena owns every function body of a
//! module and is dropped whole when the module is fully lowered.

use smallvec::SmallVec;
use source_map::SourceLocation;

use super::id_types::NodeId;
use super::node::{AstNode, NodeKind, VarKey, VarRef};

#[derive(Debug, Default)]
pub struct AstArena {
    nodes: Vec<AstNode>,
}

impl AstArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
        }
    }

    /// Allocate a leaf node.
    pub fn alloc(&mut self, kind: NodeKind, location: SourceLocation) -> NodeId {
        let id = NodeId::from_raw(self.nodes.len() as u32);
        self.nodes.push(AstNode::new(kind, location));
        id
    }

    /// Allocate a node with ordered children.
    pub fn alloc_with_children(
        &mut self,
        kind: NodeKind,
        location: SourceLocation,
        children: &[NodeId],
    ) -> NodeId {
        let id = self.alloc(kind, location);
        self.nodes[id.index()].children = SmallVec::from_slice(children);
        id
    }

    /// Allocate a variable-reference node carrying its resolved storage.
    pub fn alloc_var(&mut self, var: VarRef, location: SourceLocation) -> NodeId {
        let id = self.alloc(NodeKind::Var, location);
        self.nodes[id.index()].var = Some(var);
        id
    }

    pub fn var_read(&mut self, key: VarKey, location: SourceLocation) -> NodeId {
        self.alloc_var(VarRef::read(key), location)
    }

    pub fn var_write(&mut self, key: VarKey, location: SourceLocation) -> NodeId {
        self.alloc_var(VarRef::write(key), location)
    }

    pub fn node(&self, id: NodeId) -> &AstNode {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut AstNode {
        &mut self.nodes[id.index()]
    }

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.index()].children.push(child);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Walk a subtree depth-first, parents before children.
    pub fn visit_subtree(&self, root: NodeId, visit: &mut impl FnMut(NodeId, &AstNode)) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            visit(id, node);
            for &child in node.children.iter().rev() {
                stack.push(child);
            }
        }
    }

    /// Clear the pipeline annotations of every node under `root`.
    pub fn reset_subtree(&mut self, root: NodeId) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.node_mut(id);
            node.reset_annotations();
            stack.extend(node.children.iter().copied());
        }
    }
}
