//! AST node model
//!
//! Nodes are deliberately coarse: the flow-graph pipeline only distinguishes
//! the control-flow constructs and variable references; every other
//! expression or statement is an opaque [`NodeKind::Expr`] evaluated in
//! child order.

use smallvec::SmallVec;
use source_map::SourceLocation;
use std::fmt;

use super::id_types::{BlockId, NodeId};

/// Where a variable lives, as resolved by the (external) name resolver.
///
/// The derived order is significant: [`VarKey`] sorts by storage class
/// first, then slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StorageClass {
    None,
    Argument,
    ObjectField,
    Local,
    VirtualRegister,
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageClass::None => "none",
            StorageClass::Argument => "arg",
            StorageClass::ObjectField => "field",
            StorageClass::Local => "local",
            StorageClass::VirtualRegister => "vreg",
        };
        write!(f, "{}", name)
    }
}

impl StorageClass {
    /// Whether a definition exists outside the function body: arguments are
    /// bound at the call site and object fields are default-initialized by
    /// the allocator, so a read that resolves all the way up to block 0 is
    /// not an uninitialized use for these classes.
    pub fn defined_on_entry(self) -> bool {
        matches!(self, StorageClass::Argument | StorageClass::ObjectField)
    }
}

/// Abstract identity of a variable, independent of SSA version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarKey {
    pub storage: StorageClass,
    pub slot: u16,
}

impl VarKey {
    pub const fn new(storage: StorageClass, slot: u16) -> Self {
        Self { storage, slot }
    }

    pub const fn local(slot: u16) -> Self {
        Self::new(StorageClass::Local, slot)
    }

    pub const fn argument(slot: u16) -> Self {
        Self::new(StorageClass::Argument, slot)
    }
}

impl fmt::Display for VarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.storage, self.slot)
    }
}

/// SSA version of a variable.
///
/// Real versions count up from 0 per [`VarKey`] and are never reused within
/// a function. Two sentinel values mark definitions the initialization
/// analysis could not prove: [`Version::UNINITIALIZED`] and
/// [`Version::PARTIALLY_INITIALIZED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u32);

impl Version {
    /// No definition reaches this use on any path.
    pub const UNINITIALIZED: Version = Version(u32::MAX);

    /// A definition reaches this use on some paths but not all of them.
    pub const PARTIALLY_INITIALIZED: Version = Version(u32::MAX - 1);

    /// The first real version, also used to heal diagnosed uses.
    pub const ZERO: Version = Version(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u32 {
        self.0
    }

    pub const fn is_real(self) -> bool {
        self.0 < u32::MAX - 1
    }

    pub const fn is_sentinel(self) -> bool {
        !self.is_real()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Version::UNINITIALIZED => write!(f, "uninit"),
            Version::PARTIALLY_INITIALIZED => write!(f, "partial"),
            Version(v) => write!(f, "v{}", v),
        }
    }
}

/// Variable-reference payload of a [`NodeKind::Var`] node.
///
/// A single node may both read and write the same variable (compound
/// assignment); the read always happens before the write, so after SSA
/// renaming `input_version` names the version consumed and `output_version`
/// the version produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarRef {
    pub key: VarKey,
    pub is_read: bool,
    pub is_written: bool,
    pub input_version: Option<Version>,
    pub output_version: Option<Version>,
}

impl VarRef {
    pub fn read(key: VarKey) -> Self {
        Self {
            key,
            is_read: true,
            is_written: false,
            input_version: None,
            output_version: None,
        }
    }

    pub fn write(key: VarKey) -> Self {
        Self {
            key,
            is_read: false,
            is_written: true,
            input_version: None,
            output_version: None,
        }
    }

    pub fn read_write(key: VarKey) -> Self {
        Self {
            key,
            is_read: true,
            is_written: true,
            input_version: None,
            output_version: None,
        }
    }
}

/// Node kinds the flow-graph pipeline distinguishes.
///
/// Child layout conventions (all children evaluated in list order unless a
/// kind says otherwise):
///
/// - `Function`: body statements; the function node itself doubles as the
///   single exit node that `return` jumps to
/// - `If`: `[cond, then]` or `[cond, then, else]`
/// - `While`: `[cond, body]`
/// - `DoWhile`: `[body, cond]`
/// - `For`: `[init, cond, step, body]` (C-style)
/// - `ForEach`: `[iterable, body]`
/// - `Switch`: `[selector, case...]`; `Case` children are its statements
/// - `Return`: `[]` or `[value]`
/// - `LogicalAnd`/`LogicalOr`: `[lhs, rhs]`; `Ternary`: `[cond, then, else]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Function { name: String },
    Block,
    If,
    While,
    DoWhile,
    For,
    ForEach,
    Switch,
    Case { is_default: bool },
    Label { name: String },
    Goto { label: String },
    Break,
    Continue,
    Return,
    LogicalAnd,
    LogicalOr,
    Ternary,
    Var,
    Expr,
}

impl NodeKind {
    /// Goto-class statements: their control-flow edge replaces the implicit
    /// fallthrough that would otherwise leave the node.
    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            NodeKind::Goto { .. } | NodeKind::Break | NodeKind::Continue | NodeKind::Return
        )
    }
}

/// Sequence index value before the node stream builder has run.
pub const SEQ_UNASSIGNED: u32 = u32::MAX;

/// One AST node plus the annotations written by the flow-graph pipeline.
#[derive(Debug, Clone)]
pub struct AstNode {
    pub kind: NodeKind,
    pub children: SmallVec<[NodeId; 4]>,
    pub location: SourceLocation,
    /// Present exactly on `NodeKind::Var` nodes.
    pub var: Option<VarRef>,

    // --- annotations owned by the flow-graph pipeline ---
    /// Index in the linearized node stream.
    pub seq: u32,
    /// Basic block this node was assigned to.
    pub block: BlockId,
    /// Source of at least one recorded control-flow edge.
    pub is_branch: bool,
    /// Target of at least one structural (sequential/conditional) edge.
    pub join_structural: bool,
    /// Target of at least one goto-class edge.
    pub join_goto: bool,
    /// Target of an explicit `goto` whose source comes later in the stream.
    pub backward_goto_target: bool,
}

impl AstNode {
    pub fn new(kind: NodeKind, location: SourceLocation) -> Self {
        Self {
            kind,
            children: SmallVec::new(),
            location,
            var: None,
            seq: SEQ_UNASSIGNED,
            block: BlockId::invalid(),
            is_branch: false,
            join_structural: false,
            join_goto: false,
            backward_goto_target: false,
        }
    }

    pub fn is_join(&self) -> bool {
        self.join_structural || self.join_goto
    }

    /// Clear every pipeline annotation, returning the node to its parsed
    /// state. Makes a rerun of the pipeline deterministic.
    pub fn reset_annotations(&mut self) {
        self.seq = SEQ_UNASSIGNED;
        self.block = BlockId::invalid();
        self.is_branch = false;
        self.join_structural = false;
        self.join_goto = false;
        self.backward_goto_target = false;
        if let Some(var) = &mut self.var {
            var.input_version = None;
            var.output_version = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_key_orders_by_storage_then_slot() {
        let a = VarKey::new(StorageClass::Argument, 9);
        let b = VarKey::local(0);
        let c = VarKey::local(1);
        assert!(a < b);
        assert!(b < c);

        let mut keys = vec![c, a, b];
        keys.sort();
        assert_eq!(keys, vec![a, b, c]);
    }

    #[test]
    fn version_sentinels() {
        assert!(Version::UNINITIALIZED.is_sentinel());
        assert!(Version::PARTIALLY_INITIALIZED.is_sentinel());
        assert!(Version::ZERO.is_real());
        assert!(Version::new(1234).is_real());
        assert_ne!(Version::UNINITIALIZED, Version::PARTIALLY_INITIALIZED);
        assert_eq!(format!("{}", Version::new(3)), "v3");
        assert_eq!(format!("{}", Version::UNINITIALIZED), "uninit");
    }

    #[test]
    fn jump_kinds() {
        assert!(NodeKind::Break.is_jump());
        assert!(NodeKind::Return.is_jump());
        assert!(NodeKind::Goto { label: "l".into() }.is_jump());
        assert!(!NodeKind::While.is_jump());
        assert!(!NodeKind::Expr.is_jump());
    }

    #[test]
    fn reset_clears_annotations() {
        let mut node = AstNode::new(NodeKind::Var, SourceLocation::unknown());
        node.var = Some(VarRef::read(VarKey::local(0)));
        node.seq = 7;
        node.block = BlockId::from_raw(2);
        node.is_branch = true;
        node.join_goto = true;
        node.var.as_mut().unwrap().input_version = Some(Version::ZERO);

        node.reset_annotations();
        assert_eq!(node.seq, SEQ_UNASSIGNED);
        assert!(!node.block.is_valid());
        assert!(!node.is_branch);
        assert!(!node.is_join());
        assert_eq!(node.var.unwrap().input_version, None);
    }
}
