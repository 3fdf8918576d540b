//! Arena-based AST for function bodies
//!
//! The parser (a separate crate) produces one [`AstArena`] per module and
//! hands the flow-graph pipeline the root node of each function body. Nodes
//! are addressed by [`NodeId`] into the arena; each node stores an ordered
//! list of child ids, so the tree carries no pointers and the whole arena is
//! dropped at once when the module is fully lowered.
//!
//! The pipeline writes its annotations (sequence index, branch/join marks,
//! owning basic block, SSA versions) directly onto the nodes.

pub mod arena;
pub mod id_types;
pub mod node;

pub use arena::AstArena;
pub use id_types::{collections, BlockId, IdType, NodeId};
pub use node::{AstNode, NodeKind, StorageClass, VarKey, VarRef, Version};

pub use source_map::SourceLocation;
