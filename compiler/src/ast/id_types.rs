//! Core ID types for the AST and flow-graph structures
//!
//! Type-safe, lightweight wrappers around `u32` that prevent mixing up
//! different kinds of identifiers. `u32::MAX` is reserved as the invalid
//! sentinel for every id type.

use std::fmt;

/// Trait for ID types that can be created and validated
pub trait IdType: Copy + Clone + PartialEq + Eq + std::hash::Hash + fmt::Debug {
    /// Create a new ID from a raw u32 value
    fn from_raw(raw: u32) -> Self;

    /// Get the raw u32 value of this ID
    fn as_raw(self) -> u32;

    /// Check if this ID is valid (not the sentinel value)
    fn is_valid(self) -> bool;

    /// Get an invalid/null sentinel value
    fn invalid() -> Self;
}

macro_rules! define_id_type {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Create a new ID from a raw u32 value
            pub const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            /// Get the raw u32 value of this ID
            pub const fn as_raw(self) -> u32 {
                self.0
            }

            /// Check if this ID is valid (not the sentinel value)
            pub const fn is_valid(self) -> bool {
                self.0 != u32::MAX
            }

            /// Get an invalid/null sentinel value
            pub const fn invalid() -> Self {
                Self(u32::MAX)
            }

            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl IdType for $name {
            fn from_raw(raw: u32) -> Self {
                Self::from_raw(raw)
            }

            fn as_raw(self) -> u32 {
                self.as_raw()
            }

            fn is_valid(self) -> bool {
                self.is_valid()
            }

            fn invalid() -> Self {
                Self::invalid()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::invalid()
            }
        }

        impl From<u32> for $name {
            fn from(raw: u32) -> Self {
                Self::from_raw(raw)
            }
        }

        impl From<$name> for u32 {
            fn from(id: $name) -> u32 {
                id.as_raw()
            }
        }
    };
}

define_id_type! {
    /// Unique identifier of an AST node within its arena
    NodeId
}

define_id_type! {
    /// Unique identifier of a basic block within one function's flow graph
    ///
    /// Block ids are dense and start at 0. Block 0 is a synthetic sentinel
    /// representing "outside the function" and the root of the dominator
    /// tree; block 1 is the real entry block.
    BlockId
}

impl BlockId {
    /// The synthetic "outside the function" block and dominator-tree root.
    pub const OUTSIDE: BlockId = BlockId(0);

    /// The function entry block.
    pub const ENTRY: BlockId = BlockId(1);
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "n{}", self.0)
        } else {
            write!(f, "n?")
        }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "b{}", self.0)
        } else {
            write!(f, "b?")
        }
    }
}

/// Convenience aliases for working with ID collections
pub mod collections {
    use fxhash::{FxHashMap, FxHashSet};

    /// Fast hash map for ID keys
    pub type IdMap<K, V> = FxHashMap<K, V>;

    /// Fast hash set for ID values
    pub type IdSet<T> = FxHashSet<T>;

    pub fn new_id_map<K, V>() -> IdMap<K, V> {
        FxHashMap::default()
    }

    pub fn new_id_set<T>() -> IdSet<T> {
        FxHashSet::default()
    }
}
