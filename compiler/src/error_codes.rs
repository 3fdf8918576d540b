//! Error Code Registry for the Vesper Compiler
//!
//! Stable diagnostic codes, organized by range:
//!
//! - E0001-E0699: parser, name resolution, and type system (owned by the
//!   excluded front-end crates)
//! - E0700-E0799: control-flow graph and SSA construction (this crate)
//!
//! Warning-class codes use a `W` prefix in the same numeric space.

/// A function body has more nodes than the node stream can index.
pub const FUNCTION_TOO_LARGE: &str = "E0701";

/// `goto` names a label that does not exist, or `break`/`continue` appears
/// outside of any loop or switch. The jump edge is dropped and compilation
/// continues so later passes still see a complete error list.
pub const UNRESOLVED_JUMP_TARGET: &str = "E0702";

/// A variable is read on a path where it is never assigned.
pub const UNINITIALIZED_VARIABLE: &str = "E0703";

/// A variable is read on a path where it is only conditionally assigned.
pub const POSSIBLY_UNINITIALIZED: &str = "W0704";
