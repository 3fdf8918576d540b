pub mod ast;
pub mod compilation;
pub mod error_codes;
pub mod flowgraph;
pub mod logging;
