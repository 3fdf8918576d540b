//! Compilation unit driver for flow-graph construction
//!
//! Runs the pipeline over every function of a unit, in order and strictly
//! one at a time; nothing is shared between functions except the source map
//! and the diagnostics engine. A function that is too large is discarded
//! with a diagnostic and the unit continues; an exhausted diagnostic budget
//! aborts the whole unit.

use std::fmt;

use log::{debug, warn};

use diagnostics::{BudgetExhausted, Diagnostic, DiagnosticEngine, DEFAULT_DIAGNOSTIC_LIMIT};
use source_map::SourceMap;

use crate::ast::{AstArena, NodeId, NodeKind};
use crate::error_codes;
use crate::flowgraph::{build_flow_graph, BuildOptions, FlowGraph, FlowgraphError};

/// Options for compiling one unit
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    /// Diagnostics accepted before the unit is aborted.
    pub max_diagnostics: usize,
    /// Validate every built flow graph (debug aid).
    pub validate: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_diagnostics: DEFAULT_DIAGNOSTIC_LIMIT,
            validate: cfg!(debug_assertions),
        }
    }
}

/// The whole compilation unit was aborted.
#[derive(Debug, Clone)]
pub enum CompileError {
    TooManyDiagnostics(BudgetExhausted),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::TooManyDiagnostics(inner) => inner.fmt(f),
        }
    }
}

impl std::error::Error for CompileError {}

/// State shared by every function of one compilation unit
#[derive(Debug)]
pub struct Compilation {
    pub source_map: SourceMap,
    pub diagnostics: DiagnosticEngine,
    options: CompileOptions,
}

impl Compilation {
    pub fn new(options: CompileOptions) -> Self {
        Self {
            source_map: SourceMap::new(),
            diagnostics: DiagnosticEngine::new(options.max_diagnostics),
            options,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CompileOptions::default())
    }

    /// Build the flow graph of one function.
    ///
    /// `Ok(None)` means the function was discarded (too large); the unit
    /// goes on. `Err` aborts the unit.
    pub fn build_function(
        &mut self,
        arena: &mut AstArena,
        function: NodeId,
    ) -> Result<Option<FlowGraph>, CompileError> {
        let name = match &arena.node(function).kind {
            NodeKind::Function { name } => name.clone(),
            _ => String::from("<not a function>"),
        };
        debug!("building flow graph for `{}`", name);

        let options = BuildOptions {
            validate: self.options.validate,
        };
        match build_flow_graph(arena, function, &mut self.diagnostics, &options) {
            Ok(graph) => Ok(Some(graph)),
            Err(FlowgraphError::FunctionTooLarge { nodes, location }) => {
                warn!("discarding `{}`: {} nodes", name, nodes);
                let report = self.diagnostics.report(
                    Diagnostic::error(
                        format!("function `{}` is too large to compile", name),
                        location,
                    )
                    .code(error_codes::FUNCTION_TOO_LARGE)
                    .with_note(format!("the body linearizes to {} nodes", nodes))
                    .build(),
                );
                match report {
                    Ok(()) => Ok(None),
                    Err(exhausted) => Err(CompileError::TooManyDiagnostics(exhausted)),
                }
            }
            Err(FlowgraphError::TooManyDiagnostics(exhausted)) => {
                Err(CompileError::TooManyDiagnostics(exhausted))
            }
        }
    }

    /// Build every function of a unit in order.
    ///
    /// Discarded functions leave no entry in the result; callers that need
    /// positional correspondence should use [`Compilation::build_function`].
    pub fn build_unit(
        &mut self,
        arena: &mut AstArena,
        functions: &[NodeId],
    ) -> Result<Vec<FlowGraph>, CompileError> {
        let mut graphs = Vec::with_capacity(functions.len());
        for &function in functions {
            if let Some(graph) = self.build_function(arena, function)? {
                graphs.push(graph);
            }
        }
        debug!(
            "unit done: {} of {} functions built, {} diagnostics",
            graphs.len(),
            functions.len(),
            self.diagnostics.len()
        );
        Ok(graphs)
    }
}
