//! Diagnostics library for rich error reporting
//!
//! Provides Rust-style diagnostics with severity levels, stable error codes,
//! source locations, and a collecting engine with a configurable budget: once
//! the budget is exhausted the engine refuses further diagnostics so that a
//! badly malformed compilation unit cannot produce an unbounded error storm.

use std::fmt;

pub use source_map::{FileId, SourceLocation, SourceMap};

/// Severity level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A single diagnostic message
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Stable code such as `E0703`; `None` for ad-hoc messages
    pub code: Option<&'static str>,
    pub message: String,
    pub location: SourceLocation,
    /// Free-form follow-up notes printed under the main message
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, location: SourceLocation) -> DiagnosticBuilder {
        DiagnosticBuilder::new(Severity::Error, message, location)
    }

    pub fn warning(message: impl Into<String>, location: SourceLocation) -> DiagnosticBuilder {
        DiagnosticBuilder::new(Severity::Warning, message, location)
    }

    pub fn note(message: impl Into<String>, location: SourceLocation) -> DiagnosticBuilder {
        DiagnosticBuilder::new(Severity::Note, message, location)
    }
}

/// Builder for diagnostics
pub struct DiagnosticBuilder {
    diagnostic: Diagnostic,
}

impl DiagnosticBuilder {
    fn new(severity: Severity, message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            diagnostic: Diagnostic {
                severity,
                code: None,
                message: message.into(),
                location,
                notes: Vec::new(),
            },
        }
    }

    pub fn code(mut self, code: &'static str) -> Self {
        self.diagnostic.code = Some(code);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.diagnostic.notes.push(note.into());
        self
    }

    pub fn build(self) -> Diagnostic {
        self.diagnostic
    }
}

/// Returned when the diagnostic budget of an engine is exhausted.
///
/// Signals that the whole compilation unit should stop, not just the
/// function currently being compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetExhausted {
    pub limit: usize,
}

impl fmt::Display for BudgetExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "too many diagnostics, aborting after {} messages",
            self.limit
        )
    }
}

impl std::error::Error for BudgetExhausted {}

/// Collects diagnostics for a compilation unit.
#[derive(Debug, Clone)]
pub struct DiagnosticEngine {
    diagnostics: Vec<Diagnostic>,
    limit: usize,
    errors: usize,
    warnings: usize,
}

/// Default number of diagnostics accepted before the unit is aborted.
pub const DEFAULT_DIAGNOSTIC_LIMIT: usize = 100;

impl DiagnosticEngine {
    pub fn new(limit: usize) -> Self {
        Self {
            diagnostics: Vec::new(),
            limit,
            errors: 0,
            warnings: 0,
        }
    }

    /// Record a diagnostic.
    ///
    /// Counts errors and warnings separately; `Err(BudgetExhausted)` means
    /// the caller must abort the compilation unit.
    pub fn report(&mut self, diagnostic: Diagnostic) -> Result<(), BudgetExhausted> {
        match diagnostic.severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
            Severity::Note => {}
        }
        self.diagnostics.push(diagnostic);
        if self.diagnostics.len() >= self.limit {
            return Err(BudgetExhausted { limit: self.limit });
        }
        Ok(())
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    /// Drain all collected diagnostics, leaving the engine empty but keeping
    /// its budget accounting.
    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

impl Default for DiagnosticEngine {
    fn default() -> Self {
        Self::new(DEFAULT_DIAGNOSTIC_LIMIT)
    }
}

/// Renders diagnostics as terminal text.
pub struct Renderer {
    use_colors: bool,
}

impl Renderer {
    pub fn new() -> Self {
        Self { use_colors: false }
    }

    pub fn with_colors() -> Self {
        Self { use_colors: true }
    }

    pub fn render_all(&self, engine: &DiagnosticEngine, map: &SourceMap) -> String {
        let mut out = String::new();
        for (i, d) in engine.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&self.render(d, map));
        }
        out
    }

    pub fn render(&self, diagnostic: &Diagnostic, map: &SourceMap) -> String {
        let mut out = String::new();

        // Header: severity[code]: message
        if self.use_colors {
            let color = match diagnostic.severity {
                Severity::Error => "\x1b[31m",
                Severity::Warning => "\x1b[33m",
                Severity::Note => "\x1b[36m",
            };
            out.push_str(color);
        }
        out.push_str(&diagnostic.severity.to_string());
        if let Some(code) = diagnostic.code {
            out.push_str(&format!("[{}]", code));
        }
        if self.use_colors {
            out.push_str("\x1b[0m");
        }
        out.push_str(&format!(": {}\n", diagnostic.message));

        // Location plus source line with a caret under the column
        let loc = diagnostic.location;
        if loc.is_known() {
            out.push_str(&format!(
                "  --> {}:{}:{}\n",
                map.name(loc.file),
                loc.line,
                loc.column
            ));
            if let Some(line) = map.file(loc.file).and_then(|f| f.line(loc.line)) {
                let gutter = loc.line.to_string();
                out.push_str(&format!("{} | {}\n", gutter, line));
                let pad = " ".repeat(gutter.len() + 3 + loc.column.saturating_sub(1) as usize);
                if self.use_colors {
                    out.push_str(&format!("{}\x1b[31m^\x1b[0m\n", pad));
                } else {
                    out.push_str(&format!("{}^\n", pad));
                }
            }
        }

        for note in &diagnostic.notes {
            out.push_str(&format!("  note: {}\n", note));
        }

        out
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(map: &SourceMap, file: FileId, line: u32, column: u32) -> SourceLocation {
        let _ = map;
        SourceLocation::new(file, line, column)
    }

    #[test]
    fn builder_sets_all_fields() {
        let d = Diagnostic::error("bad thing", SourceLocation::unknown())
            .code("E0001")
            .with_note("extra context")
            .build();
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.code, Some("E0001"));
        assert_eq!(d.message, "bad thing");
        assert_eq!(d.notes.len(), 1);
    }

    #[test]
    fn engine_counts_by_severity() {
        let mut engine = DiagnosticEngine::new(10);
        engine
            .report(Diagnostic::error("e", SourceLocation::unknown()).build())
            .unwrap();
        engine
            .report(Diagnostic::warning("w", SourceLocation::unknown()).build())
            .unwrap();
        assert!(engine.has_errors());
        assert_eq!(engine.error_count(), 1);
        assert_eq!(engine.warning_count(), 1);
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn engine_budget_exhaustion() {
        let mut engine = DiagnosticEngine::new(2);
        assert!(engine
            .report(Diagnostic::error("one", SourceLocation::unknown()).build())
            .is_ok());
        let err = engine
            .report(Diagnostic::error("two", SourceLocation::unknown()).build())
            .unwrap_err();
        assert_eq!(err.limit, 2);
        // Both diagnostics are still recorded
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn render_includes_source_line() {
        let mut map = SourceMap::new();
        let file = map.add_file("main.vsp", "let x = y;\n");
        let mut engine = DiagnosticEngine::default();
        engine
            .report(
                Diagnostic::error("unknown identifier `y`", loc(&map, file, 1, 9))
                    .code("E0042")
                    .build(),
            )
            .unwrap();

        let text = Renderer::new().render_all(&engine, &map);
        assert!(text.contains("error[E0042]: unknown identifier `y`"));
        assert!(text.contains("--> main.vsp:1:9"));
        assert!(text.contains("let x = y;"));
        assert!(text.contains("^"));
    }
}
