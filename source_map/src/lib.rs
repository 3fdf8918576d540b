//! Source file tracking for multi-file compilation
//!
//! Keeps the text of every file in a compilation unit together with the
//! precomputed line table needed to turn byte offsets into line/column pairs.
//! Diagnostics carry a [`SourceLocation`] (file, line, column); the
//! [`SourceMap`] is only consulted when a diagnostic is rendered and the
//! offending source line has to be shown.

use std::fmt;

/// Identifier of a file registered in a [`SourceMap`].
///
/// Dense index into the map's file table. `FileId::UNKNOWN` marks locations
/// that have no backing file (synthetic nodes, tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(u32);

impl FileId {
    pub const UNKNOWN: FileId = FileId(u32::MAX);

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u32 {
        self.0
    }

    pub const fn is_known(self) -> bool {
        self.0 != u32::MAX
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "file#{}", self.0)
        } else {
            write!(f, "file#?")
        }
    }
}

/// A resolved position in source code: file plus 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceLocation {
    pub file: FileId,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub const fn new(file: FileId, line: u32, column: u32) -> Self {
        Self { file, line, column }
    }

    /// Location for nodes that were not produced from source text.
    pub const fn unknown() -> Self {
        Self {
            file: FileId::UNKNOWN,
            line: 0,
            column: 0,
        }
    }

    pub const fn is_known(self) -> bool {
        self.file.is_known()
    }
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self::unknown()
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "{}:{}:{}", self.file, self.line, self.column)
        } else {
            write!(f, "<unknown>")
        }
    }
}

/// One registered source file: name, full text, and its line table.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
    line_starts: Vec<u32>,
}

impl SourceFile {
    fn new(name: String, text: String) -> Self {
        let mut line_starts = vec![0u32];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        Self {
            name,
            text,
            line_starts,
        }
    }

    /// Number of lines in the file (a trailing newline does not open a line).
    pub fn line_count(&self) -> usize {
        if self
            .line_starts
            .last()
            .is_some_and(|&s| s as usize == self.text.len() && !self.text.is_empty())
        {
            self.line_starts.len() - 1
        } else {
            self.line_starts.len()
        }
    }

    /// Text of a 1-based line, without the trailing newline.
    pub fn line(&self, line: u32) -> Option<&str> {
        if line == 0 {
            return None;
        }
        let idx = line as usize - 1;
        let start = *self.line_starts.get(idx)? as usize;
        if start >= self.text.len() {
            return None;
        }
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|&e| e as usize)
            .unwrap_or(self.text.len());
        Some(self.text[start..end].trim_end_matches(['\n', '\r']))
    }

    /// Resolve a byte offset to a 1-based (line, column) pair.
    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        let idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let line_start = self.line_starts[idx];
        (idx as u32 + 1, offset - line_start + 1)
    }
}

/// All source files of one compilation unit.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file and return its id.
    pub fn add_file(&mut self, name: impl Into<String>, text: impl Into<String>) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(SourceFile::new(name.into(), text.into()));
        id
    }

    pub fn file(&self, id: FileId) -> Option<&SourceFile> {
        if id.is_known() {
            self.files.get(id.0 as usize)
        } else {
            None
        }
    }

    /// Name of a file, or a placeholder when the id is unknown.
    pub fn name(&self, id: FileId) -> &str {
        self.file(id).map(|f| f.name.as_str()).unwrap_or("<unknown>")
    }

    /// Resolve (file, offset) to a full location.
    pub fn location(&self, id: FileId, offset: u32) -> SourceLocation {
        match self.file(id) {
            Some(f) => {
                let (line, column) = f.line_col(offset);
                SourceLocation::new(id, line, column)
            }
            None => SourceLocation::unknown(),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileId, &SourceFile)> {
        self.files
            .iter()
            .enumerate()
            .map(|(i, f)| (FileId(i as u32), f))
    }
}
