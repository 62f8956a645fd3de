//! Source location tracking for diagnostics.
//!
//! A `Span` is a compact byte range into one file of a `SourceMap`. Every AST
//! and IR node carries one so that errors can point back at the code that
//! produced them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Compact source location reference.
///
/// Points at a byte range in one file of the compilation's [`SourceMap`],
/// with the start line cached so error headers never need a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Index into `SourceMap::files`
    pub file_id: u16,
    /// Byte offset of the first byte
    pub start: u32,
    /// Byte offset one past the last byte
    pub end: u32,
    /// 1-based line number of `start`
    pub start_line: u16,
}

impl Span {
    pub fn new(file_id: u16, start: u32, end: u32, start_line: u16) -> Self {
        Self {
            file_id,
            start,
            end,
            start_line,
        }
    }

    /// A zero-length span at the start of a file, for synthesised nodes.
    pub fn none() -> Self {
        Self::new(0, 0, 0, 1)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Span covering both `self` and `other`.
    ///
    /// # Panics
    /// Panics if the spans come from different files.
    pub fn merge(&self, other: &Span) -> Span {
        assert_eq!(
            self.file_id, other.file_id,
            "cannot merge spans from different files"
        );
        Span {
            file_id: self.file_id,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            start_line: self.start_line.min(other.start_line),
        }
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::none()
    }
}

/// All source files of one compilation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

/// A single source file with a precomputed line index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub source: String,
    /// Byte offsets of each line start; `[0]` is always 0, the last entry
    /// is an EOF sentinel.
    line_starts: Vec<u32>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file and return its id for building spans.
    pub fn add_file(&mut self, path: PathBuf, source: String) -> u16 {
        let file_id = self.files.len();
        assert!(file_id < u16::MAX as usize, "too many source files");
        self.files.push(SourceFile::new(path, source));
        file_id as u16
    }

    pub fn file_path(&self, span: &Span) -> &Path {
        &self.files[span.file_id as usize].path
    }

    /// Source text covered by a span.
    pub fn snippet(&self, span: &Span) -> &str {
        let file = &self.files[span.file_id as usize];
        &file.source[span.start as usize..span.end as usize]
    }

    /// 1-based (line, column) of a span's start.
    pub fn line_col(&self, span: &Span) -> (u32, u32) {
        self.files[span.file_id as usize].line_col(span.start)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

impl SourceFile {
    pub fn new(path: PathBuf, source: String) -> Self {
        let mut line_starts = vec![0u32];
        for (idx, ch) in source.char_indices() {
            if ch == '\n' {
                line_starts.push((idx + 1) as u32);
            }
        }
        if line_starts.last() != Some(&(source.len() as u32)) {
            line_starts.push(source.len() as u32);
        }
        Self {
            path,
            source,
            line_starts,
        }
    }

    /// 1-based (line, column) of a byte offset.
    ///
    /// # Panics
    /// Panics if the offset is past the end of the file.
    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        assert!(
            offset <= self.source.len() as u32,
            "offset {} is beyond EOF (len = {})",
            offset,
            self.source.len()
        );
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx.max(1) - 1,
        };
        ((line_idx + 1) as u32, offset - self.line_starts[line_idx] + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge() {
        let a = Span::new(0, 10, 20, 2);
        let b = Span::new(0, 15, 30, 3);
        let merged = a.merge(&b);
        assert_eq!(merged.start, 10);
        assert_eq!(merged.end, 30);
        assert_eq!(merged.start_line, 2);
    }

    #[test]
    #[should_panic(expected = "cannot merge spans from different files")]
    fn test_span_merge_rejects_cross_file() {
        let a = Span::new(0, 0, 1, 1);
        let b = Span::new(1, 0, 1, 1);
        let _ = a.merge(&b);
    }

    #[test]
    fn test_line_col_lookup() {
        let mut map = SourceMap::new();
        let id = map.add_file(
            PathBuf::from("osc.sdsp"),
            "processor Osc\n{\n}\n".to_string(),
        );
        assert_eq!(map.line_col(&Span::new(id, 0, 9, 1)), (1, 1));
        assert_eq!(map.line_col(&Span::new(id, 14, 15, 2)), (2, 1));
        assert_eq!(map.snippet(&Span::new(id, 0, 9, 1)), "processor");
    }
}
