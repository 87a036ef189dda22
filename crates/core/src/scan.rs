//! Source buffer handles and spans
//!
//! A [`Scan`] owns the text of one source unit together with the path it was
//! read from and the id of the language driver that claimed it. Scans are
//! immutable once constructed and shared as [`ScanRef`] (`Arc<Scan>`) so that
//! every tree node can carry a cheap back-reference to its origin.
//!
//! A [`Span`] is a half-open region of a scan measured in lines and columns:
//! lines are 1-based, columns are 0-based and count bytes in the source
//! buffer.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// Shared handle to a source buffer
pub type ScanRef = Arc<Scan>;

/// An immutable source buffer with its origin metadata
pub struct Scan {
    path: PathBuf,
    language: String,
    text: String,
}

impl Scan {
    /// Create a scan for a source buffer owned by the given language driver
    pub fn new(language: impl Into<String>, path: impl Into<PathBuf>, text: impl Into<String>) -> ScanRef {
        Arc::new(Scan {
            path: path.into(),
            language: language.into(),
            text: text.into(),
        })
    }

    /// The process-wide scan backing synthesized nodes (builtins, injected
    /// declarations). Always empty.
    pub fn builtin() -> ScanRef {
        static BUILTIN: OnceLock<ScanRef> = OnceLock::new();
        BUILTIN
            .get_or_init(|| Scan::new("cthulhu", "<builtin>", ""))
            .clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The id of the language driver that produced this scan
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Byte length of the source buffer
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Byte slice for 1-based line `n`, without the trailing newline.
    /// Returns `None` when the buffer has fewer lines.
    pub fn line(&self, n: u32) -> Option<&str> {
        if n == 0 {
            return None;
        }
        self.text.lines().nth((n - 1) as usize)
    }
}

impl fmt::Debug for Scan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scan")
            .field("path", &self.path)
            .field("language", &self.language)
            .field("len", &self.text.len())
            .finish()
    }
}

/// A region of a scan, for diagnostics
///
/// Lines are 1-based; columns are 0-based byte offsets into the line.
#[derive(Clone)]
pub struct Span {
    pub scan: ScanRef,
    pub first_line: u32,
    pub first_column: u32,
    pub last_line: u32,
    pub last_column: u32,
}

impl Span {
    pub fn new(scan: ScanRef, first_line: u32, first_column: u32, last_line: u32, last_column: u32) -> Self {
        Span {
            scan,
            first_line,
            first_column,
            last_line,
            last_column,
        }
    }

    /// A zero-width span at a single position
    pub fn point(scan: ScanRef, line: u32, column: u32) -> Self {
        Span::new(scan, line, column, line, column)
    }

    /// The span used for synthesized nodes with no source position
    pub fn builtin() -> Self {
        Span::point(Scan::builtin(), 1, 0)
    }

    /// Smallest span covering both `self` and `other`. Both must point into
    /// the same scan; `other` from a different scan is ignored.
    pub fn cover(&self, other: &Span) -> Span {
        if !Arc::ptr_eq(&self.scan, &other.scan) {
            return self.clone();
        }
        let (first_line, first_column) = if (other.first_line, other.first_column) < (self.first_line, self.first_column)
        {
            (other.first_line, other.first_column)
        } else {
            (self.first_line, self.first_column)
        };
        let (last_line, last_column) = if (other.last_line, other.last_column) > (self.last_line, self.last_column) {
            (other.last_line, other.last_column)
        } else {
            (self.last_line, self.last_column)
        };
        Span::new(self.scan.clone(), first_line, first_column, last_line, last_column)
    }
}

impl PartialEq for Span {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.scan, &other.scan)
            && self.first_line == other.first_line
            && self.first_column == other.first_column
            && self.last_line == other.last_line
            && self.last_column == other.last_column
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.scan.path().display(),
            self.first_line,
            self.first_column
        )
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.scan.path().display(),
            self.first_line,
            self.first_column
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_slices() {
        let scan = Scan::new("example", "test.e", "first\nsecond\nthird");
        assert_eq!(scan.line(1), Some("first"));
        assert_eq!(scan.line(2), Some("second"));
        assert_eq!(scan.line(3), Some("third"));
        assert_eq!(scan.line(4), None);
        assert_eq!(scan.line(0), None);
        assert_eq!(scan.len(), 18);
    }

    #[test]
    fn test_builtin_scan_is_shared() {
        let a = Scan::builtin();
        let b = Scan::builtin();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_empty());
    }

    #[test]
    fn test_span_cover() {
        let scan = Scan::new("example", "test.e", "a + b\nc\n");
        let lhs = Span::new(scan.clone(), 1, 0, 1, 1);
        let rhs = Span::new(scan.clone(), 1, 4, 1, 5);
        let both = lhs.cover(&rhs);
        assert_eq!(both.first_column, 0);
        assert_eq!(both.last_column, 5);
        assert_eq!(both.first_line, 1);
    }

    #[test]
    fn test_span_display() {
        let scan = Scan::new("example", "test.e", "x");
        let span = Span::point(scan, 3, 7);
        assert_eq!(span.to_string(), "test.e:3:7");
    }
}
