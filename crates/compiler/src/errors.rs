//! Library-level error taxonomy
//!
//! Every user-facing problem the middle end can produce falls into one of
//! these kinds. The kind tags the message text so tooling (and tests) can
//! classify diagnostics without parsing prose; formatting stays with the
//! sink.

use cthulhu_core::reports::{MessageId, Reports, Severity};
use cthulhu_core::scan::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TypeMismatch,
    /// Structurally wrong construction, e.g. call arity
    ShapeMismatch,
    UndefinedReference,
    Redefinition,
    /// Resolver stack cycle
    CyclicDependency,
    /// Digit literal out of range
    InvalidLiteral,
    /// Compiler invariant violated; fatal at the next phase boundary
    InternalInvariant,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::TypeMismatch => "type-mismatch",
            ErrorKind::ShapeMismatch => "shape-mismatch",
            ErrorKind::UndefinedReference => "undefined-reference",
            ErrorKind::Redefinition => "redefinition",
            ErrorKind::CyclicDependency => "cyclic-dependency",
            ErrorKind::InvalidLiteral => "invalid-literal",
            ErrorKind::InternalInvariant => "internal-invariant",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            ErrorKind::InternalInvariant => Severity::Internal,
            _ => Severity::Error,
        }
    }
}

/// Report a classified diagnostic
pub fn report(reports: &Reports, kind: ErrorKind, span: Span, text: impl Into<String>) -> MessageId {
    reports.report(
        kind.severity(),
        Some(span),
        format!("{} [{}]", text.into(), kind.name()),
    )
}

/// Report a redefinition, pointing back at the previous definition
pub fn report_redefinition(reports: &Reports, name: &str, span: Span, previous: Span) -> MessageId {
    let id = report(
        reports,
        ErrorKind::Redefinition,
        span,
        format!("redefinition of `{}`", name),
    );
    reports.append(id, Some(previous), "previous definition is here");
    id
}
