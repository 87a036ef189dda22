//! Cthulhu Core: shared support for compiler front-ends and the mediator
//!
//! This crate holds the pieces every part of the compiler collection needs
//! but that carry no language semantics of their own:
//!
//! - `scan`: source buffer handles and spans. A [`scan::Scan`] owns the text
//!   of one translation unit; a [`scan::Span`] points back into it for
//!   diagnostics.
//! - `reports`: the diagnostics sink. Front-ends and the shared middle end
//!   accumulate messages here and phases flush them at their boundaries,
//!   mapping severity to a process exit code.
//!
//! Everything in this crate is single-threaded by design; the compilation
//! model runs all phases on one thread and shares these structures by
//! reference.

pub mod reports;
pub mod scan;

pub use reports::{EXIT_ERROR, EXIT_INTERNAL, EXIT_INTERRUPT, EXIT_OK};
pub use reports::{MessageId, Reports, Severity};
pub use scan::{Scan, ScanRef, Span};
