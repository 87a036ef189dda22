//! Diagnostics sink
//!
//! All user-facing messages flow through a [`Reports`] sink shared by the
//! mediator, the tree builder, and every language driver. Messages accumulate
//! during a phase and are flushed at the phase boundary with [`Reports::end`],
//! which also decides the process exit code: internal invariant breaks beat
//! user errors, user errors beat a clean run.
//!
//! The sink never formats eagerly and never aborts; callers that detect an
//! unrecoverable condition report it and return a poison value so the rest of
//! the phase can keep collecting diagnostics.

use crate::scan::Span;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Clean exit
pub const EXIT_OK: i32 = 0;
/// One or more user errors
pub const EXIT_ERROR: i32 = 1;
/// User requested an early exit
pub const EXIT_INTERRUPT: i32 = 2;
/// Internal invariant violated
pub const EXIT_INTERNAL: i32 = 99;

/// Message severity, ordered from worst to mildest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Compiler invariant violated; maps to exit 99
    Internal,
    /// Unrecoverable user error; maps to exit 1
    Fatal,
    /// User error; maps to exit 1
    Error,
    Warning,
    Note,
}

impl Severity {
    pub fn name(self) -> &'static str {
        match self {
            Severity::Internal => "internal",
            Severity::Fatal => "fatal",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        }
    }

    /// Does this severity make the enclosing phase fail?
    pub fn is_error(self) -> bool {
        matches!(self, Severity::Internal | Severity::Fatal | Severity::Error)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Handle to an accumulated message, for attaching secondary parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageId(usize);

/// A secondary part of a message ("previous definition is here" style)
#[derive(Debug, Clone)]
pub struct MessagePart {
    pub span: Option<Span>,
    pub text: String,
}

/// One accumulated diagnostic
#[derive(Debug, Clone)]
pub struct Message {
    pub severity: Severity,
    pub span: Option<Span>,
    pub text: String,
    pub parts: Vec<MessagePart>,
}

/// The shared diagnostics sink
///
/// Interior mutability lets every component hold an `Rc<Reports>` and report
/// without threading `&mut` through the whole compiler. The sink is not
/// thread-safe; the compilation model is single-threaded.
pub struct Reports {
    messages: RefCell<Vec<Message>>,
    /// Severity counts survive `end` so later phases can still ask whether
    /// anything went wrong earlier in the lifetime.
    errors_seen: RefCell<usize>,
    internal_seen: RefCell<usize>,
    warnings_seen: RefCell<usize>,
    /// Cap on messages printed per phase flush
    limit: RefCell<Option<usize>>,
}

impl Reports {
    pub fn new() -> Rc<Reports> {
        Rc::new(Reports {
            messages: RefCell::new(Vec::new()),
            errors_seen: RefCell::new(0),
            internal_seen: RefCell::new(0),
            warnings_seen: RefCell::new(0),
            limit: RefCell::new(None),
        })
    }

    /// Print at most `limit` messages per phase flush
    pub fn set_limit(&self, limit: usize) {
        *self.limit.borrow_mut() = Some(limit);
    }

    /// Accumulate a message; returns a handle for secondary parts
    pub fn report(&self, severity: Severity, span: Option<Span>, text: impl Into<String>) -> MessageId {
        let mut messages = self.messages.borrow_mut();
        messages.push(Message {
            severity,
            span,
            text: text.into(),
            parts: Vec::new(),
        });
        match severity {
            Severity::Internal => *self.internal_seen.borrow_mut() += 1,
            Severity::Fatal | Severity::Error => *self.errors_seen.borrow_mut() += 1,
            Severity::Warning => *self.warnings_seen.borrow_mut() += 1,
            Severity::Note => {}
        }
        MessageId(messages.len() - 1)
    }

    /// Attach a secondary span + text to an accumulated message
    pub fn append(&self, id: MessageId, span: Option<Span>, text: impl Into<String>) {
        let mut messages = self.messages.borrow_mut();
        if let Some(message) = messages.get_mut(id.0) {
            message.parts.push(MessagePart {
                span,
                text: text.into(),
            });
        }
    }

    /// Number of pending (not yet drained) messages
    pub fn len(&self) -> usize {
        self.messages.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.borrow().is_empty()
    }

    /// Snapshot of pending messages, for tests and tooling
    pub fn messages(&self) -> Vec<Message> {
        self.messages.borrow().clone()
    }

    /// Has any error-severity message been reported over the whole lifetime,
    /// drained or not?
    pub fn has_errors(&self) -> bool {
        *self.errors_seen.borrow() > 0 || *self.internal_seen.borrow() > 0
    }

    /// Warnings reported over the whole lifetime, drained or not
    pub fn warning_count(&self) -> usize {
        *self.warnings_seen.borrow()
    }

    /// Exit code the pending + drained messages add up to
    pub fn exit_code(&self) -> i32 {
        if *self.internal_seen.borrow() > 0 {
            EXIT_INTERNAL
        } else if *self.errors_seen.borrow() > 0 {
            EXIT_ERROR
        } else {
            EXIT_OK
        }
    }

    /// Flush pending messages to stderr at a phase boundary
    ///
    /// Returns 99 if any internal message was ever reported, 1 for any
    /// fatal/error, 0 otherwise.
    pub fn end(&self, name: &str) -> i32 {
        let messages = self.messages.borrow_mut().split_off(0);
        if !messages.is_empty() {
            eprintln!("== {} ==", name);
            let shown = self.limit.borrow().unwrap_or(messages.len());
            for message in messages.iter().take(shown) {
                write_message(message);
            }
            if messages.len() > shown {
                eprintln!("... and {} more", messages.len() - shown);
            }
        }
        self.exit_code()
    }
}

fn write_message(message: &Message) {
    match &message.span {
        Some(span) => eprintln!("{}: {}: {}", message.severity, span, message.text),
        None => eprintln!("{}: {}", message.severity, message.text),
    }
    if let Some(span) = &message.span
        && let Some(line) = span.scan.line(span.first_line)
    {
        eprintln!(" | {}", line);
    }
    for part in &message.parts {
        match &part.span {
            Some(span) => eprintln!("  {}: {}: {}", Severity::Note, span, part.text),
            None => eprintln!("  {}: {}", Severity::Note, part.text),
        }
    }
}
