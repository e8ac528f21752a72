//! Non-fatal failure reporting.
//!
//! GPU resource setup problems never abort the process: they are logged on a
//! per-kind `tracing` target and rendering continues with a degraded result.
//! Every report is also kept in a small per-thread buffer so callers (and
//! tests) can inspect what went wrong during a frame.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;

/// Maximum number of reports kept per thread
const MAX_ENTRIES: usize = 256;

/// Log channel of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Framebuffer incomplete, shader load/compile failure, missing texture
    Resource,
    /// Draw or dispatch issued with missing state (program, uniforms, textures)
    Binding,
    /// A layer rendered against an environment it cannot use
    Mismatch,
}

impl DiagnosticKind {
    pub fn target(self) -> &'static str {
        match self {
            DiagnosticKind::Resource => "cloudscapes::resource",
            DiagnosticKind::Binding => "cloudscapes::binding",
            DiagnosticKind::Mismatch => "cloudscapes::mismatch",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.target())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

thread_local! {
    static ENTRIES: RefCell<VecDeque<Diagnostic>> = const { RefCell::new(VecDeque::new()) };
}

/// Logs `message` on the channel for `kind` and records it.
pub fn report(kind: DiagnosticKind, message: impl Into<String>) {
    let message = message.into();
    // tracing targets must be literals
    match kind {
        DiagnosticKind::Resource => tracing::error!(target: "cloudscapes::resource", "{}", message),
        DiagnosticKind::Binding => tracing::error!(target: "cloudscapes::binding", "{}", message),
        DiagnosticKind::Mismatch => tracing::error!(target: "cloudscapes::mismatch", "{}", message),
    }

    ENTRIES.with(|entries| {
        let mut entries = entries.borrow_mut();
        if entries.len() == MAX_ENTRIES {
            entries.pop_front();
        }
        entries.push_back(Diagnostic { kind, message });
    });
}

/// Takes every report recorded on this thread so far.
pub fn drain() -> Vec<Diagnostic> {
    ENTRIES.with(|entries| entries.borrow_mut().drain(..).collect())
}

/// Number of reports of `kind` currently recorded on this thread.
pub fn count(kind: DiagnosticKind) -> usize {
    ENTRIES.with(|entries| entries.borrow().iter().filter(|d| d.kind == kind).count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_are_kept_per_kind() {
        drain();
        report(DiagnosticKind::Resource, "framebuffer is not complete");
        report(DiagnosticKind::Mismatch, "wrong environment");

        assert_eq!(count(DiagnosticKind::Resource), 1);
        assert_eq!(count(DiagnosticKind::Mismatch), 1);
        assert_eq!(count(DiagnosticKind::Binding), 0);

        let drained = drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].message, "framebuffer is not complete");
        assert!(drain().is_empty());
    }

    #[test]
    fn buffer_is_bounded() {
        drain();
        for i in 0..(MAX_ENTRIES + 10) {
            report(DiagnosticKind::Binding, format!("missing texture {}", i));
        }
        let drained = drain();
        assert_eq!(drained.len(), MAX_ENTRIES);
        assert_eq!(drained[0].message, "missing texture 10");
    }
}
