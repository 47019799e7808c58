//! One-time diagnostics for degraded jail construction.
//!
//! Best-effort operations are retried many times while a jail is built. Each
//! kind of missing capability is reported once per process, never more.

use std::collections::HashSet;

/// Conditions that are reported at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    MissingMknod,
    MissingChown,
    MissingSetgid,
    MissingSetuid,
}

impl DiagnosticKind {
    pub fn message(self) -> &'static str {
        match self {
            Self::MissingMknod => {
                "The process is missing CAP_MKNOD capability. \
                 Some crucial systems may not be initialized."
            }
            Self::MissingChown => {
                "The process is missing CAP_CHOWN capability. \
                 Some directories will be owned by the user although they should be owned by root."
            }
            Self::MissingSetgid => {
                "The process is missing CAP_SETGID capability. \
                 Some processes may run with privileges of current user."
            }
            Self::MissingSetuid => {
                "The process is missing CAP_SETUID capability. \
                 Some processes may run with privileges of current user."
            }
        }
    }
}

/// Destination for operator diagnostics.
pub trait DiagnosticSink: Send {
    fn emit(&self, kind: DiagnosticKind, message: &str);
}

/// Forwards diagnostics to the `log` facade at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn emit(&self, kind: DiagnosticKind, message: &str) {
        log::warn!(target: "capjail::diagnostics", "{} ({:?})", message, kind);
    }
}

/// Tracks which kinds have already been reported.
#[derive(Debug, Default)]
pub struct WarnOnce {
    emitted: HashSet<DiagnosticKind>,
}

impl WarnOnce {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `kind` through `sink` unless it was emitted before. Returns whether it was emitted.
    pub fn warn(&mut self, sink: &dyn DiagnosticSink, kind: DiagnosticKind) -> bool {
        if !self.emitted.insert(kind) {
            return false;
        }
        sink.emit(kind, kind.message());
        true
    }

    pub fn has_emitted(&self, kind: DiagnosticKind) -> bool {
        self.emitted.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct Counter(Arc<Mutex<Vec<DiagnosticKind>>>);

    impl DiagnosticSink for Counter {
        fn emit(&self, kind: DiagnosticKind, _message: &str) {
            self.0.lock().unwrap().push(kind);
        }
    }

    #[test]
    fn each_kind_is_emitted_once() {
        let sink = Counter::default();
        let mut once = WarnOnce::new();

        assert!(once.warn(&sink, DiagnosticKind::MissingChown));
        assert!(!once.warn(&sink, DiagnosticKind::MissingChown));
        assert!(!once.warn(&sink, DiagnosticKind::MissingChown));

        assert_eq!(*sink.0.lock().unwrap(), vec![DiagnosticKind::MissingChown]);
    }

    #[test]
    fn kinds_are_tracked_independently() {
        let sink = Counter::default();
        let mut once = WarnOnce::new();

        once.warn(&sink, DiagnosticKind::MissingMknod);
        assert!(!once.has_emitted(DiagnosticKind::MissingChown));
        assert!(once.warn(&sink, DiagnosticKind::MissingChown));
        assert_eq!(sink.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn messages_name_the_capability() {
        assert!(DiagnosticKind::MissingMknod.message().contains("CAP_MKNOD"));
        assert!(DiagnosticKind::MissingChown.message().contains("CAP_CHOWN"));
        assert!(DiagnosticKind::MissingSetgid.message().contains("CAP_SETGID"));
        assert!(DiagnosticKind::MissingSetuid.message().contains("CAP_SETUID"));
    }
}
