//! Diagnostic sink that keeps every emitted diagnostic for assertions.
use crate::observability::{DiagnosticKind, DiagnosticSink};
use std::sync::{Arc, Mutex, MutexGuard};

/// Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    emitted: Arc<Mutex<Vec<(DiagnosticKind, String)>>>,
}

impl RecordingSink {
    fn lock(&self) -> MutexGuard<'_, Vec<(DiagnosticKind, String)>> {
        self.emitted.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.lock().iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.lock().iter().map(|(_, message)| message.clone()).collect()
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit(&self, kind: DiagnosticKind, message: &str) {
        self.lock().push((kind, message.to_string()));
    }
}
