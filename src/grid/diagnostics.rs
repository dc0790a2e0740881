//! Optional diagnostics sink for the classifiers.
//!
//! Classifiers stay pure; callers that want a trace of intermediate values
//! pass a sink in explicitly.

use std::cell::RefCell;

/// Receives human-readable diagnostic lines from a classifier run.
pub trait Diagnostics {
    fn note(&self, message: &str);
}

/// Forwards diagnostics to the application log with a fixed prefix.
pub struct LogDiagnostics {
    prefix: String,
}

impl LogDiagnostics {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Diagnostics for LogDiagnostics {
    fn note(&self, message: &str) {
        crate::log(&format!("{}: {}", self.prefix, message));
    }
}

impl<F: Fn(&str)> Diagnostics for F {
    fn note(&self, message: &str) {
        self(message)
    }
}

/// Keeps every line in memory. Useful for the calibration window and tests.
#[derive(Default)]
pub struct CollectingDiagnostics {
    lines: RefCell<Vec<String>>,
}

impl CollectingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }
}

impl Diagnostics for CollectingDiagnostics {
    fn note(&self, message: &str) {
        self.lines.borrow_mut().push(message.to_string());
    }
}

/// Emits a message only when a sink was supplied.
pub(crate) fn emit(sink: Option<&dyn Diagnostics>, message: impl FnOnce() -> String) {
    if let Some(sink) = sink {
        sink.note(&message());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink_keeps_order() {
        let sink = CollectingDiagnostics::new();
        emit(Some(&sink), || "first".to_string());
        emit(Some(&sink), || "second".to_string());
        assert_eq!(sink.lines(), vec!["first", "second"]);
    }

    #[test]
    fn test_closure_sink() {
        let seen = RefCell::new(0);
        let sink = |_: &str| *seen.borrow_mut() += 1;
        emit(Some(&sink), || "x".to_string());
        emit(None, || unreachable!());
        assert_eq!(*seen.borrow(), 1);
    }
}
