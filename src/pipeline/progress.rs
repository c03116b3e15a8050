// src/pipeline/progress.rs

use crate::types::ProgressEvent;
use tracing::info;

/// Consumer of progress updates. Callbacks fire synchronously from the
/// worker running the pipeline; marshalling onto a UI thread is the
/// caller's concern.
pub trait ProgressSink {
    fn on_progress(&mut self, percent: u8, status: &str);
}

/// Sink that discards everything.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&mut self, _percent: u8, _status: &str) {}
}

/// Sink that buffers every event for later inspection — for callers that
/// want the whole event stream rather than live callbacks.
#[derive(Default)]
pub struct MemorySink {
    events: Vec<ProgressEvent>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[ProgressEvent] {
        &self.events
    }
}

impl ProgressSink for MemorySink {
    fn on_progress(&mut self, percent: u8, status: &str) {
        self.events.push(ProgressEvent {
            percent,
            status: status.to_string(),
        });
    }
}

/// Sink that mirrors updates into the log.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn on_progress(&mut self, percent: u8, status: &str) {
        info!("Progress: {:3}% | {}", percent, status);
    }
}

/// Wraps a sink and enforces the progress contract: percent is clamped to
/// [0, 100] and never decreases within a run.
pub struct ProgressReporter<'a> {
    sink: &'a mut dyn ProgressSink,
    last_percent: u8,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self {
            sink,
            last_percent: 0,
        }
    }

    pub fn report(&mut self, percent: u8, status: &str) {
        let percent = percent.min(100).max(self.last_percent);
        self.last_percent = percent;
        self.sink.on_progress(percent, status);
    }

    /// Terminal update: every run ends at exactly 100, whatever the outcome.
    pub fn finish(&mut self, status: &str) {
        self.report(100, status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reporter_never_decreases() {
        let mut sink = MemorySink::new();
        let mut reporter = ProgressReporter::new(&mut sink);

        reporter.report(10, "a");
        reporter.report(40, "b");
        reporter.report(25, "regression attempt");
        reporter.finish("done");

        let percents: Vec<u8> = sink.events().iter().map(|e| e.percent).collect();
        assert_eq!(percents, vec![10, 40, 40, 100]);
    }

    #[test]
    fn test_reporter_clamps_overflow() {
        let mut sink = MemorySink::new();
        let mut reporter = ProgressReporter::new(&mut sink);

        reporter.report(250, "too much");
        assert_eq!(sink.events()[0].percent, 100);
    }
}
