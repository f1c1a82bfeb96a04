use parking_lot::Mutex;
use std::sync::Arc;

/// Per-request collector for debug lines returned with `debug=true`.
///
/// Every line is also emitted as a `tracing` debug event, so the trace is
/// visible in logs whether or not the caller asked for it. The lock is only
/// held for a push and never across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct DebugTrace {
    lines: Option<Arc<Mutex<Vec<String>>>>,
}

impl DebugTrace {
    pub fn enabled() -> Self {
        Self {
            lines: Some(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    pub fn disabled() -> Self {
        Self { lines: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.lines.is_some()
    }

    /// Whether a recorded line would go anywhere: the per-request buffer or
    /// a debug-level subscriber.
    pub fn is_active(&self) -> bool {
        self.is_enabled() || tracing::enabled!(tracing::Level::DEBUG)
    }

    pub fn record(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::debug!("{}", line);
        if let Some(lines) = &self.lines {
            lines.lock().push(line);
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .as_ref()
            .map(|lines| lines.lock().clone())
            .unwrap_or_default()
    }
}
