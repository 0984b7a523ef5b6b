use chrono::Local;
use sighub_core::{LogSink, Signal};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::info;

const DEFAULT_MAX_LINES: usize = 1000;

/// Bounded in-memory process log shown to UI clients.
///
/// Every line is mirrored into `tracing`; the oldest lines are dropped once
/// `max_lines` is reached.
pub struct MemoryLog {
    lines: Mutex<VecDeque<String>>,
    max_lines: usize,
}

impl MemoryLog {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::new()),
            max_lines: max_lines.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, line: String) {
        let Ok(mut lines) = self.lines.lock() else {
            return;
        };
        while lines.len() >= self.max_lines {
            lines.pop_front();
        }
        lines.push_back(line);
    }
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINES)
    }
}

impl LogSink for MemoryLog {
    fn post_signal_log(&self, signal: &Signal) {
        let text = match &signal.data {
            Some(serde_json::Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => return,
        };
        info!(object_id = signal.object_id, "{}", text);
        self.push(format!(
            "{} [{}] {}",
            Local::now().format("%Y.%m.%d %H:%M:%S"),
            signal.object_id,
            text
        ));
    }

    fn write(&self, line: &str) {
        info!("{}", line);
        self.push(format!("{} {}", Local::now().format("%Y.%m.%d %H:%M:%S"), line));
    }

    fn all_text(&self) -> String {
        self.lines
            .lock()
            .map(|l| l.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default()
    }

    fn clear(&self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
    }
}
