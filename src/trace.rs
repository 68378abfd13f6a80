use std::collections::VecDeque;

use crate::config::RunnerConfig;

/// Per-case record of executed steps, bounded to the configured limit.
#[derive(Debug, Clone)]
pub(crate) struct CommandLog {
    enabled: bool,
    events: bool,
    lines: VecDeque<String>,
    limit: usize,
}

impl CommandLog {
    pub(crate) fn new(config: &RunnerConfig) -> Self {
        Self {
            enabled: config.trace_enabled(),
            events: config.trace_events(),
            lines: VecDeque::new(),
            limit: config.log_limit(),
        }
    }

    pub(crate) fn step(&mut self, category: &str, detail: impl Into<String>) {
        let detail = detail.into();
        tracing::debug!(target: "browser_steps::step", category, %detail);
        self.line(format!("[{category}] {detail}"));
    }

    pub(crate) fn event(&mut self, event: &str, target: &str) {
        tracing::trace!(target: "browser_steps::event", event, node = target);
        if self.events {
            self.line(format!("[event] {event} target={target}"));
        }
    }

    fn line(&mut self, line: String) {
        if !self.enabled {
            return;
        }
        if self.lines.len() >= self.limit {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub(crate) fn take(&mut self) -> Vec<String> {
        self.lines.drain(..).collect()
    }

    /// Appends lines recorded by a nested context, honoring this log's limit.
    pub(crate) fn absorb(&mut self, lines: Vec<String>) {
        for line in lines {
            self.line(line);
        }
    }
}
