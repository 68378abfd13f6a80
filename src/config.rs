use url::Url;

use crate::{Error, Result};

pub(crate) const DEFAULT_LOG_LIMIT: usize = 10_000;

const ENV_BASE_URL: &str = "BROWSER_STEPS_BASE_URL";
const ENV_TRACE: &str = "BROWSER_STEPS_TRACE";
const ENV_LOG_LIMIT: &str = "BROWSER_STEPS_LOG_LIMIT";
const ENV_ISOLATE_COMMANDS: &str = "BROWSER_STEPS_ISOLATE_COMMANDS";

/// Settings shared by every test context created for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    base_url: Option<Url>,
    trace: bool,
    trace_events: bool,
    log_limit: usize,
    isolate_case_commands: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            trace: false,
            trace_events: true,
            log_limit: DEFAULT_LOG_LIMIT,
            isolate_case_commands: false,
        }
    }
}

impl RunnerConfig {
    /// Reads `BROWSER_STEPS_BASE_URL`, `BROWSER_STEPS_TRACE`,
    /// `BROWSER_STEPS_LOG_LIMIT` and `BROWSER_STEPS_ISOLATE_COMMANDS`; unset
    /// variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|value| !value.trim().is_empty()) {
            config.set_base_url(base_url.trim())?;
        }

        if let Some(trace) = lookup(ENV_TRACE) {
            config.enable_trace(parse_flag(ENV_TRACE, &trace)?);
        }

        if let Some(isolate) = lookup(ENV_ISOLATE_COMMANDS) {
            config.set_isolate_case_commands(parse_flag(ENV_ISOLATE_COMMANDS, &isolate)?);
        }

        if let Some(limit) = lookup(ENV_LOG_LIMIT) {
            let limit = limit.trim().parse::<usize>().map_err(|_| {
                Error::InvalidArgument(format!("{ENV_LOG_LIMIT} must be a positive integer"))
            })?;
            config.set_log_limit(limit)?;
        }

        Ok(config)
    }

    pub fn enable_trace(&mut self, enabled: bool) -> &mut Self {
        self.trace = enabled;
        self
    }

    pub fn set_trace_events(&mut self, enabled: bool) -> &mut Self {
        self.trace_events = enabled;
        self
    }

    pub fn set_log_limit(&mut self, max_entries: usize) -> Result<&mut Self> {
        if max_entries == 0 {
            return Err(Error::InvalidArgument(
                "set_log_limit requires at least 1 entry".into(),
            ));
        }
        self.log_limit = max_entries;
        Ok(self)
    }

    /// When set, commands registered inside a case are dropped when the case
    /// ends. By default they stay registered for the rest of the suite run.
    pub fn set_isolate_case_commands(&mut self, isolate: bool) -> &mut Self {
        self.isolate_case_commands = isolate;
        self
    }

    /// Base against which relative `visit` targets resolve.
    pub fn set_base_url(&mut self, base_url: &str) -> Result<&mut Self> {
        let parsed = Url::parse(base_url)
            .map_err(|err| Error::Navigation(format!("invalid base url {base_url}: {err}")))?;
        self.base_url = Some(parsed);
        Ok(self)
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace
    }

    pub fn trace_events(&self) -> bool {
        self.trace_events
    }

    pub fn log_limit(&self) -> usize {
        self.log_limit
    }

    pub fn isolate_case_commands(&self) -> bool {
        self.isolate_case_commands
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "off" | "no" => Ok(false),
        "1" | "true" | "on" | "yes" => Ok(true),
        other => Err(Error::InvalidArgument(format!(
            "{name} must be a boolean, got {other:?}"
        ))),
    }
}
