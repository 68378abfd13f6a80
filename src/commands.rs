use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::context::TestContext;
use crate::page::ActionOptions;
use crate::query::Query;
use crate::{Error, Result};

/// Handler behind a command name. It receives the running context, the
/// target string the step was invoked with and the step arguments, and may
/// yield a query that becomes the subject of the returned chain.
pub type CommandFn =
    dyn Fn(&mut TestContext, &str, &[Arg]) -> Result<Option<Query>> + Send + Sync;

/// Argument passed to a command or an assertion chainer.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Str(String),
    List(Vec<String>),
    Bool(bool),
    Number(f64),
    Pattern(String),
    Options(ActionOptions),
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<Vec<String>> for Arg {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<&[&str]> for Arg {
    fn from(value: &[&str]) -> Self {
        Self::List(value.iter().map(|v| v.to_string()).collect())
    }
}

impl From<ActionOptions> for Arg {
    fn from(value: ActionOptions) -> Self {
        Self::Options(value)
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(value) => write!(f, "{value:?}"),
            Self::List(values) => write!(f, "{values:?}"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) if value.fract() == 0.0 && value.is_finite() => {
                write!(f, "{}", *value as i64)
            }
            Self::Number(value) => write!(f, "{value}"),
            Self::Pattern(pattern) => write!(f, "{pattern}"),
            Self::Options(options) => write!(
                f,
                "{{force: {}, multiple: {}}}",
                options.force, options.multiple
            ),
        }
    }
}

/// Registry of verbs that steps can invoke by name.
#[derive(Clone, Default)]
pub struct CommandTable {
    entries: HashMap<String, Arc<CommandFn>>,
}

impl fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTable")
            .field("names", &self.names())
            .finish()
    }
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with `check`, `uncheck`, `click`, `focus`, `type` and `clear`
    /// already registered.
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        table.register("check", |cx, target, args| {
            let (values, options) = value_args("check", args)?;
            let values = values.iter().map(String::as_str).collect::<Vec<_>>();
            cx.get(target).check_with(&values, options)?;
            Ok(None)
        });
        table.register("uncheck", |cx, target, args| {
            let (values, options) = value_args("uncheck", args)?;
            let values = values.iter().map(String::as_str).collect::<Vec<_>>();
            cx.get(target).uncheck_with(&values, options)?;
            Ok(None)
        });
        table.register("click", |cx, target, args| {
            let options = options_only("click", args)?;
            cx.get(target).click_with(options)?;
            Ok(None)
        });
        table.register("focus", |cx, target, args| {
            if !args.is_empty() {
                return Err(Error::InvalidArgument("focus takes no arguments".into()));
            }
            cx.get(target).focus()?;
            Ok(None)
        });
        table.register("type", |cx, target, args| {
            let (rest, options) = split_options(args);
            let text = match rest {
                [Arg::Str(text)] => text,
                _ => {
                    return Err(Error::InvalidArgument(
                        "type takes the text to type and optional options".into(),
                    ));
                }
            };
            cx.get(target).type_with(text, options)?;
            Ok(None)
        });
        table.register("clear", |cx, target, args| {
            let options = options_only("clear", args)?;
            cx.get(target).clear_with(options)?;
            Ok(None)
        });
        table
    }

    /// Adds `handler` under `name`, replacing any previous handler.
    pub fn register<F>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut TestContext, &str, &[Arg]) -> Result<Option<Query>> + Send + Sync + 'static,
    {
        if self
            .entries
            .insert(name.to_string(), Arc::new(handler))
            .is_some()
        {
            tracing::debug!(command = name, "replaced command handler");
        }
        self
    }

    /// Copies every entry of `other` into this table, replacing clashes.
    pub(crate) fn merge(&mut self, other: &CommandTable) {
        for (name, handler) in &other.entries {
            self.entries.insert(name.clone(), Arc::clone(handler));
        }
    }

    /// Copies the entry `name` of `other`, if any, into this table.
    pub(crate) fn merge_entry(&mut self, other: &CommandTable, name: &str) {
        if let Some(handler) = other.entries.get(name) {
            self.entries.insert(name.to_string(), Arc::clone(handler));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<CommandFn>> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| Error::CommandNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = self.entries.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }
}

fn split_options(args: &[Arg]) -> (&[Arg], ActionOptions) {
    match args.split_last() {
        Some((Arg::Options(options), rest)) => (rest, *options),
        _ => (args, ActionOptions::default()),
    }
}

fn options_only(command: &str, args: &[Arg]) -> Result<ActionOptions> {
    match split_options(args) {
        ([], options) => Ok(options),
        _ => Err(Error::InvalidArgument(format!(
            "{command} only accepts options"
        ))),
    }
}

fn value_args(command: &str, args: &[Arg]) -> Result<(Vec<String>, ActionOptions)> {
    let (rest, options) = split_options(args);
    let values = match rest {
        [] => Vec::new(),
        [Arg::Str(value)] => vec![value.clone()],
        [Arg::List(values)] => values.clone(),
        _ => {
            return Err(Error::InvalidArgument(format!(
                "{command} takes a value, a list of values and/or options"
            )));
        }
    };
    Ok((values, options))
}

/// Flips the checked state of `target`: unchecks when any matched element is
/// checked right now, checks otherwise. Register it as `toggleCheckbox`.
pub fn toggle_checkbox(cx: &mut TestContext, target: &str, args: &[Arg]) -> Result<Option<Query>> {
    let options = options_only("toggleCheckbox", args)?;
    if cx.get(target).is(":checked")? {
        cx.get(target).uncheck_with(&[], options)?;
    } else {
        cx.get(target).check_with(&[], options)?;
    }
    Ok(None)
}

/// Yields the elements whose `id` attribute equals `target`. Register it as
/// `getById`.
pub fn get_by_id(_cx: &mut TestContext, target: &str, args: &[Arg]) -> Result<Option<Query>> {
    if !args.is_empty() {
        return Err(Error::InvalidArgument("getById takes no arguments".into()));
    }
    let id = target.trim();
    if id.is_empty() || id.contains(['"', '\'']) {
        return Err(Error::InvalidArgument(format!(
            "getById needs a plain id, got {target:?}"
        )));
    }
    Ok(Some(Query::parse(&format!("[id=\"{id}\"]"))))
}
