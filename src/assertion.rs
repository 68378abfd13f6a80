use std::fmt;

use crate::commands::Arg;
use crate::dom::{Dom, NodeId, truncate_chars};
use crate::text_match::{self, TextPattern};
use crate::{Error, Result};

const SNIPPET_CHARS: usize = 200;

/// Expected text, either literal or a pattern such as `/^check/i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expected {
    Exact(String),
    Pattern(String),
}

impl Expected {
    fn from_arg(chainer: &str, arg: &Arg) -> Result<Self> {
        match arg {
            Arg::Pattern(pattern) => Ok(Self::Pattern(pattern.clone())),
            other => Ok(Self::Exact(scalar_arg(chainer, other)?)),
        }
    }

    fn equals(&self, actual: &str) -> Result<bool> {
        match self {
            Self::Exact(expected) => {
                Ok(text_match::normalize(expected) == text_match::normalize(actual))
            }
            Self::Pattern(pattern) => TextPattern::compile(pattern)?.is_match(&text_match::normalize(actual)),
        }
    }

    fn contained_in(&self, actual: &str) -> Result<bool> {
        match self {
            Self::Exact(expected) => {
                Ok(text_match::normalize(actual).contains(&text_match::normalize(expected)))
            }
            Self::Pattern(_) => self.equals(actual),
        }
    }
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(text) => write!(f, "{text:?}"),
            Self::Pattern(pattern) => write!(f, "{pattern}"),
        }
    }
}

/// Observable state an assertion inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Exist,
    Checked,
    Visible,
    Hidden,
    Disabled,
    Enabled,
    Focused,
    Empty,
    Attr { name: String, value: Option<Expected> },
    Prop { name: String, value: Option<Expected> },
    Text(Expected),
    ContainText(Expected),
    Value(Expected),
    Class(String),
    Id(String),
    Length(usize),
    Match(String),
}

impl Predicate {
    fn chainer(&self) -> &'static str {
        match self {
            Self::Exist => "exist",
            Self::Checked => "be.checked",
            Self::Visible => "be.visible",
            Self::Hidden => "be.hidden",
            Self::Disabled => "be.disabled",
            Self::Enabled => "be.enabled",
            Self::Focused => "be.focused",
            Self::Empty => "be.empty",
            Self::Attr { .. } => "have.attr",
            Self::Prop { .. } => "have.prop",
            Self::Text(_) => "have.text",
            Self::ContainText(_) => "contain.text",
            Self::Value(_) => "have.value",
            Self::Class(_) => "have.class",
            Self::Id(_) => "have.id",
            Self::Length(_) => "have.length",
            Self::Match(_) => "match",
        }
    }
}

/// A predicate plus its polarity, e.g. `not.be.checked`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    pub negated: bool,
    pub predicate: Predicate,
}

impl Assertion {
    pub fn new(predicate: Predicate) -> Self {
        Self {
            negated: false,
            predicate,
        }
    }

    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    /// Builds an assertion from a chainer string such as `"have.attr"` and
    /// its arguments. Any chainer accepts a `not.` prefix.
    pub fn from_chainer(chainer: &str, args: &[Arg]) -> Result<Self> {
        let trimmed = chainer.trim();
        let (negated, name) = match trimmed.strip_prefix("not.") {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let predicate = match name {
            "exist" => no_args(chainer, args, Predicate::Exist)?,
            "be.checked" => no_args(chainer, args, Predicate::Checked)?,
            "be.visible" => no_args(chainer, args, Predicate::Visible)?,
            "be.hidden" => no_args(chainer, args, Predicate::Hidden)?,
            "be.disabled" => no_args(chainer, args, Predicate::Disabled)?,
            "be.enabled" => no_args(chainer, args, Predicate::Enabled)?,
            "be.focused" | "have.focus" => no_args(chainer, args, Predicate::Focused)?,
            "be.empty" => no_args(chainer, args, Predicate::Empty)?,
            "have.attr" | "have.prop" => {
                let (name_arg, value_arg) = match args {
                    [name] => (name, None),
                    [name, value] => (name, Some(value)),
                    _ => return Err(arity(chainer, "a name and an optional value")),
                };
                let key = scalar_arg(chainer, name_arg)?;
                let value = value_arg
                    .map(|value| Expected::from_arg(chainer, value))
                    .transpose()?;
                if name == "have.attr" {
                    Predicate::Attr { name: key, value }
                } else {
                    Predicate::Prop { name: key, value }
                }
            }
            "have.text" => Predicate::Text(Expected::from_arg(chainer, single(chainer, args)?)?),
            "contain.text" | "contain" => {
                Predicate::ContainText(Expected::from_arg(chainer, single(chainer, args)?)?)
            }
            "have.value" => Predicate::Value(Expected::from_arg(chainer, single(chainer, args)?)?),
            "have.class" => Predicate::Class(scalar_arg(chainer, single(chainer, args)?)?),
            "have.id" => Predicate::Id(scalar_arg(chainer, single(chainer, args)?)?),
            "have.length" => match single(chainer, args)? {
                Arg::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Predicate::Length(*n as usize),
                other => {
                    return Err(Error::InvalidArgument(format!(
                        "{chainer} expects a non-negative integer, got {other}"
                    )));
                }
            },
            "match" => Predicate::Match(scalar_arg(chainer, single(chainer, args)?)?),
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "unknown chainer {chainer:?}"
                )));
            }
        };

        Ok(Self { negated, predicate })
    }

    /// Evaluates against the resolved elements. Boolean state predicates hold
    /// when any element satisfies them; value predicates read the first.
    pub(crate) fn evaluate(&self, dom: &Dom, nodes: &[NodeId], subject: &str) -> Result<()> {
        let outcome = match &self.predicate {
            Predicate::Exist => Outcome {
                holds: !nodes.is_empty(),
                expected: "to exist".into(),
                actual: format!("{} element(s)", nodes.len()),
            },
            Predicate::Length(expected) => Outcome {
                holds: nodes.len() == *expected,
                expected: format!("length {expected}"),
                actual: format!("length {}", nodes.len()),
            },
            _ if nodes.is_empty() => {
                return Err(Error::ElementNotFound {
                    selector: subject.to_string(),
                });
            }
            Predicate::Checked => any_state(nodes, "checked", |node| {
                Ok(dom.checked(node)? && (dom.is_checkbox(node) || dom.is_radio(node)))
            })?,
            Predicate::Visible => any_state(nodes, "visible", |node| Ok(dom.is_visible(node)))?,
            Predicate::Hidden => any_state(nodes, "hidden", |node| Ok(!dom.is_visible(node)))?,
            Predicate::Disabled => any_state(nodes, "disabled", |node| {
                Ok(dom.is_form_control(node) && dom.is_effectively_disabled(node))
            })?,
            Predicate::Enabled => any_state(nodes, "enabled", |node| {
                Ok(dom.is_form_control(node) && !dom.is_effectively_disabled(node))
            })?,
            Predicate::Focused => {
                any_state(nodes, "focused", |node| Ok(dom.active_element() == Some(node)))?
            }
            Predicate::Empty => any_state(nodes, "empty", |node| dom.matches_selector(node, ":empty"))?,
            Predicate::Class(class_name) => any_state(nodes, &format!("class {class_name:?}"), |node| {
                Ok(dom.has_class(node, class_name))
            })?,
            Predicate::Match(selector) => any_state(nodes, &format!("matching {selector}"), |node| {
                dom.matches_selector(node, selector)
            })?,
            Predicate::Attr { name, value } => {
                compare_optional(name, value.as_ref(), dom.attr(nodes[0], name))?
            }
            Predicate::Prop { name, value } => {
                compare_optional(name, value.as_ref(), prop(dom, nodes[0], name))?
            }
            Predicate::Id(id) => {
                let actual = dom.attr(nodes[0], "id");
                Outcome {
                    holds: actual.as_deref() == Some(id.as_str()),
                    expected: format!("id {id:?}"),
                    actual: display_value(actual.as_deref()),
                }
            }
            Predicate::Value(expected) => {
                let actual = dom.value(nodes[0])?;
                Outcome {
                    holds: expected.equals(&actual)?,
                    expected: format!("value {expected}"),
                    actual: format!("{actual:?}"),
                }
            }
            Predicate::Text(expected) => {
                let actual = joined_text(dom, nodes);
                Outcome {
                    holds: expected.equals(&actual)?,
                    expected: format!("text {expected}"),
                    actual: format!("{actual:?}"),
                }
            }
            Predicate::ContainText(expected) => {
                let actual = joined_text(dom, nodes);
                Outcome {
                    holds: expected.contained_in(&actual)?,
                    expected: format!("text containing {expected}"),
                    actual: format!("{:?}", text_match::collapse_whitespace(&actual)),
                }
            }
        };

        if outcome.holds != self.negated {
            tracing::debug!(subject, assertion = %self, "assertion passed");
            return Ok(());
        }

        let expected = if self.negated {
            format!("not {}", outcome.expected)
        } else {
            outcome.expected
        };
        let snippet_root = nodes.first().copied().unwrap_or(dom.root);
        Err(Error::AssertionFailed {
            subject: subject.to_string(),
            predicate: self.to_string(),
            expected,
            actual: outcome.actual,
            dom_snippet: truncate_chars(&dom.dump_node(snippet_root), SNIPPET_CHARS),
        })
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "not.")?;
        }
        write!(f, "{}", self.predicate.chainer())
    }
}

struct Outcome {
    holds: bool,
    expected: String,
    actual: String,
}

fn any_state(
    nodes: &[NodeId],
    state: &str,
    mut test: impl FnMut(NodeId) -> Result<bool>,
) -> Result<Outcome> {
    let mut matching = 0usize;
    for node in nodes {
        if test(*node)? {
            matching += 1;
        }
    }
    Ok(Outcome {
        holds: matching > 0,
        expected: state.to_string(),
        actual: format!("{matching} of {} element(s) {state}", nodes.len()),
    })
}

fn compare_optional(name: &str, expected: Option<&Expected>, actual: Option<String>) -> Result<Outcome> {
    let holds = match (expected, actual.as_deref()) {
        (None, found) => found.is_some(),
        (Some(expected), Some(found)) => expected.equals(found)?,
        (Some(_), None) => false,
    };
    let expected = match expected {
        Some(expected) => format!("{name} = {expected}"),
        None => format!("{name} to be present"),
    };
    Ok(Outcome {
        holds,
        expected,
        actual: format!("{name} = {}", display_value(actual.as_deref())),
    })
}

fn display_value(value: Option<&str>) -> String {
    match value {
        Some(value) => format!("{value:?}"),
        None => "undefined".into(),
    }
}

/// DOM property view of an element, as scripts would read it.
fn prop(dom: &Dom, node: NodeId, name: &str) -> Option<String> {
    let element = dom.element(node)?;
    let value = match name {
        "checked" => dom.checked(node).ok()?.to_string(),
        "disabled" => dom.disabled(node).to_string(),
        "readOnly" => dom.readonly(node).to_string(),
        "value" => dom.value(node).ok()?,
        "tagName" | "nodeName" => element.tag.to_ascii_uppercase(),
        "type" => dom
            .input_type(node)
            .or_else(|| dom.attr(node, "type").map(|kind| kind.to_ascii_lowercase()))?,
        "className" => dom.attr(node, "class").unwrap_or_default(),
        "id" | "name" | "href" | "title" => dom.attr(node, name).unwrap_or_default(),
        "textContent" => dom.text_content(node),
        _ => return None,
    };
    Some(value)
}

fn joined_text(dom: &Dom, nodes: &[NodeId]) -> String {
    nodes.iter().map(|node| dom.text_content(*node)).collect()
}

fn no_args(chainer: &str, args: &[Arg], predicate: Predicate) -> Result<Predicate> {
    if args.is_empty() {
        Ok(predicate)
    } else {
        Err(arity(chainer, "no arguments"))
    }
}

fn single<'a>(chainer: &str, args: &'a [Arg]) -> Result<&'a Arg> {
    match args {
        [arg] => Ok(arg),
        _ => Err(arity(chainer, "exactly one argument")),
    }
}

fn arity(chainer: &str, expected: &str) -> Error {
    Error::InvalidArgument(format!("{chainer} takes {expected}"))
}

fn scalar_arg(chainer: &str, arg: &Arg) -> Result<String> {
    match arg {
        Arg::Str(value) => Ok(value.clone()),
        Arg::Bool(value) => Ok(value.to_string()),
        Arg::Number(_) => Ok(arg.to_string()),
        other => Err(Error::InvalidArgument(format!(
            "{chainer} does not accept {other}"
        ))),
    }
}
