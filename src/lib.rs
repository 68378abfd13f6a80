//! Deterministic UI interaction and assertion steps for Rust tests.
//!
//! Pages are HTML documents registered on a [`Site`]. A [`TestContext`] visits
//! them, locates elements with CSS selectors or `@alias` references, drives
//! them with `check`/`uncheck`/`click`/`focus`/`type_text` and asserts on their
//! state with chai-style chainers such as `"be.checked"` or `"have.attr"`.
//! Custom verbs live in a [`CommandTable`] and are invoked exactly like the
//! built-in ones.
//!
//! ```
//! use browser_steps::{CommandTable, RunnerConfig, Site, TestContext};
//! use std::sync::Arc;
//!
//! # fn main() -> browser_steps::Result<()> {
//! let site = Site::new().with_page(
//!     "https://example.test/actions",
//!     r#"<div class="boxes"><input type="checkbox" value="a"></div>"#,
//! )?;
//! let mut cx = TestContext::new(Arc::new(site), CommandTable::with_builtins(), RunnerConfig::default());
//! cx.visit("https://example.test/actions")?;
//! cx.get(".boxes [type=\"checkbox\"]").first().as_alias("box")?;
//! cx.get("@box").check()?.should("be.checked")?;
//! # Ok(())
//! # }
//! ```

use std::error::Error as StdError;
use std::fmt;

mod assertion;
mod commands;
mod config;
mod context;
mod dom;
mod html;
mod page;
mod query;
mod selector;
mod site;
mod suite;
mod text_match;
mod trace;

pub use assertion::{Assertion, Expected, Predicate};
pub use commands::{Arg, CommandFn, CommandTable, get_by_id, toggle_checkbox};
pub use config::RunnerConfig;
pub use context::{Chain, TestContext};
pub use dom::NodeId;
pub use page::{ActionOptions, EventRecord};
pub use query::{ElementHandle, Query, QueryRoot, Refinement};
pub use site::Site;
pub use suite::{CaseReport, Suite, SuiteReport};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    HtmlParse(String),
    UnsupportedSelector(String),
    ElementNotFound {
        selector: String,
    },
    CommandNotFound(String),
    InvalidAlias(String),
    AssertionFailed {
        subject: String,
        predicate: String,
        expected: String,
        actual: String,
        dom_snippet: String,
    },
    NotActionable {
        selector: String,
        reason: String,
    },
    TypeMismatch {
        selector: String,
        expected: String,
        actual: String,
    },
    InvalidArgument(String),
    Navigation(String),
    CrossOrigin {
        current: String,
        requested: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HtmlParse(msg) => write!(f, "html parse error: {msg}"),
            Self::UnsupportedSelector(selector) => write!(f, "unsupported selector: {selector}"),
            Self::ElementNotFound { selector } => {
                write!(f, "expected to find element: {selector}, but never found it")
            }
            Self::CommandNotFound(name) => write!(f, "command not found: {name}"),
            Self::InvalidAlias(name) => {
                write!(f, "alias @{name} was used before it was defined")
            }
            Self::AssertionFailed {
                subject,
                predicate,
                expected,
                actual,
                dom_snippet,
            } => write!(
                f,
                "assertion failed for {subject}: {predicate} expected {expected}, actual {actual}, snippet {dom_snippet}"
            ),
            Self::NotActionable { selector, reason } => {
                write!(f, "element {selector} is not actionable: {reason}")
            }
            Self::TypeMismatch {
                selector,
                expected,
                actual,
            } => write!(
                f,
                "type mismatch for {selector}: expected {expected}, actual {actual}"
            ),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Navigation(msg) => write!(f, "navigation error: {msg}"),
            Self::CrossOrigin { current, requested } => write!(
                f,
                "cannot visit {requested} from a test locked to {current}; wrap the steps in an origin block"
            ),
        }
    }
}

impl StdError for Error {}
