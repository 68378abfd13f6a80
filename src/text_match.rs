use unicode_normalization::UnicodeNormalization;

use crate::{Error, Result};

/// Compiled text pattern used by `have.text`, `contain.text` and
/// `have.value` when the expected argument is a pattern.
#[derive(Debug, Clone)]
pub(crate) struct TextPattern {
    compiled: fancy_regex::Regex,
}

impl TextPattern {
    /// Accepts either a bare pattern or the slash form `/body/flags`, where
    /// the flags are any of `i`, `m` and `s`.
    pub(crate) fn compile(source: &str) -> Result<Self> {
        let (body, flags) = slash_form(source).unwrap_or((source, ""));
        let mut builder = fancy_regex::RegexBuilder::new(body);
        for flag in flags.chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                's' => builder.dot_matches_new_line(true),
                other => return Err(invalid(source, format!("unsupported flag '{other}'"))),
            };
        }
        let compiled = builder.build().map_err(|err| invalid(source, err))?;
        Ok(Self { compiled })
    }

    /// Backtracking patterns can exceed their step limit, which surfaces as
    /// an error rather than a non-match.
    pub(crate) fn is_match(&self, text: &str) -> Result<bool> {
        self.compiled
            .is_match(text)
            .map_err(|err| Error::InvalidArgument(format!("pattern failed on {text:?}: {err}")))
    }
}

fn invalid(source: &str, reason: impl std::fmt::Display) -> Error {
    Error::InvalidArgument(format!("invalid pattern {source}: {reason}"))
}

fn slash_form(source: &str) -> Option<(&str, &str)> {
    let (body, flags) = source.strip_prefix('/')?.rsplit_once('/')?;
    flags
        .chars()
        .all(|flag| flag.is_ascii_alphabetic())
        .then_some((body, flags))
}

/// Canonical composition so that visually identical strings compare equal.
pub(crate) fn normalize(value: &str) -> String {
    value.nfc().collect()
}

/// Collapses runs of whitespace the way rendered text reads.
pub(crate) fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
