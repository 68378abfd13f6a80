use std::collections::HashSet;
use std::iter::successors;

use crate::dom::{Dom, NodeId, NodeKind};
use crate::{Error, Result};

/// One comma-separated alternative, stored right to left: `subject` is the
/// element being tested and `ancestry` walks outwards from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Complex {
    subject: Compound,
    ancestry: Vec<(Combinator, Compound)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
    pseudos: Vec<Pseudo>,
}

impl Compound {
    fn lone_id(&self) -> Option<&str> {
        let only_id = self.tag.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && self.pseudos.is_empty();
        if only_id { self.id.as_deref() } else { None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Combinator {
    Descendant,
    Child,
    NextSibling,
    LaterSibling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttrTest {
    name: String,
    op: AttrOp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AttrOp {
    Present,
    Equals(String),
    Prefix(String),
    Suffix(String),
    Substring(String),
    Word(String),
}

impl AttrOp {
    fn accepts(&self, actual: &str) -> bool {
        match self {
            AttrOp::Present => true,
            AttrOp::Equals(value) => actual == value,
            AttrOp::Prefix(value) => !value.is_empty() && actual.starts_with(value.as_str()),
            AttrOp::Suffix(value) => !value.is_empty() && actual.ends_with(value.as_str()),
            AttrOp::Substring(value) => !value.is_empty() && actual.contains(value.as_str()),
            AttrOp::Word(value) => actual.split_whitespace().any(|word| word == value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Pseudo {
    FirstChild,
    LastChild,
    OnlyChild,
    FirstOfType,
    LastOfType,
    Checked,
    Disabled,
    Enabled,
    Focus,
    Visible,
    Hidden,
    Empty,
    Not(Vec<Complex>),
    Nth { pattern: NthPattern, from_end: bool },
}

/// `an+b`, matching 1-based positions `a*n + b` for some `n >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NthPattern {
    a: i64,
    b: i64,
}

impl NthPattern {
    fn matches(self, position: usize) -> bool {
        let offset = position as i64 - self.b;
        match self.a {
            0 => offset == 0,
            a => offset % a == 0 && offset / a >= 0,
        }
    }
}

impl Dom {
    pub(crate) fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>> {
        let list = parse_list(selector)?;
        if let [only] = list.as_slice() {
            if only.ancestry.is_empty() {
                if let Some(id) = only.subject.lone_id() {
                    return Ok(self.by_id(id).into_iter().collect());
                }
            }
        }
        Ok(self.keep_matching(self.elements_in_order(), &list))
    }

    pub(crate) fn query_selector_all_from(
        &self,
        root: NodeId,
        selector: &str,
    ) -> Result<Vec<NodeId>> {
        let list = parse_list(selector)?;
        Ok(self.keep_matching(self.descendant_elements(root), &list))
    }

    pub(crate) fn matches_selector(&self, node_id: NodeId, selector: &str) -> Result<bool> {
        let list = parse_list(selector)?;
        Ok(self.matches_list(node_id, &list))
    }

    pub(crate) fn closest(&self, node_id: NodeId, selector: &str) -> Result<Option<NodeId>> {
        let list = parse_list(selector)?;
        Ok(successors(Some(node_id), |node| self.parent_element(*node))
            .find(|node| self.matches_list(*node, &list)))
    }

    fn keep_matching(&self, scope: Vec<NodeId>, list: &[Complex]) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        scope
            .into_iter()
            .filter(|node| self.matches_list(*node, list) && seen.insert(*node))
            .collect()
    }

    fn matches_list(&self, node_id: NodeId, list: &[Complex]) -> bool {
        self.element(node_id).is_some()
            && list.iter().any(|complex| self.matches_complex(node_id, complex))
    }

    fn matches_complex(&self, node_id: NodeId, complex: &Complex) -> bool {
        self.matches_compound(node_id, &complex.subject)
            && self.matches_ancestry(node_id, &complex.ancestry)
    }

    /// Backtracks: a descendant or later-sibling link tries every candidate,
    /// not only the nearest one.
    fn matches_ancestry(&self, node_id: NodeId, ancestry: &[(Combinator, Compound)]) -> bool {
        let Some(((combinator, compound), outer)) = ancestry.split_first() else {
            return true;
        };
        let fits = |candidate: &NodeId| {
            self.matches_compound(*candidate, compound) && self.matches_ancestry(*candidate, outer)
        };
        match combinator {
            Combinator::Child => self.parent_element(node_id).as_ref().is_some_and(fits),
            Combinator::NextSibling => self.previous_element_sibling(node_id).as_ref().is_some_and(fits),
            Combinator::Descendant => {
                successors(self.parent_element(node_id), |node| self.parent_element(*node)).any(|node| fits(&node))
            }
            Combinator::LaterSibling => successors(self.previous_element_sibling(node_id), |node| {
                self.previous_element_sibling(*node)
            })
            .any(|node| fits(&node)),
        }
    }

    fn matches_compound(&self, node_id: NodeId, compound: &Compound) -> bool {
        let Some(element) = self.element(node_id) else {
            return false;
        };
        if compound
            .tag
            .as_ref()
            .is_some_and(|tag| !element.tag.eq_ignore_ascii_case(tag))
        {
            return false;
        }
        if compound
            .id
            .as_ref()
            .is_some_and(|id| element.attrs.get("id") != Some(id))
        {
            return false;
        }
        compound.classes.iter().all(|class| self.has_class(node_id, class))
            && compound.attrs.iter().all(|test| {
                element
                    .attrs
                    .get(&test.name)
                    .is_some_and(|actual| test.op.accepts(actual))
            })
            && compound.pseudos.iter().all(|pseudo| self.matches_pseudo(node_id, pseudo))
    }

    fn matches_pseudo(&self, node_id: NodeId, pseudo: &Pseudo) -> bool {
        match pseudo {
            Pseudo::FirstChild => self.previous_element_sibling(node_id).is_none(),
            Pseudo::LastChild => self.next_element_sibling(node_id).is_none(),
            Pseudo::OnlyChild => {
                self.previous_element_sibling(node_id).is_none()
                    && self.next_element_sibling(node_id).is_none()
            }
            Pseudo::FirstOfType => self.alone_of_its_type(node_id, Self::previous_element_sibling),
            Pseudo::LastOfType => self.alone_of_its_type(node_id, Self::next_element_sibling),
            Pseudo::Checked => {
                (self.is_checkbox(node_id) || self.is_radio(node_id))
                    && self.element(node_id).is_some_and(|element| element.checked)
            }
            Pseudo::Disabled => self.is_form_control(node_id) && self.is_effectively_disabled(node_id),
            Pseudo::Enabled => self.is_form_control(node_id) && !self.is_effectively_disabled(node_id),
            Pseudo::Focus => self.active_element() == Some(node_id),
            Pseudo::Visible => self.is_visible(node_id),
            Pseudo::Hidden => !self.is_visible(node_id),
            Pseudo::Empty => self.nodes[node_id.0].children.iter().all(|child| {
                matches!(&self.nodes[child.0].kind, NodeKind::Text(text) if text.is_empty())
            }),
            Pseudo::Not(list) => !list.iter().any(|complex| self.matches_complex(node_id, complex)),
            Pseudo::Nth { pattern, from_end } => {
                self.sibling_position(node_id).is_some_and(|(position, count)| {
                    pattern.matches(if *from_end { count + 1 - position } else { position })
                })
            }
        }
    }

    /// True when no sibling reached by repeatedly applying `step` shares the tag.
    fn alone_of_its_type(&self, node_id: NodeId, step: fn(&Self, NodeId) -> Option<NodeId>) -> bool {
        let Some(tag) = self.tag_name(node_id) else {
            return false;
        };
        successors(step(self, node_id), |node| step(self, *node))
            .all(|sibling| self.tag_name(sibling) != Some(tag))
    }

    /// 1-based position among element siblings, and how many there are.
    fn sibling_position(&self, node_id: NodeId) -> Option<(usize, usize)> {
        let siblings = self.element_children(self.parent(node_id)?);
        let position = siblings.iter().position(|sibling| *sibling == node_id)?;
        Some((position + 1, siblings.len()))
    }
}

pub(crate) fn parse_list(selector: &str) -> Result<Vec<Complex>> {
    Cursor::new(selector).list(false)
}

const KEYWORD_PSEUDOS: &[(&str, Pseudo)] = &[
    ("first-child", Pseudo::FirstChild),
    ("last-child", Pseudo::LastChild),
    ("only-child", Pseudo::OnlyChild),
    ("first-of-type", Pseudo::FirstOfType),
    ("last-of-type", Pseudo::LastOfType),
    ("checked", Pseudo::Checked),
    ("disabled", Pseudo::Disabled),
    ("enabled", Pseudo::Enabled),
    ("focus", Pseudo::Focus),
    ("visible", Pseudo::Visible),
    ("hidden", Pseudo::Hidden),
    ("empty", Pseudo::Empty),
];

struct Cursor<'a> {
    source: &'a str,
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self { source, rest: source }
    }

    fn reject(&self) -> Error {
        Error::UnsupportedSelector(self.source.to_string())
    }

    fn peek(&self) -> Option<char> {
        self.rest.chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.rest = &self.rest[ch.len_utf8()..];
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        if self.eat(expected) { Ok(()) } else { Err(self.reject()) }
    }

    /// Returns whether any whitespace was skipped.
    fn skip_whitespace(&mut self) -> bool {
        let trimmed = self.rest.trim_start();
        let skipped = trimmed.len() != self.rest.len();
        self.rest = trimmed;
        skipped
    }

    /// Comma-separated alternatives. Inside `:not(...)` the list ends at `)`.
    fn list(&mut self, nested: bool) -> Result<Vec<Complex>> {
        let mut list = Vec::new();
        loop {
            self.skip_whitespace();
            list.push(self.complex()?);
            self.skip_whitespace();
            if !self.eat(',') {
                break;
            }
        }
        match self.peek() {
            None if !nested => Ok(list),
            Some(')') if nested => Ok(list),
            _ => Err(self.reject()),
        }
    }

    fn complex(&mut self) -> Result<Complex> {
        let mut subject = self.compound()?;
        let mut ancestry = Vec::new();
        loop {
            let spaced = self.skip_whitespace();
            let combinator = match self.peek() {
                Some('>') => Combinator::Child,
                Some('+') => Combinator::NextSibling,
                Some('~') => Combinator::LaterSibling,
                Some(',' | ')') | None => break,
                Some(_) if spaced => Combinator::Descendant,
                Some(_) => return Err(self.reject()),
            };
            if combinator != Combinator::Descendant {
                self.bump();
                self.skip_whitespace();
            }
            let next = self.compound()?;
            ancestry.insert(0, (combinator, std::mem::replace(&mut subject, next)));
        }
        Ok(Complex { subject, ancestry })
    }

    fn compound(&mut self) -> Result<Compound> {
        let mut compound = Compound::default();
        let mut typed = false;
        if self.eat('*') {
            typed = true;
        } else if let Some(tag) = self.ident() {
            compound.tag = Some(tag);
            typed = true;
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.bump();
                    let id = self.ident().ok_or_else(|| self.reject())?;
                    if compound.id.replace(id).is_some() {
                        return Err(self.reject());
                    }
                }
                Some('.') => {
                    self.bump();
                    let class = self.ident().ok_or_else(|| self.reject())?;
                    compound.classes.push(class);
                }
                Some('[') => {
                    self.bump();
                    compound.attrs.push(self.attr_test()?);
                }
                Some(':') => {
                    self.bump();
                    compound.pseudos.push(self.pseudo()?);
                }
                _ => break,
            }
        }

        if !typed && compound == Compound::default() {
            return Err(self.reject());
        }
        Ok(compound)
    }

    /// Identifier characters are ASCII alphanumerics, `-`, `_`, anything
    /// outside ASCII, and `\`-escaped characters.
    fn ident(&mut self) -> Option<String> {
        let mut out = String::new();
        while let Some(ch) = self.peek() {
            if ch == '\\' {
                self.bump();
                out.push(self.bump()?);
            } else if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_') || !ch.is_ascii() {
                self.bump();
                out.push(ch);
            } else {
                break;
            }
        }
        (!out.is_empty()).then_some(out)
    }

    fn quoted(&mut self, quote: char) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.bump().ok_or_else(|| self.reject())? {
                '\\' => out.push(self.bump().ok_or_else(|| self.reject())?),
                ch if ch == quote => return Ok(out),
                ch => out.push(ch),
            }
        }
    }

    /// The part after `[`, up to and including `]`.
    fn attr_test(&mut self) -> Result<AttrTest> {
        self.skip_whitespace();
        let name = self.ident().ok_or_else(|| self.reject())?.to_ascii_lowercase();
        self.skip_whitespace();
        if self.eat(']') {
            return Ok(AttrTest { name, op: AttrOp::Present });
        }

        let operator = match self.peek() {
            Some(op @ ('^' | '$' | '*' | '~')) => {
                self.bump();
                Some(op)
            }
            _ => None,
        };
        self.expect('=')?;
        self.skip_whitespace();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.bump();
                self.quoted(quote)?
            }
            _ => self.ident().ok_or_else(|| self.reject())?,
        };
        self.skip_whitespace();
        self.expect(']')?;

        let op = match operator {
            Some('^') => AttrOp::Prefix(value),
            Some('$') => AttrOp::Suffix(value),
            Some('*') => AttrOp::Substring(value),
            Some('~') => AttrOp::Word(value),
            _ => AttrOp::Equals(value),
        };
        Ok(AttrTest { name, op })
    }

    /// The part after `:`.
    fn pseudo(&mut self) -> Result<Pseudo> {
        let name = self.ident().ok_or_else(|| self.reject())?.to_ascii_lowercase();
        if !self.eat('(') {
            return KEYWORD_PSEUDOS
                .iter()
                .find(|(keyword, _)| *keyword == name)
                .map(|(_, pseudo)| pseudo.clone())
                .ok_or_else(|| self.reject());
        }

        let pseudo = match name.as_str() {
            "not" => Pseudo::Not(self.list(true)?),
            "nth-child" | "nth-last-child" => {
                let end = self.rest.find(')').ok_or_else(|| self.reject())?;
                let pattern = parse_an_plus_b(&self.rest[..end]).ok_or_else(|| self.reject())?;
                self.rest = &self.rest[end..];
                Pseudo::Nth {
                    pattern,
                    from_end: name == "nth-last-child",
                }
            }
            _ => return Err(self.reject()),
        };
        self.expect(')')?;
        Ok(pseudo)
    }
}

/// Accepts `odd`, `even`, a positive integer, or `an+b` with optional parts.
fn parse_an_plus_b(raw: &str) -> Option<NthPattern> {
    let compact = raw
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    let number = |digits: &str| digits.parse::<i64>().ok();

    match compact.as_str() {
        "odd" => return Some(NthPattern { a: 2, b: 1 }),
        "even" => return Some(NthPattern { a: 2, b: 0 }),
        _ => {}
    }

    let Some((coefficient, offset)) = compact.split_once('n') else {
        let b = compact
            .bytes()
            .all(|b| b.is_ascii_digit())
            .then(|| number(&compact))
            .flatten()
            .filter(|b| *b > 0)?;
        return Some(NthPattern { a: 0, b });
    };

    let a = match coefficient {
        "" => 1,
        "-" => -1,
        "+" => return None,
        digits => number(digits)?,
    };
    let b = match offset {
        "" => 0,
        signed if signed.starts_with(['+', '-']) && signed[1..].bytes().all(|b| b.is_ascii_digit()) => {
            number(signed)?
        }
        _ => return None,
    };
    Some(NthPattern { a, b })
}
