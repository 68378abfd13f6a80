use std::collections::BTreeMap;

use crate::dom::{Dom, NodeId};
use crate::{Error, Result};

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose body is taken verbatim up to the matching end tag.
const RAW_TEXT_TAGS: &[&str] = &["script", "style", "textarea", "title"];

/// Parses a document into a [`Dom`]. The parser is tolerant in the way test
/// fixtures need: unknown end tags close the nearest matching open element,
/// `<script>` and `<style>` bodies are kept as raw text and never executed.
pub(crate) fn parse_html(html: &str) -> Result<Dom> {
    let mut builder = TreeBuilder {
        dom: Dom::new(),
        open: Vec::new(),
    };
    let mut rest = html;
    while !rest.is_empty() {
        rest = builder.consume(rest)?;
    }
    let mut dom = builder.dom;
    dom.initialize_form_control_values();
    Ok(dom)
}

struct TreeBuilder {
    dom: Dom,
    /// Open elements, innermost last. The document node is implied below.
    open: Vec<NodeId>,
}

impl TreeBuilder {
    fn insertion_point(&self) -> NodeId {
        self.open.last().copied().unwrap_or(self.dom.root)
    }

    /// Handles one construct at the front of `input` and returns what is left.
    fn consume<'a>(&mut self, input: &'a str) -> Result<&'a str> {
        if let Some(body) = input.strip_prefix("<!--") {
            let end = body
                .find("-->")
                .ok_or_else(|| Error::HtmlParse("unclosed HTML comment".into()))?;
            return Ok(&body[end + 3..]);
        }
        if input.starts_with("<!") || input.starts_with("<?") {
            let end = input
                .find('>')
                .ok_or_else(|| Error::HtmlParse("unclosed markup declaration".into()))?;
            return Ok(&input[end + 1..]);
        }
        if input.starts_with("</") {
            return self.end_tag(input);
        }
        if input.starts_with('<') && input[1..].starts_with(|ch: char| ch.is_ascii_alphabetic()) {
            return self.start_tag(input);
        }
        Ok(self.text(input))
    }

    fn text<'a>(&mut self, input: &'a str) -> &'a str {
        let end = input
            .char_indices()
            .skip(1)
            .find(|(at, ch)| *ch == '<' && opens_markup(&input[at + 1..]))
            .map_or(input.len(), |(at, _)| at);
        let parent = self.insertion_point();
        self.dom.create_text(parent, decode_entities(&input[..end]));
        &input[end..]
    }

    fn end_tag<'a>(&mut self, input: &'a str) -> Result<&'a str> {
        let close = input
            .find('>')
            .ok_or_else(|| Error::HtmlParse("unclosed end tag".into()))?;
        let (name, _) = split_tag_name(input[2..close].trim_start());
        if let Some(at) = self.open.iter().rposition(|node| self.dom.has_tag(*node, name)) {
            self.open.truncate(at);
        }
        Ok(&input[close + 1..])
    }

    fn start_tag<'a>(&mut self, input: &'a str) -> Result<&'a str> {
        let (name, mut rest) = split_tag_name(&input[1..]);
        let tag = name.to_ascii_lowercase();
        let mut attrs = BTreeMap::new();

        let self_closing = loop {
            rest = rest.trim_start();
            if let Some(after) = rest.strip_prefix("/>") {
                rest = after;
                break true;
            }
            if let Some(after) = rest.strip_prefix('>') {
                rest = after;
                break false;
            }
            if let Some(after) = rest.strip_prefix('/') {
                rest = after;
                continue;
            }
            if rest.is_empty() {
                return Err(Error::HtmlParse(format!("unclosed start tag <{tag}>")));
            }
            let (name, value, after) = attribute(rest, &tag)?;
            // Repeated attributes keep their first value.
            attrs.entry(name).or_insert(value);
            rest = after;
        };

        let parent = self.insertion_point();
        let node = self.dom.create_element(parent, tag.clone(), attrs);

        if RAW_TEXT_TAGS.contains(&tag.as_str()) {
            let close = rest
                .to_ascii_lowercase()
                .find(&format!("</{tag}"))
                .ok_or_else(|| Error::HtmlParse(format!("unclosed <{tag}>")))?;
            if close > 0 {
                self.dom.create_text(node, rest[..close].to_string());
            }
            let after_close = rest[close..]
                .find('>')
                .ok_or_else(|| Error::HtmlParse("unclosed end tag".into()))?;
            return Ok(&rest[close + after_close + 1..]);
        }

        if !self_closing && !VOID_TAGS.contains(&tag.as_str()) {
            self.open.push(node);
        }
        Ok(rest)
    }
}

/// A `<` only starts markup when followed by a tag, an end tag, `!` or `?`.
fn opens_markup(after_lt: &str) -> bool {
    after_lt.starts_with(|ch: char| ch.is_ascii_alphabetic() || matches!(ch, '/' | '!' | '?'))
}

fn split_tag_name(input: &str) -> (&str, &str) {
    let end = input
        .find(|ch: char| !(ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_')))
        .unwrap_or(input.len());
    input.split_at(end)
}

/// Reads `name`, `name=value`, `name="value"` or `name='value'` and returns
/// the lowercased name, the decoded value and the remaining input.
fn attribute<'a>(input: &'a str, tag: &str) -> Result<(String, String, &'a str)> {
    let name_end = input
        .find(|ch: char| ch.is_whitespace() || matches!(ch, '=' | '>' | '/' | '"' | '\''))
        .unwrap_or(input.len());
    if name_end == 0 {
        return Err(Error::HtmlParse(format!("invalid attribute name in <{tag}>")));
    }
    let name = input[..name_end].to_ascii_lowercase();

    let Some(after_eq) = input[name_end..].trim_start().strip_prefix('=') else {
        return Ok((name, String::new(), &input[name_end..]));
    };
    let after_eq = after_eq.trim_start();

    let (raw, rest) = match after_eq.chars().next() {
        Some(quote @ ('"' | '\'')) => {
            let body = &after_eq[1..];
            let close = body
                .find(quote)
                .ok_or_else(|| Error::HtmlParse("unclosed quoted attribute value".into()))?;
            (&body[..close], &body[close + 1..])
        }
        Some(_) => {
            let end = after_eq
                .char_indices()
                .find(|(at, ch)| ch.is_whitespace() || *ch == '>' || after_eq[*at..].starts_with("/>"))
                .map_or(after_eq.len(), |(at, _)| at);
            after_eq.split_at(end)
        }
        None => return Err(Error::HtmlParse("missing attribute value".into())),
    };
    Ok((name, decode_entities(raw), rest))
}

fn decode_entities(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        match entity(rest) {
            Some((ch, len)) => {
                out.push(ch);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decodes the character reference at the start of `text` (which begins with
/// `&`), returning the character and how many bytes the reference spans.
fn entity(text: &str) -> Option<(char, usize)> {
    let semi = text.find(';').filter(|semi| *semi <= 10)?;
    let ch = match &text[1..semi] {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        name => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)?
        }
    };
    Some((ch, semi + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_tree_with_attributes_and_text() -> Result<()> {
        let dom = parse_html(
            r#"<!DOCTYPE html>
            <div class="action-checkboxes">
              <label><input type="checkbox" value="checkbox1" checked>One &amp; only</label>
              <input type=checkbox value=checkbox2 disabled />
            </div>"#,
        )?;

        let elements = dom.elements_in_order();
        let tags = elements
            .iter()
            .filter_map(|node| dom.tag_name(*node))
            .collect::<Vec<_>>();
        assert_eq!(tags, vec!["div", "label", "input", "input"]);

        let first = elements[2];
        assert!(dom.checked(first)?);
        assert_eq!(dom.value(first)?, "checkbox1");
        assert_eq!(dom.text_content(elements[1]), "One & only");

        let second = elements[3];
        assert!(dom.disabled(second));
        assert_eq!(dom.attr(second, "type").as_deref(), Some("checkbox"));
        Ok(())
    }

    #[test]
    fn repeated_attributes_keep_the_first_value() -> Result<()> {
        let dom = parse_html(r#"<P ID="é" Title='a "b"' title=ignored data-x = 'y'>t</P>"#)?;
        let p = dom.by_id("é").expect("p exists");
        assert_eq!(dom.tag_name(p), Some("p"));
        assert_eq!(dom.attr(p, "title").as_deref(), Some(r#"a "b""#));
        assert_eq!(dom.attr(p, "data-x").as_deref(), Some("y"));
        Ok(())
    }

    #[test]
    fn stray_end_tags_do_not_close_unrelated_elements() -> Result<()> {
        let dom = parse_html("<div id='outer'><span>a</p>b</span></div><p id='after'></p>")?;
        let outer = dom.by_id("outer").expect("outer exists");
        let after = dom.by_id("after").expect("after exists");
        assert_eq!(dom.text_content(outer), "ab");
        assert_eq!(dom.parent(after), Some(dom.root));
        Ok(())
    }

    #[test]
    fn raw_text_elements_keep_markup_as_text() -> Result<()> {
        let dom = parse_html(
            "<script>if (a < b) { document.body.innerHTML = '<p>x</p>'; }</SCRIPT><textarea id='t'>a <b> c</textarea>",
        )?;
        assert_eq!(dom.elements_in_order().len(), 2);
        let textarea = dom.by_id("t").expect("textarea exists");
        assert_eq!(dom.value(textarea)?, "a <b> c");
        Ok(())
    }

    #[test]
    fn less_than_in_text_is_kept() -> Result<()> {
        let dom = parse_html("<p id='p'>1 < 2 ≤ 3</p>")?;
        let p = dom.by_id("p").expect("p exists");
        assert_eq!(dom.text_content(p), "1 < 2 ≤ 3");
        Ok(())
    }

    #[test]
    fn unclosed_constructs_are_errors() {
        let err = parse_html("<div><!-- open").expect_err("comment is unclosed");
        assert!(matches!(err, Error::HtmlParse(msg) if msg.contains("comment")));
        let err = parse_html("<input value='x").expect_err("quote is unclosed");
        assert!(matches!(err, Error::HtmlParse(msg) if msg.contains("quoted")));
        let err = parse_html("<style>p {}").expect_err("style is unclosed");
        assert!(matches!(err, Error::HtmlParse(msg) if msg.contains("<style>")));
    }

    #[test]
    fn numeric_entities_are_decoded() {
        assert_eq!(decode_entities("&#65;&#x42;&lt;&unknown;"), "AB<&unknown;");
        assert_eq!(decode_entities("a & b"), "a & b");
    }
}
