use std::collections::{BTreeMap, HashMap};
use std::iter::successors;

use crate::{Error, Result};

/// Identifies a node inside one parsed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Document,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) kind: NodeKind,
}

/// An element with its live form state. `value` and `checked` start from the
/// markup and then diverge from the attributes as actions run.
#[derive(Debug, Clone)]
pub(crate) struct Element {
    pub(crate) tag: String,
    pub(crate) attrs: BTreeMap<String, String>,
    pub(crate) value: String,
    pub(crate) checked: bool,
}

/// Arena document. Nodes are appended in document order, so ascending
/// [`NodeId`]s are also tree order.
#[derive(Debug, Clone)]
pub(crate) struct Dom {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: NodeId,
    ids: HashMap<String, NodeId>,
    focused: Option<NodeId>,
}

// Markup dumps and text collection recurse; give deep documents more stack.
const RED_ZONE: usize = 64 * 1024;
const STACK_CHUNK: usize = 1024 * 1024;

const FORM_CONTROLS: [&str; 4] = ["input", "select", "textarea", "button"];

const TEXT_INPUT_TYPES: &[&str] = &[
    "text", "search", "email", "password", "tel", "url", "number", "date", "time",
    "datetime-local", "month", "week",
];

impl Dom {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document,
            }],
            root: NodeId(0),
            ids: HashMap::new(),
            focused: None,
        }
    }

    fn append(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let node = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: Some(parent),
            children: Vec::new(),
            kind,
        });
        self.nodes[parent.0].children.push(node);
        node
    }

    pub(crate) fn create_element(
        &mut self,
        parent: NodeId,
        tag: String,
        attrs: BTreeMap<String, String>,
    ) -> NodeId {
        let checkable = tag.eq_ignore_ascii_case("input")
            && attrs
                .get("type")
                .is_some_and(|kind| matches!(kind.to_ascii_lowercase().as_str(), "checkbox" | "radio"));
        // A checkbox or radio without a value attribute reports "on".
        let value = match attrs.get("value") {
            Some(value) => value.clone(),
            None if checkable => "on".to_string(),
            None => String::new(),
        };
        let checked = attrs.contains_key("checked");
        let id = attrs.get("id").filter(|id| !id.is_empty()).cloned();

        let node = self.append(
            parent,
            NodeKind::Element(Element {
                tag,
                attrs,
                value,
                checked,
            }),
        );
        if let Some(id) = id {
            // First element wins, as with getElementById.
            self.ids.entry(id).or_insert(node);
        }
        node
    }

    pub(crate) fn create_text(&mut self, parent: NodeId, text: String) -> NodeId {
        self.append(parent, NodeKind::Text(text))
    }

    pub(crate) fn element(&self, node: NodeId) -> Option<&Element> {
        match self.nodes.get(node.0).map(|slot| &slot.kind) {
            Some(NodeKind::Element(element)) => Some(element),
            _ => None,
        }
    }

    fn element_or_err(&self, node: NodeId, what: &str) -> Result<&Element> {
        self.element(node)
            .ok_or_else(|| Error::InvalidArgument(format!("{what} target is not an element")))
    }

    fn element_mut_or_err(&mut self, node: NodeId, what: &str) -> Result<&mut Element> {
        match self.nodes.get_mut(node.0).map(|slot| &mut slot.kind) {
            Some(NodeKind::Element(element)) => Ok(element),
            _ => Err(Error::InvalidArgument(format!("{what} target is not an element"))),
        }
    }

    pub(crate) fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|element| element.tag.as_str())
    }

    pub(crate) fn has_tag(&self, node: NodeId, tag: &str) -> bool {
        self.tag_name(node).is_some_and(|name| name.eq_ignore_ascii_case(tag))
    }

    pub(crate) fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0).and_then(|slot| slot.parent)
    }

    pub(crate) fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.parent(node).filter(|parent| self.element(*parent).is_some())
    }

    /// Proper ancestors, nearest first, ending at the document node.
    pub(crate) fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        successors(self.parent(node), move |current| self.parent(*current))
    }

    pub(crate) fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes[node.0]
            .children
            .iter()
            .copied()
            .filter(|child| self.element(*child).is_some())
            .collect()
    }

    pub(crate) fn previous_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        let (siblings, at) = self.sibling_slice(node)?;
        siblings[..at].iter().rev().copied().find(|sibling| self.element(*sibling).is_some())
    }

    pub(crate) fn next_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        let (siblings, at) = self.sibling_slice(node)?;
        siblings[at + 1..].iter().copied().find(|sibling| self.element(*sibling).is_some())
    }

    fn sibling_slice(&self, node: NodeId) -> Option<(&[NodeId], usize)> {
        let siblings = self.nodes[self.parent(node)?.0].children.as_slice();
        let at = siblings.iter().position(|sibling| *sibling == node)?;
        Some((siblings, at))
    }

    /// Elements strictly below `scope`, in document order.
    pub(crate) fn descendant_elements(&self, scope: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut pending = self.nodes[scope.0].children.iter().rev().copied().collect::<Vec<_>>();
        while let Some(node) = pending.pop() {
            if self.element(node).is_some() {
                found.push(node);
            }
            pending.extend(self.nodes[node.0].children.iter().rev().copied());
        }
        found
    }

    pub(crate) fn elements_in_order(&self) -> Vec<NodeId> {
        self.descendant_elements(self.root)
    }

    pub(crate) fn by_id(&self, id: &str) -> Option<NodeId> {
        self.ids.get(id).copied()
    }

    pub(crate) fn text_content(&self, node: NodeId) -> String {
        let mut text = String::new();
        self.append_text(node, &mut text);
        text
    }

    fn append_text(&self, node: NodeId, text: &mut String) {
        stacker::maybe_grow(RED_ZONE, STACK_CHUNK, || match &self.nodes[node.0].kind {
            NodeKind::Text(chunk) => text.push_str(chunk),
            NodeKind::Document | NodeKind::Element(_) => {
                for child in &self.nodes[node.0].children {
                    self.append_text(*child, text);
                }
            }
        })
    }

    pub(crate) fn value(&self, node: NodeId) -> Result<String> {
        Ok(self.element_or_err(node, "value")?.value.clone())
    }

    pub(crate) fn set_value(&mut self, node: NodeId, value: &str) -> Result<()> {
        self.element_mut_or_err(node, "value")?.value = value.to_string();
        Ok(())
    }

    /// A `<textarea>` takes its initial value from its text.
    pub(crate) fn initialize_form_control_values(&mut self) {
        for node in self.elements_in_order() {
            if self.has_tag(node, "textarea") {
                let text = self.text_content(node);
                if let Ok(element) = self.element_mut_or_err(node, "value") {
                    element.value = text;
                }
            }
        }
    }

    pub(crate) fn checked(&self, node: NodeId) -> Result<bool> {
        Ok(self.element_or_err(node, "checked")?.checked)
    }

    pub(crate) fn set_checked(&mut self, node: NodeId, checked: bool) -> Result<()> {
        self.element_mut_or_err(node, "checked")?.checked = checked;
        Ok(())
    }

    pub(crate) fn disabled(&self, node: NodeId) -> bool {
        self.has_attr(node, "disabled")
    }

    /// Disabled either directly or through an ancestor `<fieldset disabled>`.
    pub(crate) fn is_effectively_disabled(&self, node: NodeId) -> bool {
        self.disabled(node)
            || (self.is_form_control(node)
                && self
                    .ancestors(node)
                    .any(|ancestor| self.has_tag(ancestor, "fieldset") && self.disabled(ancestor)))
    }

    pub(crate) fn readonly(&self, node: NodeId) -> bool {
        self.has_attr(node, "readonly")
    }

    pub(crate) fn attr(&self, node: NodeId, name: &str) -> Option<String> {
        let element = self.element(node)?;
        element.attrs.get(&name.to_ascii_lowercase()).cloned()
    }

    pub(crate) fn has_attr(&self, node: NodeId, name: &str) -> bool {
        self.element(node)
            .is_some_and(|element| element.attrs.contains_key(&name.to_ascii_lowercase()))
    }

    pub(crate) fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.element(node)
            .and_then(|element| element.attrs.get("class"))
            .is_some_and(|classes| classes.split_whitespace().any(|candidate| candidate == class))
    }

    /// Lowercased `type` of an `<input>`, `text` when absent. `None` for
    /// anything that is not an input.
    pub(crate) fn input_type(&self, node: NodeId) -> Option<String> {
        self.has_tag(node, "input").then(|| {
            self.attr(node, "type")
                .map_or_else(|| "text".to_string(), |kind| kind.to_ascii_lowercase())
        })
    }

    pub(crate) fn is_checkbox(&self, node: NodeId) -> bool {
        self.input_type(node).as_deref() == Some("checkbox")
    }

    pub(crate) fn is_radio(&self, node: NodeId) -> bool {
        self.input_type(node).as_deref() == Some("radio")
    }

    pub(crate) fn is_form_control(&self, node: NodeId) -> bool {
        self.tag_name(node)
            .is_some_and(|tag| FORM_CONTROLS.iter().any(|control| tag.eq_ignore_ascii_case(control)))
    }

    /// `<button>` defaults to submit; `<input>` only with `type=submit`.
    pub(crate) fn is_submit_control(&self, node: NodeId) -> bool {
        let kind = self.attr(node, "type");
        let says_submit = kind.as_deref().map(|kind| kind.eq_ignore_ascii_case("submit"));
        if self.has_tag(node, "button") {
            says_submit.unwrap_or(true)
        } else {
            self.has_tag(node, "input") && says_submit == Some(true)
        }
    }

    pub(crate) fn is_text_entry(&self, node: NodeId) -> bool {
        self.has_tag(node, "textarea")
            || self
                .input_type(node)
                .is_some_and(|kind| TEXT_INPUT_TYPES.contains(&kind.as_str()))
    }

    pub(crate) fn is_focusable(&self, node: NodeId) -> bool {
        if self.element(node).is_none() {
            false
        } else if self.has_tag(node, "a") {
            self.has_attr(node, "href") || self.has_attr(node, "tabindex")
        } else if self.is_form_control(node) {
            self.input_type(node).as_deref() != Some("hidden")
        } else {
            self.has_attr(node, "tabindex") || self.has_attr(node, "contenteditable")
        }
    }

    /// A layout-free reading of `:visible`. An element is hidden when it or an
    /// ancestor carries `hidden`, `display: none` or `visibility: hidden`, or
    /// when it is never rendered (`<head>`, hidden inputs).
    pub(crate) fn is_visible(&self, node: NodeId) -> bool {
        if self.element(node).is_none() || !self.is_connected(node) {
            return false;
        }
        if self.input_type(node).as_deref() == Some("hidden") {
            return false;
        }
        successors(Some(node), |current| self.parent(*current))
            .filter_map(|current| self.element(current))
            .all(|element| !hides_itself(element))
    }

    pub(crate) fn is_connected(&self, node: NodeId) -> bool {
        node == self.root || self.ancestors(node).any(|ancestor| ancestor == self.root)
    }

    pub(crate) fn active_element(&self) -> Option<NodeId> {
        self.focused
    }

    pub(crate) fn set_active_element(&mut self, node: Option<NodeId>) {
        self.focused = node;
    }

    pub(crate) fn find_ancestor_by_tag(&self, node: NodeId, tag: &str) -> Option<NodeId> {
        self.ancestors(node).find(|ancestor| self.has_tag(*ancestor, tag))
    }

    /// The form a control submits: itself, its `form="id"` target, or the
    /// nearest enclosing `<form>`.
    pub(crate) fn form_owner(&self, node: NodeId) -> Option<NodeId> {
        if self.has_tag(node, "form") {
            return Some(node);
        }
        self.attr(node, "form")
            .and_then(|id| self.by_id(&id))
            .filter(|form| self.has_tag(*form, "form"))
            .or_else(|| self.find_ancestor_by_tag(node, "form"))
    }

    /// Short label used in logs and event records: `#id`, else
    /// `tag[value=..]`, else the bare tag.
    pub(crate) fn node_label(&self, node: NodeId) -> String {
        let Some(element) = self.element(node) else {
            return format!("node-{}", node.0);
        };
        match (element.attrs.get("id"), element.attrs.get("value")) {
            (Some(id), _) if !id.is_empty() => format!("#{id}"),
            (_, Some(value)) => format!("{}[value={value}]", element.tag),
            _ => element.tag.clone(),
        }
    }

    /// Serializes `node` and its subtree with attributes in name order.
    pub(crate) fn dump_node(&self, node: NodeId) -> String {
        let mut markup = String::new();
        self.write_markup(node, &mut markup);
        markup
    }

    fn write_markup(&self, node: NodeId, markup: &mut String) {
        stacker::maybe_grow(RED_ZONE, STACK_CHUNK, || {
            let element = match &self.nodes[node.0].kind {
                NodeKind::Text(text) => {
                    markup.push_str(text);
                    return;
                }
                NodeKind::Document => None,
                NodeKind::Element(element) => Some(element),
            };
            if let Some(element) = element {
                markup.push('<');
                markup.push_str(&element.tag);
                for (name, value) in &element.attrs {
                    markup.push_str(&format!(" {name}=\"{value}\""));
                }
                markup.push('>');
            }
            for child in &self.nodes[node.0].children {
                self.write_markup(*child, markup);
            }
            if let Some(element) = element {
                markup.push_str(&format!("</{}>", element.tag));
            }
        })
    }
}

fn hides_itself(element: &Element) -> bool {
    const NEVER_RENDERED: &[&str] = &[
        "head", "script", "style", "template", "title", "meta", "link", "noscript",
    ];
    if NEVER_RENDERED.contains(&element.tag.as_str()) || element.attrs.contains_key("hidden") {
        return true;
    }
    let style = element.attrs.get("style").map(String::as_str).unwrap_or_default();
    let display = style_property(style, "display");
    let visibility = style_property(style, "visibility");
    display.as_deref() == Some("none")
        || matches!(visibility.as_deref(), Some("hidden" | "collapse"))
}

/// Last declaration of `property` in an inline style, lowercased.
fn style_property(style: &str, property: &str) -> Option<String> {
    style
        .split(';')
        .filter_map(|declaration| declaration.split_once(':'))
        .filter(|(name, _)| name.trim().eq_ignore_ascii_case(property))
        .map(|(_, value)| value.trim().to_ascii_lowercase())
        .last()
}

/// Keeps at most `limit` characters, appending `...` when text was cut.
pub(crate) fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::parse_html;

    #[test]
    fn checkable_inputs_without_value_report_on() -> Result<()> {
        let dom = parse_html(
            r#"
            <input id="box" type="checkbox">
            <input id="dot" type="RADIO">
            <input id="named" type="checkbox" value="">
            <input id="text">
            "#,
        )?;
        let value = |id: &str| dom.by_id(id).map(|node| dom.value(node)).transpose();
        assert_eq!(value("box")?.as_deref(), Some("on"));
        assert_eq!(value("dot")?.as_deref(), Some("on"));
        assert_eq!(value("named")?.as_deref(), Some(""));
        assert_eq!(value("text")?.as_deref(), Some(""));
        Ok(())
    }

    #[test]
    fn visibility_follows_hidden_ancestors_and_styles() -> Result<()> {
        let dom = parse_html(
            r#"
            <div id="shown"><span id="inner">x</span></div>
            <div hidden><span id="under-hidden">x</span></div>
            <div style="color: red; display: none"><span id="under-none">x</span></div>
            <p id="invisible" style="visibility:hidden">x</p>
            <p id="restyled" style="display: none; display: block">x</p>
            <input id="secret" type="hidden">
            "#,
        )?;

        let visible = |id: &str| dom.by_id(id).is_some_and(|node| dom.is_visible(node));
        assert!(visible("shown"));
        assert!(visible("inner"));
        assert!(visible("restyled"));
        assert!(!visible("under-hidden"));
        assert!(!visible("under-none"));
        assert!(!visible("invisible"));
        assert!(!visible("secret"));
        Ok(())
    }

    #[test]
    fn fieldset_disables_nested_controls() -> Result<()> {
        let dom = parse_html(
            r#"
            <fieldset disabled><input id="inside" type="checkbox"></fieldset>
            <input id="outside" type="checkbox">
            "#,
        )?;
        let inside = dom.by_id("inside").expect("inside exists");
        let outside = dom.by_id("outside").expect("outside exists");
        assert!(dom.is_effectively_disabled(inside));
        assert!(!dom.disabled(inside));
        assert!(!dom.is_effectively_disabled(outside));
        Ok(())
    }

    #[test]
    fn form_owner_prefers_the_form_attribute() -> Result<()> {
        let dom = parse_html(
            r#"
            <form id="outer"><input id="nested"><input id="redirected" form="other"></form>
            <form id="other"></form>
            "#,
        )?;
        let owner = |id: &str| dom.by_id(id).and_then(|node| dom.form_owner(node));
        assert_eq!(owner("nested"), dom.by_id("outer"));
        assert_eq!(owner("redirected"), dom.by_id("other"));
        Ok(())
    }

    #[test]
    fn node_label_prefers_id_then_value() -> Result<()> {
        let dom = parse_html(r#"<input id="a" type="checkbox"><input type="checkbox" value="v"><br>"#)?;
        let nodes = dom.elements_in_order();
        assert_eq!(dom.node_label(nodes[0]), "#a");
        assert_eq!(dom.node_label(nodes[1]), "input[value=v]");
        assert_eq!(dom.node_label(nodes[2]), "br");
        Ok(())
    }

    #[test]
    fn dump_sorts_attributes() -> Result<()> {
        let dom = parse_html(r#"<p title="t" class="c">x<b>y</b></p>"#)?;
        assert_eq!(dom.dump_node(dom.root), r#"<p class="c" title="t">x<b>y</b></p>"#);
        Ok(())
    }

    #[test]
    fn deep_documents_do_not_overflow_text_collection() -> Result<()> {
        let depth = 5_000;
        let html = format!("{}deep{}", "<div>".repeat(depth), "</div>".repeat(depth));
        let dom = parse_html(&html)?;
        assert_eq!(dom.text_content(dom.root), "deep");
        assert_eq!(dom.elements_in_order().len(), depth);
        Ok(())
    }

    #[test]
    fn truncate_chars_marks_cut_text() {
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(truncate_chars("ééé", 2), "éé...");
    }
}
