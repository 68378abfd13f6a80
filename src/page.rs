use url::Url;

use crate::dom::{Dom, NodeId};
use crate::html::parse_html;
use crate::trace::CommandLog;
use crate::{Error, Result};

/// Options accepted by the mutating steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionOptions {
    /// Skip the visibility and disabled checks.
    pub force: bool,
    /// Allow `click` on more than one element.
    pub multiple: bool,
}

impl ActionOptions {
    pub fn force() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    pub fn multiple() -> Self {
        Self {
            multiple: true,
            ..Self::default()
        }
    }
}

/// One synthetic event dispatched by an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub target: String,
    pub event: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Key {
    Char(char),
    Enter,
    Backspace,
    SelectAll,
}

#[derive(Debug, Clone)]
pub(crate) struct Page {
    pub(crate) url: Url,
    pub(crate) dom: Dom,
    events: Vec<EventRecord>,
}

impl Page {
    pub(crate) fn load(url: Url, html: &str) -> Result<Self> {
        let dom = parse_html(html)?;
        Ok(Self {
            url,
            dom,
            events: Vec::new(),
        })
    }

    pub(crate) fn events(&self) -> &[EventRecord] {
        &self.events
    }

    fn dispatch(&mut self, log: &mut CommandLog, target: NodeId, event: &str) {
        let label = self.dom.node_label(target);
        log.event(event, &label);
        self.events.push(EventRecord {
            target: label,
            event: event.to_string(),
        });
    }

    fn ensure_actionable(&self, node: NodeId, subject: &str, options: ActionOptions) -> Result<()> {
        if options.force {
            return Ok(());
        }
        if self.dom.is_effectively_disabled(node) {
            return Err(self.not_actionable(node, subject, "it is disabled"));
        }
        if !self.dom.is_visible(node) {
            return Err(self.not_actionable(node, subject, "it is not visible"));
        }
        Ok(())
    }

    fn not_actionable(&self, node: NodeId, subject: &str, reason: &str) -> Error {
        Error::NotActionable {
            selector: subject.to_string(),
            reason: format!("{} cannot be acted on because {reason}", self.dom.node_label(node)),
        }
    }

    /// Checks or unchecks every element of `nodes`, or only the ones whose
    /// value is listed in `values` when it is non-empty.
    pub(crate) fn set_checked_all(
        &mut self,
        log: &mut CommandLog,
        nodes: &[NodeId],
        subject: &str,
        values: &[String],
        checked: bool,
        options: ActionOptions,
    ) -> Result<()> {
        let mut targets = Vec::with_capacity(nodes.len());
        for node in nodes {
            if !values.is_empty() {
                let value = self.dom.value(*node)?;
                if !values.contains(&value) {
                    continue;
                }
            }
            targets.push(*node);
        }

        if targets.is_empty() {
            return Err(Error::ElementNotFound {
                selector: format!("{subject} with value in {values:?}"),
            });
        }

        let verb = if checked { "check" } else { "uncheck" };
        for node in &targets {
            let accepted = self.dom.is_checkbox(*node) || (checked && self.dom.is_radio(*node));
            if !accepted {
                let expected = if checked {
                    "input[type=checkbox|radio]"
                } else {
                    "input[type=checkbox]"
                };
                return Err(Error::TypeMismatch {
                    selector: subject.to_string(),
                    expected: expected.into(),
                    actual: self.describe_kind(*node),
                });
            }
            self.ensure_actionable(*node, subject, options)?;
        }

        for node in targets {
            if self.dom.checked(node)? == checked {
                tracing::trace!(node = %self.dom.node_label(node), verb, "already in requested state");
                continue;
            }
            if checked && self.dom.is_radio(node) {
                self.uncheck_other_radios_in_group(node)?;
            }
            self.dom.set_checked(node, checked)?;
            self.dispatch(log, node, "input");
            self.dispatch(log, node, "change");
        }
        Ok(())
    }

    fn describe_kind(&self, node: NodeId) -> String {
        match (self.dom.tag_name(node), self.dom.input_type(node)) {
            (_, Some(kind)) => format!("input[type={kind}]"),
            (Some(tag), None) => tag.to_string(),
            (None, None) => "non-element".into(),
        }
    }

    fn uncheck_other_radios_in_group(&mut self, target: NodeId) -> Result<()> {
        let target_name = self.dom.attr(target, "name").unwrap_or_default();
        if target_name.is_empty() {
            return Ok(());
        }
        let target_form = self.dom.form_owner(target);

        for node in self.dom.elements_in_order() {
            if node == target || !self.dom.is_radio(node) {
                continue;
            }
            if self.dom.attr(node, "name").unwrap_or_default() != target_name {
                continue;
            }
            if self.dom.form_owner(node) != target_form {
                continue;
            }
            if self.dom.checked(node)? {
                self.dom.set_checked(node, false)?;
            }
        }
        Ok(())
    }

    pub(crate) fn click_all(
        &mut self,
        log: &mut CommandLog,
        nodes: &[NodeId],
        subject: &str,
        options: ActionOptions,
    ) -> Result<()> {
        if nodes.len() > 1 && !options.multiple {
            return Err(Error::InvalidArgument(format!(
                "click can only be called on a single element, {subject} matched {}; pass the multiple option",
                nodes.len()
            )));
        }
        for node in nodes {
            self.ensure_actionable(*node, subject, options)?;
        }
        for node in nodes {
            if self.dom.is_focusable(*node) && !self.dom.is_effectively_disabled(*node) {
                self.focus_node(log, *node);
            }
            self.activate(log, *node)?;
        }
        Ok(())
    }

    /// Dispatches `click` on `node` and runs its default behavior.
    fn activate(&mut self, log: &mut CommandLog, node: NodeId) -> Result<()> {
        self.dispatch(log, node, "click");

        if self.dom.has_tag(node, "label") {
            if let Some(control) = self.label_control(node) {
                if control != node && !self.dom.is_effectively_disabled(control) {
                    return self.activate(log, control);
                }
            }
            return Ok(());
        }

        if self.dom.is_effectively_disabled(node) {
            return Ok(());
        }

        if self.dom.is_checkbox(node) {
            let current = self.dom.checked(node)?;
            self.dom.set_checked(node, !current)?;
            self.dispatch(log, node, "input");
            self.dispatch(log, node, "change");
        } else if self.dom.is_radio(node) {
            if !self.dom.checked(node)? {
                self.uncheck_other_radios_in_group(node)?;
                self.dom.set_checked(node, true)?;
                self.dispatch(log, node, "input");
                self.dispatch(log, node, "change");
            }
        } else if self.dom.is_submit_control(node) {
            if let Some(form) = self.dom.form_owner(node) {
                self.dispatch(log, form, "submit");
            }
        }
        Ok(())
    }

    fn label_control(&self, label: NodeId) -> Option<NodeId> {
        if let Some(for_id) = self.dom.attr(label, "for") {
            return self
                .dom
                .by_id(&for_id)
                .filter(|control| self.is_labelable(*control));
        }
        self.dom
            .descendant_elements(label)
            .into_iter()
            .find(|candidate| self.is_labelable(*candidate))
    }

    fn is_labelable(&self, node: NodeId) -> bool {
        self.dom.is_form_control(node) && self.dom.input_type(node).as_deref() != Some("hidden")
    }

    pub(crate) fn focus(
        &mut self,
        log: &mut CommandLog,
        nodes: &[NodeId],
        subject: &str,
    ) -> Result<()> {
        let [node] = nodes else {
            return Err(Error::InvalidArgument(format!(
                "focus can only be called on a single element, {subject} matched {}",
                nodes.len()
            )));
        };
        if !self.dom.is_focusable(*node) || self.dom.is_effectively_disabled(*node) {
            return Err(self.not_actionable(*node, subject, "it is not a focusable element"));
        }
        self.focus_node(log, *node);
        Ok(())
    }

    fn focus_node(&mut self, log: &mut CommandLog, node: NodeId) {
        let current = self.dom.active_element();
        if current == Some(node) {
            return;
        }
        if let Some(current) = current {
            self.dispatch(log, current, "blur");
        }
        self.dom.set_active_element(Some(node));
        self.dispatch(log, node, "focus");
    }

    pub(crate) fn type_into(
        &mut self,
        log: &mut CommandLog,
        nodes: &[NodeId],
        subject: &str,
        text: &str,
        options: ActionOptions,
    ) -> Result<()> {
        if text.is_empty() {
            return Err(Error::InvalidArgument(
                "type cannot accept an empty string".into(),
            ));
        }
        let [node] = nodes else {
            return Err(Error::InvalidArgument(format!(
                "type can only be called on a single element, {subject} matched {}",
                nodes.len()
            )));
        };
        let node = *node;
        let keys = parse_key_sequence(text)?;

        self.ensure_actionable(node, subject, options)?;
        if !self.dom.is_focusable(node) {
            return Err(self.not_actionable(node, subject, "it is not a typeable element"));
        }
        if self.dom.is_text_entry(node) && self.dom.readonly(node) && !options.force {
            return Err(self.not_actionable(node, subject, "it is readonly"));
        }

        self.focus_node(log, node);

        let text_entry = self.dom.is_text_entry(node);
        let max_length = self
            .dom
            .attr(node, "maxlength")
            .and_then(|raw| raw.trim().parse::<usize>().ok());
        let mut selected_all = false;

        for key in keys {
            self.dispatch(log, node, "keydown");
            match key {
                Key::SelectAll => selected_all = true,
                Key::Char(ch) if text_entry => {
                    let mut value = self.dom.value(node)?;
                    if std::mem::take(&mut selected_all) {
                        value.clear();
                    }
                    if max_length.is_none_or(|max| value.chars().count() < max) {
                        value.push(ch);
                    }
                    self.update_value(log, node, value)?;
                }
                Key::Char(' ') if self.activates_on_space(node) => self.activate(log, node)?,
                Key::Char(_) => {}
                Key::Backspace if text_entry => {
                    let mut value = self.dom.value(node)?;
                    if std::mem::take(&mut selected_all) {
                        value.clear();
                    } else {
                        value.pop();
                    }
                    self.update_value(log, node, value)?;
                }
                Key::Backspace => {}
                Key::Enter => {
                    if self.dom.has_tag(node, "textarea") {
                        let mut value = self.dom.value(node)?;
                        value.push('\n');
                        self.update_value(log, node, value)?;
                    } else if text_entry {
                        if let Some(form) = self.dom.form_owner(node) {
                            self.dispatch(log, form, "submit");
                        }
                    } else if self.dom.has_tag(node, "button") || self.dom.is_submit_control(node) {
                        self.activate(log, node)?;
                    }
                }
            }
            self.dispatch(log, node, "keyup");
        }
        Ok(())
    }

    fn activates_on_space(&self, node: NodeId) -> bool {
        self.dom.is_checkbox(node)
            || self.dom.is_radio(node)
            || self.dom.has_tag(node, "button")
            || matches!(
                self.dom.input_type(node).as_deref(),
                Some("submit" | "button" | "reset")
            )
    }

    fn update_value(&mut self, log: &mut CommandLog, node: NodeId, value: String) -> Result<()> {
        if self.dom.value(node)? == value {
            return Ok(());
        }
        self.dom.set_value(node, &value)?;
        self.dispatch(log, node, "input");
        Ok(())
    }

    pub(crate) fn clear_all(
        &mut self,
        log: &mut CommandLog,
        nodes: &[NodeId],
        subject: &str,
        options: ActionOptions,
    ) -> Result<()> {
        for node in nodes {
            if !self.dom.is_text_entry(*node) {
                return Err(Error::TypeMismatch {
                    selector: subject.to_string(),
                    expected: "input or textarea".into(),
                    actual: self.describe_kind(*node),
                });
            }
            self.ensure_actionable(*node, subject, options)?;
            if self.dom.readonly(*node) && !options.force {
                return Err(self.not_actionable(*node, subject, "it is readonly"));
            }
        }
        for node in nodes {
            self.update_value(log, *node, String::new())?;
        }
        Ok(())
    }
}

fn parse_key_sequence(text: &str) -> Result<Vec<Key>> {
    let mut keys = Vec::new();
    let mut rest = text;
    while let Some(ch) = rest.chars().next() {
        if ch != '{' {
            keys.push(Key::Char(ch));
            rest = &rest[ch.len_utf8()..];
            continue;
        }
        // `{{}` is a literal brace.
        if let Some(after) = rest.strip_prefix("{{}") {
            keys.push(Key::Char('{'));
            rest = after;
            continue;
        }
        let Some(close) = rest.find('}') else {
            return Err(Error::InvalidArgument(format!(
                "unterminated special key sequence in {text:?}"
            )));
        };
        let name = rest[1..close].to_ascii_lowercase();
        keys.push(match name.as_str() {
            "enter" => Key::Enter,
            "backspace" => Key::Backspace,
            "selectall" => Key::SelectAll,
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "special key {{{name}}} is not supported"
                )));
            }
        });
        rest = &rest[close + 1..];
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunnerConfig;

    fn page(html: &str) -> Result<Page> {
        let url = Url::parse("https://example.test/actions")
            .map_err(|err| Error::Navigation(err.to_string()))?;
        Page::load(url, html)
    }

    fn log() -> CommandLog {
        CommandLog::new(&RunnerConfig::default())
    }

    fn one(page: &Page, selector: &str) -> Result<Vec<NodeId>> {
        page.dom.query_selector_all(selector)
    }

    fn events(page: &Page) -> Vec<String> {
        page.events()
            .iter()
            .map(|record| format!("{}:{}", record.target, record.event))
            .collect()
    }

    #[test]
    fn check_is_noop_when_already_checked() -> Result<()> {
        let mut page = page(r#"<input id="a" type="checkbox" checked>"#)?;
        let mut log = log();
        let nodes = one(&page, "#a")?;
        page.set_checked_all(&mut log, &nodes, "#a", &[], true, ActionOptions::default())?;
        assert!(page.events().is_empty());
        page.set_checked_all(&mut log, &nodes, "#a", &[], false, ActionOptions::default())?;
        assert_eq!(events(&page), vec!["#a:input", "#a:change"]);
        Ok(())
    }

    #[test]
    fn checking_a_radio_unchecks_its_group() -> Result<()> {
        let mut page = page(
            r#"
            <form><input id="r1" type="radio" name="g" checked><input id="r2" type="radio" name="g"></form>
            <input id="r3" type="radio" name="g" checked>
            "#,
        )?;
        let mut log = log();
        let nodes = one(&page, "#r2")?;
        page.set_checked_all(&mut log, &nodes, "#r2", &[], true, ActionOptions::default())?;
        let checked = |id: &str| page.dom.by_id(id).is_some_and(|n| page.dom.checked(n).unwrap_or(false));
        assert!(!checked("r1"));
        assert!(checked("r2"));
        // Different form owner, different group.
        assert!(checked("r3"));
        Ok(())
    }

    #[test]
    fn uncheck_rejects_radios_and_check_rejects_text_inputs() -> Result<()> {
        let mut page = page(r#"<input id="r" type="radio"><input id="t">"#)?;
        let mut log = log();
        let radio = one(&page, "#r")?;
        let err = page.set_checked_all(&mut log, &radio, "#r", &[], false, ActionOptions::default());
        assert!(matches!(err, Err(Error::TypeMismatch { .. })));
        let text = one(&page, "#t")?;
        let err = page.set_checked_all(&mut log, &text, "#t", &[], true, ActionOptions::default());
        assert!(matches!(err, Err(Error::TypeMismatch { actual, .. }) if actual == "input[type=text]"));
        Ok(())
    }

    #[test]
    fn disabled_and_hidden_elements_require_force() -> Result<()> {
        let mut page = page(
            r#"<input id="d" type="checkbox" disabled><input id="h" type="checkbox" style="display:none">"#,
        )?;
        let mut log = log();
        for id in ["#d", "#h"] {
            let nodes = one(&page, id)?;
            let err = page.set_checked_all(&mut log, &nodes, id, &[], true, ActionOptions::default());
            assert!(matches!(err, Err(Error::NotActionable { .. })), "{id}");
            page.set_checked_all(&mut log, &nodes, id, &[], true, ActionOptions::force())?;
            assert!(page.dom.checked(nodes[0])?);
        }
        Ok(())
    }

    #[test]
    fn label_click_toggles_wrapped_and_referenced_controls() -> Result<()> {
        let mut page = page(
            r#"
            <label id="wrap"><input id="inner" type="checkbox">Inner</label>
            <label id="ref" for="outer">Outer</label><input id="outer" type="checkbox">
            "#,
        )?;
        let mut log = log();
        for (label, control) in [("#wrap", "#inner"), ("#ref", "#outer")] {
            let nodes = one(&page, label)?;
            page.click_all(&mut log, &nodes, label, ActionOptions::default())?;
            assert!(page.dom.checked(one(&page, control)?[0])?, "{label}");
        }
        assert!(events(&page).contains(&"#inner:change".to_string()));
        Ok(())
    }

    #[test]
    fn click_requires_multiple_for_several_elements() -> Result<()> {
        let mut page = page(r#"<input type="checkbox" class="c"><input type="checkbox" class="c">"#)?;
        let mut log = log();
        let nodes = one(&page, ".c")?;
        let err = page.click_all(&mut log, &nodes, ".c", ActionOptions::default());
        assert!(matches!(err, Err(Error::InvalidArgument(_))));
        page.click_all(&mut log, &nodes, ".c", ActionOptions::multiple())?;
        assert!(nodes.iter().all(|node| page.dom.checked(*node).unwrap_or(false)));
        Ok(())
    }

    #[test]
    fn submit_button_click_submits_owning_form() -> Result<()> {
        let mut page = page(r#"<form id="f"><button id="go">Go</button></form>"#)?;
        let mut log = log();
        let nodes = one(&page, "#go")?;
        page.click_all(&mut log, &nodes, "#go", ActionOptions::default())?;
        assert_eq!(events(&page), vec!["#go:focus", "#go:click", "#f:submit"]);
        Ok(())
    }

    #[test]
    fn focus_moves_between_elements_with_blur() -> Result<()> {
        let mut page = page(r#"<input id="a"><input id="b"><div id="plain">x</div>"#)?;
        let mut log = log();
        page.focus(&mut log, &one(&page, "#a")?, "#a")?;
        page.focus(&mut log, &one(&page, "#b")?, "#b")?;
        assert_eq!(events(&page), vec!["#a:focus", "#a:blur", "#b:focus"]);
        assert_eq!(page.dom.active_element(), one(&page, "#b")?.first().copied());

        let err = page.focus(&mut log, &one(&page, "#plain")?, "#plain");
        assert!(matches!(err, Err(Error::NotActionable { .. })));
        let err = page.focus(&mut log, &one(&page, "input")?, "input");
        assert!(matches!(err, Err(Error::InvalidArgument(_))));
        Ok(())
    }

    #[test]
    fn typing_edits_text_and_honors_special_keys() -> Result<()> {
        let mut page = page(r#"<form id="f"><input id="t" value="ab" maxlength="4"></form>"#)?;
        let mut log = log();
        let nodes = one(&page, "#t")?;
        page.type_into(&mut log, &nodes, "#t", "cde", ActionOptions::default())?;
        assert_eq!(page.dom.value(nodes[0])?, "abcd");
        page.type_into(&mut log, &nodes, "#t", "{backspace}{{}", ActionOptions::default())?;
        assert_eq!(page.dom.value(nodes[0])?, "abc{");
        page.type_into(&mut log, &nodes, "#t", "{selectall}z{enter}", ActionOptions::default())?;
        assert_eq!(page.dom.value(nodes[0])?, "z");
        assert!(events(&page).contains(&"#f:submit".to_string()));
        Ok(())
    }

    #[test]
    fn space_toggles_checkbox_like_a_click() -> Result<()> {
        let mut page = page(r#"<input id="c" type="checkbox">"#)?;
        let mut log = log();
        let nodes = one(&page, "#c")?;
        page.type_into(&mut log, &nodes, "#c", " ", ActionOptions::default())?;
        assert!(page.dom.checked(nodes[0])?);
        page.type_into(&mut log, &nodes, "#c", " ", ActionOptions::default())?;
        assert!(!page.dom.checked(nodes[0])?);
        Ok(())
    }

    #[test]
    fn typing_rejects_empty_text_readonly_and_unknown_keys() -> Result<()> {
        let mut page = page(r#"<input id="r" readonly><input id="t">"#)?;
        let mut log = log();
        let readonly = one(&page, "#r")?;
        let text = one(&page, "#t")?;
        let err = page.type_into(&mut log, &text, "#t", "", ActionOptions::default());
        assert!(matches!(err, Err(Error::InvalidArgument(_))));
        let err = page.type_into(&mut log, &readonly, "#r", "x", ActionOptions::default());
        assert!(matches!(err, Err(Error::NotActionable { .. })));
        let err = page.type_into(&mut log, &text, "#t", "{tab}", ActionOptions::default());
        assert!(matches!(err, Err(Error::InvalidArgument(msg)) if msg.contains("{tab}")));
        Ok(())
    }

    #[test]
    fn clear_empties_text_entries_only() -> Result<()> {
        let mut page = page(r#"<textarea id="ta">hello</textarea><input id="c" type="checkbox">"#)?;
        let mut log = log();
        let area = one(&page, "#ta")?;
        page.clear_all(&mut log, &area, "#ta", ActionOptions::default())?;
        assert_eq!(page.dom.value(area[0])?, "");
        assert_eq!(events(&page), vec!["#ta:input"]);
        let err = page.clear_all(&mut log, &one(&page, "#c")?, "#c", ActionOptions::default());
        assert!(matches!(err, Err(Error::TypeMismatch { .. })));
        Ok(())
    }

    #[test]
    fn value_filter_matches_the_implicit_on_value() -> Result<()> {
        let mut page = page(r#"<input id="bare" type="checkbox"><input id="named" type="checkbox" value="x">"#)?;
        let mut log = log();
        let nodes = one(&page, "input")?;
        page.set_checked_all(&mut log, &nodes, "input", &["on".to_string()], true, ActionOptions::default())?;
        assert_eq!(events(&page), vec!["#bare:input", "#bare:change"]);
        assert_eq!(page.dom.query_selector_all(":checked")?, one(&page, "#bare")?);
        Ok(())
    }
}
