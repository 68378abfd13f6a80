use std::collections::HashMap;
use std::sync::Arc;

use url::Url;

use crate::assertion::Assertion;
use crate::commands::{Arg, CommandTable};
use crate::config::RunnerConfig;
use crate::dom::NodeId;
use crate::page::{ActionOptions, EventRecord, Page};
use crate::query::{ElementHandle, Query, Refinement};
use crate::site::{Site, origin_of, parse_absolute};
use crate::trace::CommandLog;
use crate::{Error, Result};

/// State of one running test case: the visited page, the case's aliases and
/// its command table, and the origin the case is locked to.
#[derive(Debug)]
pub struct TestContext {
    site: Arc<Site>,
    page: Option<Page>,
    aliases: HashMap<String, Query>,
    commands: CommandTable,
    registered: CommandTable,
    origin: Option<String>,
    config: RunnerConfig,
    log: CommandLog,
}

impl TestContext {
    pub fn new(site: Arc<Site>, commands: CommandTable, config: RunnerConfig) -> Self {
        let log = CommandLog::new(&config);
        Self {
            site,
            page: None,
            aliases: HashMap::new(),
            commands,
            registered: CommandTable::new(),
            origin: None,
            config,
            log,
        }
    }

    /// Loads the document registered for `url`. Relative URLs resolve against
    /// the configured base URL, else the current page.
    pub fn visit(&mut self, url: &str) -> Result<()> {
        let url = self.absolute_url(url)?;
        let origin = origin_of(&url);
        match self.origin.as_deref() {
            Some(locked) if locked != origin => {
                return Err(Error::CrossOrigin {
                    current: locked.to_string(),
                    requested: origin,
                });
            }
            Some(_) => {}
            None => self.origin = Some(origin),
        }

        let html = self
            .site
            .lookup(&url)
            .ok_or_else(|| Error::Navigation(format!("no page registered for {url}")))?;
        let page = Page::load(url.clone(), html)?;
        tracing::info!(url = %url, "visited page");
        self.log.step("visit", url.as_str());
        self.page = Some(page);
        Ok(())
    }

    fn absolute_url(&self, url: &str) -> Result<Url> {
        match Url::parse(url) {
            Ok(parsed) => Ok(parsed),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self
                    .config
                    .base_url()
                    .or_else(|| self.page.as_ref().map(|page| &page.url))
                    .ok_or_else(|| {
                        Error::Navigation(format!(
                            "cannot resolve relative url {url} without a base url or a visited page"
                        ))
                    })?;
                base.join(url)
                    .map_err(|err| Error::Navigation(format!("invalid url {url}: {err}")))
            }
            Err(_) => parse_absolute(url),
        }
    }

    pub fn url(&self) -> Option<&Url> {
        self.page.as_ref().map(|page| &page.url)
    }

    /// Starts a chain at a CSS selector or at an `@alias`.
    pub fn get(&mut self, target: &str) -> Chain<'_> {
        self.log.step("get", target);
        Chain {
            query: Query::parse(target),
            cx: self,
        }
    }

    /// Adds or replaces a command. It takes effect for the next invocation in
    /// this case; a suite run carries it into later cases unless
    /// [`RunnerConfig::set_isolate_case_commands`] is set.
    pub fn register<F>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut TestContext, &str, &[Arg]) -> Result<Option<Query>> + Send + Sync + 'static,
    {
        self.log.step("register", name);
        self.registered.register(name, handler);
        self.commands.merge_entry(&self.registered, name);
        self
    }

    /// Commands registered through [`TestContext::register`] so far.
    pub(crate) fn take_registered(&mut self) -> CommandTable {
        std::mem::take(&mut self.registered)
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// Runs the command registered as `name` against `target`. The returned
    /// chain continues from the query the handler yielded, or from `target`.
    pub fn invoke(&mut self, name: &str, target: &str, args: &[Arg]) -> Result<Chain<'_>> {
        let handler = self.commands.resolve(name)?;
        let rendered = args.iter().map(Arg::to_string).collect::<Vec<_>>();
        self.log
            .step("invoke", format!("{name} {target} {}", rendered.join(" ")).trim_end());
        let yielded = handler(self, target, args)?;
        let query = yielded.unwrap_or_else(|| Query::parse(target));
        Ok(Chain { cx: self, query })
    }

    /// Runs `steps` in a separate context locked to the origin of `url`.
    /// The block starts without a page or aliases and leaves this context's
    /// page untouched.
    pub fn origin<F>(&mut self, url: &str, steps: F) -> Result<()>
    where
        F: FnOnce(&mut TestContext) -> Result<()>,
    {
        let url = self.absolute_url(url)?;
        let origin = origin_of(&url);
        self.log.step("origin", origin.as_str());

        let mut child = TestContext {
            site: Arc::clone(&self.site),
            page: None,
            aliases: HashMap::new(),
            commands: self.commands.clone(),
            registered: CommandTable::new(),
            origin: Some(origin),
            config: self.config.clone(),
            log: CommandLog::new(&self.config),
        };
        let result = steps(&mut child);
        self.log.absorb(child.log.take());
        let registered = child.take_registered();
        self.commands.merge(&registered);
        self.registered.merge(&registered);
        result
    }

    pub fn alias(&self, name: &str) -> Option<&Query> {
        self.aliases.get(name.trim_start_matches('@'))
    }

    /// Events dispatched on the current page, oldest first.
    pub fn events(&self) -> &[EventRecord] {
        self.page.as_ref().map(Page::events).unwrap_or_default()
    }

    pub fn take_command_log(&mut self) -> Vec<String> {
        self.log.take()
    }

    fn page(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| Error::Navigation("no page has been visited in this test".into()))
    }

    fn resolve_query(&self, query: &Query) -> Result<Vec<NodeId>> {
        query.resolve(&self.page()?.dom, &self.aliases)
    }
}

/// A lazy query bound to a context. Refinements only record themselves;
/// actions and assertions resolve the query against the live page.
#[derive(Debug)]
pub struct Chain<'cx> {
    cx: &'cx mut TestContext,
    query: Query,
}

impl<'cx> Chain<'cx> {
    pub fn query(&self) -> &Query {
        &self.query
    }

    fn refine(mut self, refinement: Refinement) -> Self {
        self.query = self.query.refine(refinement);
        self
    }

    pub fn find(self, selector: &str) -> Self {
        self.refine(Refinement::Find(selector.to_string()))
    }

    pub fn filter(self, selector: &str) -> Self {
        self.refine(Refinement::Filter(selector.to_string()))
    }

    pub fn not(self, selector: &str) -> Self {
        self.refine(Refinement::Not(selector.to_string()))
    }

    pub fn first(self) -> Self {
        self.refine(Refinement::First)
    }

    pub fn last(self) -> Self {
        self.refine(Refinement::Last)
    }

    pub fn eq(self, index: i64) -> Self {
        self.refine(Refinement::Eq(index))
    }

    pub fn children(self) -> Self {
        self.refine(Refinement::Children(None))
    }

    pub fn children_matching(self, selector: &str) -> Self {
        self.refine(Refinement::Children(Some(selector.to_string())))
    }

    pub fn parent(self) -> Self {
        self.refine(Refinement::Parent)
    }

    pub fn closest(self, selector: &str) -> Self {
        self.refine(Refinement::Closest(selector.to_string()))
    }

    /// Current matches, possibly none.
    pub fn resolve(&self) -> Result<ElementHandle> {
        let nodes = self.cx.resolve_query(&self.query)?;
        Ok(ElementHandle::new(self.query.clone(), nodes))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.cx.resolve_query(&self.query)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Whether any current match satisfies `selector`.
    pub fn is(&self, selector: &str) -> Result<bool> {
        let dom = &self.cx.page()?.dom;
        for node in self.cx.resolve_query(&self.query)? {
            if dom.matches_selector(node, selector)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Records the query under `name` for `@name` lookups later in the case.
    pub fn as_alias(self, name: &str) -> Result<Self> {
        let name = name.trim().trim_start_matches('@');
        if name.is_empty() {
            return Err(Error::InvalidAlias(name.to_string()));
        }
        let expanded = self.query.expand(&self.cx.aliases)?;
        self.require_matches()?;
        self.cx.log.step("as", format!("@{name} = {expanded}"));
        self.cx.aliases.insert(name.to_string(), expanded);
        Ok(self)
    }

    /// Runs `f` with the context and the live matches.
    pub fn then<F>(self, f: F) -> Result<Self>
    where
        F: FnOnce(&mut TestContext, ElementHandle) -> Result<()>,
    {
        let handle = self.resolve()?;
        f(&mut *self.cx, handle)?;
        Ok(self)
    }

    pub fn check(self) -> Result<Self> {
        self.check_with(&[], ActionOptions::default())
    }

    /// Checks the matched checkboxes or radios; with `values`, only those
    /// whose value is listed.
    pub fn check_with(self, values: &[&str], options: ActionOptions) -> Result<Self> {
        self.set_checked("check", values, true, options)
    }

    pub fn uncheck(self) -> Result<Self> {
        self.uncheck_with(&[], ActionOptions::default())
    }

    pub fn uncheck_with(self, values: &[&str], options: ActionOptions) -> Result<Self> {
        self.set_checked("uncheck", values, false, options)
    }

    fn set_checked(
        self,
        verb: &str,
        values: &[&str],
        checked: bool,
        options: ActionOptions,
    ) -> Result<Self> {
        let values = values.iter().map(|v| v.to_string()).collect::<Vec<_>>();
        let detail = if values.is_empty() {
            String::new()
        } else {
            format!(" values={values:?}")
        };
        self.act(verb, detail, options, |page, log, nodes, subject| {
            page.set_checked_all(log, nodes, subject, &values, checked, options)
        })
    }

    pub fn click(self) -> Result<Self> {
        self.click_with(ActionOptions::default())
    }

    pub fn click_with(self, options: ActionOptions) -> Result<Self> {
        self.act("click", String::new(), options, |page, log, nodes, subject| {
            page.click_all(log, nodes, subject, options)
        })
    }

    pub fn focus(self) -> Result<Self> {
        self.act(
            "focus",
            String::new(),
            ActionOptions::default(),
            |page, log, nodes, subject| page.focus(log, nodes, subject),
        )
    }

    pub fn type_text(self, text: &str) -> Result<Self> {
        self.type_with(text, ActionOptions::default())
    }

    pub fn type_with(self, text: &str, options: ActionOptions) -> Result<Self> {
        self.act("type", format!(" {text:?}"), options, |page, log, nodes, subject| {
            page.type_into(log, nodes, subject, text, options)
        })
    }

    pub fn clear(self) -> Result<Self> {
        self.clear_with(ActionOptions::default())
    }

    pub fn clear_with(self, options: ActionOptions) -> Result<Self> {
        self.act("clear", String::new(), options, |page, log, nodes, subject| {
            page.clear_all(log, nodes, subject, options)
        })
    }

    fn require_matches(&self) -> Result<Vec<NodeId>> {
        let nodes = self.cx.resolve_query(&self.query)?;
        if nodes.is_empty() {
            return Err(Error::ElementNotFound {
                selector: self.query.to_string(),
            });
        }
        Ok(nodes)
    }

    fn act<F>(self, verb: &str, detail: String, options: ActionOptions, action: F) -> Result<Self>
    where
        F: FnOnce(&mut Page, &mut CommandLog, &[NodeId], &str) -> Result<()>,
    {
        let nodes = self.require_matches()?;
        let subject = self.query.to_string();
        let forced = if options.force { " (force)" } else { "" };
        self.cx.log.step(verb, format!("{subject}{detail}{forced}"));

        let TestContext { page, log, .. } = &mut *self.cx;
        let page = page
            .as_mut()
            .ok_or_else(|| Error::Navigation("no page has been visited in this test".into()))?;
        action(page, log, &nodes, &subject)?;
        Ok(self)
    }

    pub fn should(self, chainer: &str) -> Result<Self> {
        self.should_with(chainer, &[])
    }

    pub fn should_with(self, chainer: &str, args: &[Arg]) -> Result<Self> {
        let assertion = Assertion::from_chainer(chainer, args)?;
        self.assert(assertion)
    }

    pub fn and(self, chainer: &str) -> Result<Self> {
        self.should(chainer)
    }

    pub fn and_with(self, chainer: &str, args: &[Arg]) -> Result<Self> {
        self.should_with(chainer, args)
    }

    pub fn assert(self, assertion: Assertion) -> Result<Self> {
        let subject = self.query.to_string();
        let nodes = self.cx.resolve_query(&self.query)?;
        self.cx.log.step("assert", format!("{subject} {assertion}"));
        assertion.evaluate(&self.cx.page()?.dom, &nodes, &subject)?;
        Ok(self)
    }
}
