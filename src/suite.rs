use std::fmt;
use std::sync::Arc;

use crate::commands::{Arg, CommandTable};
use crate::config::RunnerConfig;
use crate::context::TestContext;
use crate::query::Query;
use crate::site::Site;
use crate::Result;

type Step = Arc<dyn Fn(&mut TestContext) -> Result<()> + Send + Sync>;

enum Entry {
    Case { title: String, body: Step },
    Group(Suite),
}

/// A named group of cases with shared `before_each` hooks and commands.
/// Groups nest through [`Suite::describe`].
pub struct Suite {
    name: String,
    hooks: Vec<Step>,
    entries: Vec<Entry>,
    commands: CommandTable,
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("name", &self.name)
            .field("hooks", &self.hooks.len())
            .field("cases", &self.case_count())
            .field("commands", &self.commands)
            .finish()
    }
}

impl Suite {
    /// A top-level suite whose command table starts with the built-in verbs.
    pub fn new(name: &str) -> Self {
        Self::group(name, CommandTable::with_builtins())
    }

    fn group(name: &str, commands: CommandTable) -> Self {
        Self {
            name: name.to_string(),
            hooks: Vec::new(),
            entries: Vec::new(),
            commands,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs before every case of this group and of nested groups, after the
    /// hooks of enclosing groups.
    pub fn before_each<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut TestContext) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn it<F>(mut self, title: &str, body: F) -> Self
    where
        F: Fn(&mut TestContext) -> Result<()> + Send + Sync + 'static,
    {
        self.entries.push(Entry::Case {
            title: title.to_string(),
            body: Arc::new(body),
        });
        self
    }

    pub fn describe<F>(mut self, name: &str, build: F) -> Self
    where
        F: FnOnce(Suite) -> Suite,
    {
        let child = build(Self::group(name, CommandTable::new()));
        self.entries.push(Entry::Group(child));
        self
    }

    /// Registers a command for every case of this group. Suite-level
    /// registrations are fixed once the run starts.
    pub fn command<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(&mut TestContext, &str, &[Arg]) -> Result<Option<Query>> + Send + Sync + 'static,
    {
        self.commands.register(name, handler);
        self
    }

    pub fn case_count(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| match entry {
                Entry::Case { .. } => 1,
                Entry::Group(child) => child.case_count(),
            })
            .sum()
    }

    /// Runs every case in declaration order, each in a fresh context. A
    /// failing case is recorded and the run continues. Commands a case
    /// registers stay registered for the cases after it unless the config
    /// isolates them.
    pub fn run(&self, site: Arc<Site>, config: &RunnerConfig) -> SuiteReport {
        let span = tracing::info_span!("suite", name = %self.name);
        let _guard = span.enter();

        let mut cases = Vec::with_capacity(self.case_count());
        let mut hooks = Vec::new();
        let mut run = RunState {
            site,
            config,
            registered: CommandTable::new(),
        };
        self.run_group(&mut run, &[], &mut hooks, &CommandTable::new(), &mut cases);

        let report = SuiteReport {
            name: self.name.clone(),
            cases,
        };
        tracing::info!(
            passed = report.passed(),
            failed = report.failed(),
            "suite finished"
        );
        report
    }

    fn run_group(
        &self,
        run: &mut RunState<'_>,
        parents: &[&str],
        hooks: &mut Vec<Step>,
        inherited: &CommandTable,
        out: &mut Vec<CaseReport>,
    ) {
        let mut commands = inherited.clone();
        commands.merge(&self.commands);

        let mut path = parents.to_vec();
        path.push(self.name.as_str());
        let hook_mark = hooks.len();
        hooks.extend(self.hooks.iter().cloned());

        for entry in &self.entries {
            match entry {
                Entry::Case { title, body } => {
                    let mut full_title = path.join(" > ");
                    full_title.push_str(" > ");
                    full_title.push_str(title);
                    out.push(run.case(full_title, hooks, &commands, body));
                }
                Entry::Group(child) => {
                    child.run_group(run, &path, hooks, &commands, out);
                }
            }
        }

        hooks.truncate(hook_mark);
    }
}

/// State shared by the cases of one run.
struct RunState<'a> {
    site: Arc<Site>,
    config: &'a RunnerConfig,
    // Registrations made inside cases; applied over the suite tables.
    registered: CommandTable,
}

impl RunState<'_> {
    fn case(&mut self, title: String, hooks: &[Step], group: &CommandTable, body: &Step) -> CaseReport {
        let mut commands = group.clone();
        commands.merge(&self.registered);
        let mut cx = TestContext::new(Arc::clone(&self.site), commands, self.config.clone());
        let outcome = hooks
            .iter()
            .try_for_each(|hook| hook(&mut cx))
            .and_then(|()| body(&mut cx));

        match &outcome {
            Ok(()) => tracing::info!(case = %title, "passed"),
            Err(err) => tracing::warn!(case = %title, error = %err, "failed"),
        }

        let registered = cx.take_registered();
        if !registered.is_empty() {
            if self.config.isolate_case_commands() {
                tracing::debug!(case = %title, commands = ?registered.names(), "dropping case commands");
            } else {
                self.registered.merge(&registered);
            }
        }

        CaseReport {
            title,
            outcome,
            command_log: cx.take_command_log(),
        }
    }
}

/// Result of one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseReport {
    pub title: String,
    pub outcome: Result<()>,
    pub command_log: Vec<String>,
}

impl CaseReport {
    pub fn passed(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteReport {
    pub name: String,
    pub cases: Vec<CaseReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.cases.iter().filter(|case| case.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.cases.len() - self.passed()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases.iter().filter(|case| !case.passed())
    }

    pub fn case(&self, title_suffix: &str) -> Option<&CaseReport> {
        self.cases
            .iter()
            .find(|case| case.title.ends_with(title_suffix))
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} passing, {} failing",
            self.name,
            self.passed(),
            self.failed()
        )?;
        for case in self.failures() {
            if let Err(err) = &case.outcome {
                writeln!(f, "  x {}: {err}", case.title)?;
            }
        }
        Ok(())
    }
}
