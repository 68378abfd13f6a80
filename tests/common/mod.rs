#![allow(dead_code)]

use std::sync::Arc;

use browser_steps::{RunnerConfig, Site};
use tracing_subscriber::{EnvFilter, fmt};

pub const ACTIONS_URL: &str = "https://example.cypress.io/commands/actions";
pub const ACTIONS_HTML: &str = include_str!("../fixtures/actions.html");

/// Routes library logs to the test harness output; `RUST_LOG` overrides the
/// default `warn` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .with_target(true)
        .compact()
        .try_init();
}

pub fn actions_site() -> browser_steps::Result<Arc<Site>> {
    let site = Site::new()
        .with_page(ACTIONS_URL, ACTIONS_HTML)?
        .with_page(
            "https://example.cypress.io/commands/querying",
            r#"<ul class="query-list"><li class="first">apples</li><li class="second">oranges</li></ul>"#,
        )?
        .with_page(
            "https://docs.example.org/checkboxes",
            r#"<main><input id="remote" type="checkbox"><p id="remote-title">Remote docs</p></main>"#,
        )?;
    Ok(Arc::new(site))
}

pub fn traced_config() -> RunnerConfig {
    let mut config = RunnerConfig::default();
    config.enable_trace(true);
    config
}
