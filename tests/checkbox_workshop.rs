mod common;

use browser_steps::{ActionOptions, Arg, Result, Suite, SuiteReport, TestContext, get_by_id};
use common::{ACTIONS_URL, actions_site, init_tracing, traced_config};

fn alias_first_enabled(cx: &mut TestContext, container: &str, name: &str) -> Result<()> {
    cx.get(&format!("{container} [type=\"checkbox\"]"))
        .not("[disabled]")
        .first()
        .as_alias(name)?;
    Ok(())
}

fn checkbox_workshop() -> Suite {
    Suite::new("Checkbox Testing Workshop")
        .before_each(|cx| cx.visit(ACTIONS_URL))
        .describe("Basic Checkbox Operations", |group| {
            group
                .before_each(|cx| {
                    alias_first_enabled(cx, ".action-checkboxes", "checkbox1")?;
                    alias_first_enabled(cx, ".action-check", "checkbox2")
                })
                .it("should check and verify checkbox state", |cx| {
                    cx.get("@checkbox1").check()?;
                    cx.get("@checkbox1").should("be.checked")?;
                    Ok(())
                })
                .it("should uncheck and verify checkbox state", |cx| {
                    cx.get("@checkbox2").check()?;
                    cx.get("@checkbox2").should("be.checked")?.uncheck()?;
                    cx.get("@checkbox2").should("not.be.checked")?;
                    Ok(())
                })
                .it("should check multiple checkboxes by value", |cx| {
                    cx.get(".action-multiple-checkboxes [type=\"checkbox\"]")
                        .as_alias("multipleCheckboxes")?;
                    cx.get("@multipleCheckboxes")
                        .check_with(&["checkbox1", "checkbox2"], ActionOptions::default())?;
                    cx.get("@multipleCheckboxes").should("be.checked")?;
                    Ok(())
                })
                .it("should uncheck multiple checkboxes by value", |cx| {
                    let group = ".action-check [type=\"checkbox\"]";
                    cx.get(group).as_alias("checkGroup")?;
                    cx.get("@checkGroup")
                        .check_with(&["checkbox1", "checkbox3"], ActionOptions::default())?;

                    cx.get(group).filter("[value=\"checkbox1\"]").should("be.checked")?;
                    cx.get(group).filter("[value=\"checkbox3\"]").should("be.checked")?;

                    cx.get("@checkGroup")
                        .uncheck_with(&["checkbox1", "checkbox3"], ActionOptions::default())?;

                    cx.get(group).filter("[value=\"checkbox1\"]").should("not.be.checked")?;
                    cx.get(group).filter("[value=\"checkbox3\"]").should("not.be.checked")?;
                    Ok(())
                })
        })
        .describe("Checkbox State Verification", |group| {
            group
                .before_each(|cx| {
                    alias_first_enabled(cx, ".action-checkboxes", "testCheckbox")?;
                    cx.get(".action-checkboxes")
                        .find("label")
                        .first()
                        .as_alias("checkboxLabel")?;
                    Ok(())
                })
                .it("should verify checkbox is initially unchecked", |cx| {
                    cx.get("@testCheckbox").should("not.be.checked")?;
                    Ok(())
                })
                .it("should verify checkbox attributes and properties", |cx| {
                    cx.get("@testCheckbox")
                        .should_with("have.attr", &["type".into(), "checkbox".into()])?
                        .and("not.be.checked")?
                        .check()?;

                    cx.get("@testCheckbox")
                        .should("be.checked")?
                        .and_with("have.prop", &["checked".into(), true.into()])?;
                    Ok(())
                })
                .it("should verify checkbox label association", |cx| {
                    cx.get("@checkboxLabel").click()?;
                    cx.get("@testCheckbox").should("be.checked")?;
                    Ok(())
                })
        })
        .describe("Edge Cases and Error Handling", |group| {
            group
                .before_each(|cx| {
                    cx.get(".action-checkboxes [disabled]").as_alias("disabledCheckbox")?;
                    cx.get(".action-check [disabled]").as_alias("disabledCheckbox2")?;
                    alias_first_enabled(cx, ".action-checkboxes", "visibleCheckbox")
                })
                .it("should handle disabled checkboxes with force option", |cx| {
                    cx.get("@disabledCheckbox").check_with(&[], ActionOptions::force())?;
                    cx.get("@disabledCheckbox").should("be.checked")?;
                    Ok(())
                })
                .it("should handle unchecking disabled checkboxes with force option", |cx| {
                    cx.get("@disabledCheckbox2").check_with(&[], ActionOptions::force())?;
                    cx.get("@disabledCheckbox2")
                        .should("be.checked")?
                        .uncheck_with(&[], ActionOptions::force())?;
                    cx.get("@disabledCheckbox2").should("not.be.checked")?;
                    Ok(())
                })
                .it("should verify checkbox visibility before interaction", |cx| {
                    cx.get("@visibleCheckbox")
                        .should("be.visible")?
                        .and("not.be.checked")?
                        .check()?;
                    cx.get("@visibleCheckbox").should("be.checked")?;
                    Ok(())
                })
        })
        .describe("Advanced Checkbox Testing", |group| {
            group
                .before_each(|cx| alias_first_enabled(cx, ".action-checkboxes", "advancedCheckbox"))
                .it("should test checkbox with custom commands", |cx| {
                    cx.register("toggleCheckbox", |cx, selector, _args| {
                        let target = selector.to_string();
                        cx.get(selector).then(move |cx, checkbox| {
                            if checkbox.is_empty() {
                                return Ok(());
                            }
                            if cx.get(&target).is(":checked")? {
                                cx.get(&target).uncheck()?;
                            } else {
                                cx.get(&target).check()?;
                            }
                            Ok(())
                        })?;
                        Ok(None)
                    });

                    cx.invoke("toggleCheckbox", "@advancedCheckbox", &[])?;
                    cx.get("@advancedCheckbox").should("be.checked")?;

                    cx.invoke("toggleCheckbox", "@advancedCheckbox", &[])?;
                    cx.get("@advancedCheckbox").should("not.be.checked")?;
                    Ok(())
                })
                .it("should test checkbox change events", |cx| {
                    cx.get("@advancedCheckbox").check()?;
                    cx.get("@advancedCheckbox")
                        .should("be.checked")?
                        .and_with("have.prop", &["checked".into(), true.into()])?
                        .and_with("have.attr", &["type".into(), "checkbox".into()])?;

                    let changes = cx
                        .events()
                        .iter()
                        .filter(|record| record.event == "change")
                        .count();
                    assert_eq!(changes, 1);
                    Ok(())
                })
                .it("should test checkbox accessibility", |cx| {
                    cx.get("@advancedCheckbox").focus()?.type_text(" ")?;
                    cx.get("@advancedCheckbox").should("be.checked")?.type_text(" ")?;
                    cx.get("@advancedCheckbox").should("not.be.checked")?;
                    Ok(())
                })
        })
        .describe("Checkbox Form Integration", |group| {
            group
                .before_each(|cx| {
                    alias_first_enabled(cx, ".action-checkboxes", "formCheckbox")?;
                    cx.get(".action-multiple-checkboxes [type=\"checkbox\"]")
                        .as_alias("conditionalCheckboxes")?;
                    Ok(())
                })
                .it("should test checkbox in form submission", |cx| {
                    cx.get("@formCheckbox").check()?;
                    cx.get("@formCheckbox").should("be.checked")?;
                    cx.get("@formCheckbox")
                        .should_with("have.prop", &["checked".into(), true.into()])?
                        .and("be.visible")?;
                    Ok(())
                })
                .it("should test conditional checkbox behavior", |cx| {
                    cx.get("@conditionalCheckboxes")
                        .check_with(&["checkbox1"], ActionOptions::default())?;
                    cx.get("@conditionalCheckboxes").should("be.checked")?;

                    cx.get("@conditionalCheckboxes")
                        .check_with(&["checkbox2"], ActionOptions::default())?;
                    cx.get("@conditionalCheckboxes").should("be.checked")?;
                    Ok(())
                })
        })
}

fn assert_all_passed(report: &SuiteReport) {
    assert!(report.is_success(), "{report}");
}

#[test]
fn checkbox_workshop_suite_passes() -> Result<()> {
    init_tracing();
    let suite = checkbox_workshop();
    assert_eq!(suite.case_count(), 15);

    let report = suite.run(actions_site()?, &traced_config());
    assert_all_passed(&report);
    assert_eq!(report.passed(), 15);
    Ok(())
}

#[test]
fn every_case_starts_from_a_fresh_page() -> Result<()> {
    init_tracing();
    let report = checkbox_workshop().run(actions_site()?, &traced_config());
    for case in &report.cases {
        assert!(
            case.command_log
                .first()
                .is_some_and(|line| line == &format!("[visit] {ACTIONS_URL}")),
            "{} did not start with a visit: {:?}",
            case.title,
            case.command_log
        );
    }
    Ok(())
}

fn workshop_with_follow_up_case() -> Suite {
    checkbox_workshop().describe("After Advanced", |group| {
        group
            .before_each(|cx| alias_first_enabled(cx, ".action-checkboxes", "laterCheckbox"))
            .it("toggles with the command registered earlier", |cx| {
                cx.invoke("toggleCheckbox", "@laterCheckbox", &[])?;
                cx.get("@laterCheckbox").should("be.checked")?;
                Ok(())
            })
    })
}

#[test]
fn custom_command_stays_registered_for_later_cases() -> Result<()> {
    init_tracing();
    let report = workshop_with_follow_up_case().run(actions_site()?, &traced_config());
    assert_all_passed(&report);
    assert_eq!(report.passed(), 16);
    Ok(())
}

#[test]
fn isolated_runs_drop_custom_commands_after_their_case() -> Result<()> {
    init_tracing();
    let mut config = traced_config();
    config.set_isolate_case_commands(true);
    let report = workshop_with_follow_up_case().run(actions_site()?, &config);

    assert_eq!(report.passed(), 15);
    let follow_up = report
        .case("toggles with the command registered earlier")
        .map(|case| case.outcome.clone());
    assert_eq!(
        follow_up,
        Some(Err(browser_steps::Error::CommandNotFound("toggleCheckbox".into())))
    );
    Ok(())
}

#[test]
fn click_action_workshop_focuses_by_id() -> Result<()> {
    init_tracing();
    let report = Suite::new("Click Actions")
        .command("getById", get_by_id)
        .it("clicks the focus field by id", |cx| {
            cx.visit(ACTIONS_URL)?;
            cx.invoke("getById", "focus", &[])?.click()?;
            cx.invoke("getById", "focus", &[])?
                .should("have.focus")?
                .and_with("have.attr", &[Arg::from("placeholder"), Arg::from("Focus")])?;
            Ok(())
        })
        .run(actions_site()?, &traced_config());
    assert_all_passed(&report);
    Ok(())
}

#[test]
fn failing_step_reports_the_case_and_keeps_running() -> Result<()> {
    init_tracing();
    let report = Suite::new("Failures")
        .before_each(|cx| cx.visit(ACTIONS_URL))
        .it("checks a disabled box without force", |cx| {
            cx.get(".action-check [disabled]").check()?;
            Ok(())
        })
        .it("still runs afterwards", |cx| {
            cx.get(".action-check [disabled]").should("not.be.checked")?;
            Ok(())
        })
        .run(actions_site()?, &traced_config());

    assert_eq!(report.passed(), 1);
    let failure = report.failures().next().map(|case| case.outcome.clone());
    assert!(matches!(
        failure,
        Some(Err(browser_steps::Error::NotActionable { reason, .. })) if reason.contains("disabled")
    ));
    Ok(())
}
