//! `acctest run` - execute lifecycle cases from suite files

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use lifecycle::{Harness, RunReport};
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;

use crate::Context;
use crate::cli::RunArgs;
use crate::suite;
use crate::ui;

/// Reports for one suite file
#[derive(Debug, Serialize)]
pub struct SuiteReport {
    pub suite: String,
    pub reports: Vec<RunReport>,
}

pub fn run(ctx: &Context, args: &RunArgs) -> Result<ExitCode> {
    let suites = suite::load_all(&args.paths)?;
    let mut results = Vec::with_capacity(suites.len());

    for suite in &suites {
        let cases = suite.cases(args.filter.as_deref());
        if cases.is_empty() {
            log::info!("{}: no matching cases", suite.path.display());
            continue;
        }

        // Fresh sandbox state per suite
        let provider = suite
            .context()
            .with_context(|| format!("Could not set up {}", suite.path.display()))?;
        let harness = Harness::new(Arc::new(provider));

        let reports = harness.run_all(&cases, args.jobs)?;
        results.push(SuiteReport {
            suite: suite.path.display().to_string(),
            reports,
        });
    }

    let total: usize = results.iter().map(|r| r.reports.len()).sum();
    let failed: usize = results
        .iter()
        .flat_map(|r| &r.reports)
        .filter(|report| !report.is_success())
        .count();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_results(ctx, &results);
        print_summary(total, failed);
    }

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_results(ctx: &Context, results: &[SuiteReport]) {
    for result in results {
        if !ctx.quiet {
            ui::section(&result.suite);
        }
        for report in &result.reports {
            print_report(ctx, report);
        }
    }
}

fn print_report(ctx: &Context, report: &RunReport) {
    let timing = format!("({})", ui::format_elapsed(report.elapsed_ms)).dimmed();

    if report.is_success() {
        if !ctx.quiet {
            ui::success(&format!("{} {timing}", report.case));
        }
    } else {
        ui::error(&format!("{} {timing}", report.case.bold()));
        ui::kv("outcome", &report.outcome.to_string());
        if let Some(teardown) = &report.teardown_error {
            ui::kv("teardown", &teardown.to_string());
        }
        if let Some(secondary) = &report.secondary {
            ui::kv("also", &secondary.to_string());
        }
    }

    if ctx.verbose > 0 {
        let phases: Vec<String> = report.phases.iter().map(ToString::to_string).collect();
        ui::dim(&phases.join(" → "));
    }
}

fn print_summary(total: usize, failed: usize) {
    println!();
    if total == 0 {
        ui::warn("No cases matched");
    } else if failed == 0 {
        ui::success(&format!("{total} passed"));
    } else {
        ui::error(&format!("{failed} of {total} failed"));
    }
}
