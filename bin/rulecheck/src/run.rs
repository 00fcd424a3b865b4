//! ---
//! rc_section: "06-cli"
//! rc_subsection: "binary"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Scenario suite execution and reporting."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use prometheus::{Registry, TextEncoder};
use rulecheck_common::config::HarnessConfig;
use rulecheck_common::SystemClock;
use rulecheck_core::scenario::select;
use rulecheck_core::{
    motor_overheat_catalog, OperationInbox, OperationStore, Outcome, Scenario, ScenarioDriver,
    SuiteReport, SuiteRunner,
};
use rulecheck_msg::{inbound_channel, MessagingMetricsExporter, Publisher};

use crate::link::Link;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Scenario to run by name; repeatable. Defaults to every loaded scenario.
    #[arg(long = "scenario", value_name = "NAME")]
    scenarios: Vec<String>,

    /// YAML file with additional scenarios; repeatable.
    #[arg(long = "scenario-file", value_name = "FILE")]
    scenario_files: Vec<PathBuf>,

    /// Run against the in-process simulated platform instead of the broker.
    #[arg(long)]
    simulate: bool,

    /// Write the JSON run report to FILE.
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Print messaging metrics in Prometheus text format after the run.
    #[arg(long)]
    metrics: bool,
}

pub fn list() {
    for scenario in motor_overheat_catalog() {
        println!(
            "{:<45} {:<9} {}",
            scenario.name,
            scenario.expect.as_str(),
            scenario.description
        );
    }
}

/// Scenarios to run: the named ones, else the file scenarios, else the catalog.
fn resolve_scenarios(args: &RunArgs) -> Result<Vec<Scenario>> {
    let mut from_files = Vec::new();
    for path in &args.scenario_files {
        from_files.extend(Scenario::load_file(path)?);
    }
    if args.scenarios.is_empty() && !from_files.is_empty() {
        return Ok(from_files);
    }
    let mut available = motor_overheat_catalog();
    available.extend(from_files);
    Ok(select(&available, &args.scenarios)?)
}

pub async fn execute(config: HarnessConfig, args: RunArgs) -> Result<ExitCode> {
    let scenarios = resolve_scenarios(&args)?;

    let registry = Registry::new();
    let exporter = MessagingMetricsExporter::register(&registry)?;
    let (tx, rx) = inbound_channel();
    let link = Link::open(&config, args.simulate, tx).await?;

    let publisher = Arc::new(
        Publisher::from_config(link.transport.clone(), &config)?.with_exporter(exporter.clone()),
    );
    let store = Arc::new(OperationStore::with_exporter(exporter));
    let driver = ScenarioDriver::new(
        publisher,
        OperationInbox::new(rx, store),
        config.scenario.clone(),
        Arc::new(SystemClock),
    );
    let mut runner = SuiteRunner::new(driver);
    let outcome = runner.run(&scenarios).await;
    link.close().await;
    let report = outcome?;

    print_summary(&report);
    if let Some(path) = &args.report {
        fs::write(path, report.to_json()?)
            .with_context(|| format!("unable to write report {}", path.display()))?;
    }
    if args.metrics {
        print!("{}", TextEncoder::new().encode_to_string(&registry.gather())?);
    }

    Ok(if report.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_summary(report: &SuiteReport) {
    println!("run {}", report.run_id);
    for entry in &report.scenarios {
        let label = match entry.verdict.outcome {
            Outcome::Pass => "PASS",
            Outcome::QualifiedPass => "PASS*",
            Outcome::Fail => "FAIL",
        };
        println!(
            "{label:<6} {:<45} {:>8}ms  {}",
            entry.verdict.scenario, entry.duration_ms, entry.verdict.reason
        );
    }
    println!(
        "{} passed, {} qualified, {} failed",
        report.passed, report.qualified, report.failed
    );
}
