//! ---
//! rc_section: "06-cli"
//! rc_subsection: "binary"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "One-off measurement, alarm and operation commands."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use rulecheck_common::config::HarnessConfig;
use rulecheck_core::OperationLifecycle;
use rulecheck_msg::{inbound_channel, MeasurementKind, Publisher};

use crate::link::Link;

#[derive(Debug, Args)]
pub struct PublishArgs {
    /// motor-state, maintenance-mode or motor-overheated.
    #[arg(long)]
    kind: MeasurementKind,
    #[arg(long, value_parser = clap::value_parser!(i64).range(0..=1))]
    value: i64,
}

#[derive(Debug, Args)]
pub struct ClearAlarmArgs {
    /// Defaults to scenario.alarm_type.
    #[arg(long = "alarm-type", value_name = "TYPE")]
    alarm_type: Option<String>,
}

#[derive(Debug, Args)]
pub struct FinalizeArgs {
    /// Defaults to scenario.operation_fragment.
    #[arg(long, value_name = "FRAGMENT")]
    fragment: Option<String>,
    #[command(flatten)]
    result: FinalizeResult,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct FinalizeResult {
    /// Mark the operation as successful.
    #[arg(long)]
    success: bool,
    /// Failure reason; marks the operation as failed.
    #[arg(long, value_name = "TEXT")]
    reason: Option<String>,
}

async fn with_publisher<F, Fut>(config: &HarnessConfig, action: F) -> Result<ExitCode>
where
    F: FnOnce(Arc<Publisher>) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let (tx, _rx) = inbound_channel();
    let link = Link::live(config, tx).await?;
    let publisher = Arc::new(Publisher::from_config(link.transport.clone(), config)?);
    let outcome = action(publisher).await;
    link.close().await;
    outcome.map(|()| ExitCode::SUCCESS)
}

pub async fn publish(config: &HarnessConfig, args: PublishArgs) -> Result<ExitCode> {
    with_publisher(config, move |publisher| async move {
        let payload = publisher.measurement(args.kind, args.value).await?;
        println!("{payload}");
        Ok(())
    })
    .await
}

pub async fn clear_alarm(config: &HarnessConfig, args: ClearAlarmArgs) -> Result<ExitCode> {
    let alarm_type = args
        .alarm_type
        .unwrap_or_else(|| config.scenario.alarm_type.clone());
    with_publisher(config, move |publisher| async move {
        let payload = publisher.clear_alarm(&alarm_type).await?;
        println!("{payload}");
        Ok(())
    })
    .await
}

pub async fn finalize(config: &HarnessConfig, args: FinalizeArgs) -> Result<ExitCode> {
    let fragment = args
        .fragment
        .unwrap_or_else(|| config.scenario.operation_fragment.clone());
    let succeeded = args.result.success;
    let reason = args.result.reason.unwrap_or_default();
    with_publisher(config, move |publisher| async move {
        OperationLifecycle::new(publisher)
            .finalize(&fragment, succeeded, &reason)
            .await?;
        Ok(())
    })
    .await
}
