// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::undocumented_unsafe_blocks)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stderr)]

use std::str::FromStr;

use anyhow::Result;
use clap::Parser;
use log::{Level, error, info};
use tokio_util::sync::CancellationToken;

use nginx_discovery::cli::Cli;
use nginx_discovery::endpoints::HttpProber;
use nginx_discovery::exec::ShellCommandRunner;
use nginx_discovery::process::ProcfsLister;
use nginx_discovery::watcher::{ConfigContextMessage, InstanceUpdatesMessage, Watcher};
use nginx_discovery::AgentConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AgentConfig::load(cli.config.as_deref())?;

    let level_name = cli.log_level.as_deref().unwrap_or(&config.log_level);
    let level = Level::from_str(level_name).unwrap_or(Level::Info);
    nginx_agent_log::init(level)?;

    let prober = HttpProber::new(config.probe_timeout());
    let (watcher, updates_rx, contexts_rx) = Watcher::new(
        config,
        Box::new(ProcfsLister),
        Box::new(ShellCommandRunner),
        Box::new(prober),
    );

    if cli.oneshot {
        return oneshot(watcher, updates_rx, contexts_rx);
    }

    let shutdown = CancellationToken::new();
    let watcher_handle = tokio::spawn(watcher.run(shutdown.clone()));
    let updates_handle = tokio::spawn(report_updates(updates_rx));
    let contexts_handle = tokio::spawn(report_contexts(contexts_rx));

    wait_for_shutdown_signal().await;
    shutdown.cancel();

    watcher_handle.await?;
    updates_handle.await?;
    contexts_handle.await?;
    info!("agent stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(err) => {
            error!("cannot install SIGTERM handler: {err}");
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("received interrupt"),
            Err(err) => error!("signal handler failed: {err}"),
        },
    }
}

/// Consumes the instance-delta queue, logging each emission as JSON for
/// downstream collection.
async fn report_updates(mut rx: tokio::sync::mpsc::UnboundedReceiver<InstanceUpdatesMessage>) {
    while let Some(message) = rx.recv().await {
        match serde_json::to_string(&message) {
            Ok(json) => info!(target: "instance_updates", "{json}"),
            Err(err) => error!("cannot serialize instance updates: {err}"),
        }
    }
}

async fn report_contexts(mut rx: tokio::sync::mpsc::UnboundedReceiver<ConfigContextMessage>) {
    while let Some(message) = rx.recv().await {
        match serde_json::to_string(&message) {
            Ok(json) => info!(target: "config_contexts", "{json}"),
            Err(err) => error!("cannot serialize config context: {err}"),
        }
    }
}

/// Runs one reconciliation cycle and prints everything it produced to
/// stdout, one JSON document per line.
fn oneshot(
    mut watcher: Watcher,
    mut updates_rx: tokio::sync::mpsc::UnboundedReceiver<InstanceUpdatesMessage>,
    mut contexts_rx: tokio::sync::mpsc::UnboundedReceiver<ConfigContextMessage>,
) -> Result<()> {
    watcher.cycle();
    while let Ok(message) = updates_rx.try_recv() {
        println!("{}", serde_json::to_string_pretty(&message)?);
    }
    while let Ok(message) = contexts_rx.try_recv() {
        println!("{}", serde_json::to_string_pretty(&message)?);
    }
    Ok(())
}
