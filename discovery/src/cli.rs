// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::PathBuf;

use clap::Parser;

/// Host agent that discovers running NGINX instances and reports their
/// configuration metadata.
#[derive(Debug, Parser)]
#[command(name = "nginx-discovery-agent", version, about)]
pub struct Cli {
    /// Path to the agent configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level override (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Run a single reconciliation cycle, print the results, and exit.
    #[arg(long)]
    pub oneshot: bool,
}
