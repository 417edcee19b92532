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
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

pub mod cli;
pub mod config;
pub mod config_parse;
pub mod correlate;
pub mod endpoints;
pub mod exec;
pub mod instance;
pub mod logs;
pub mod nginx;
pub mod nginx_conf;
pub mod process;
pub mod watcher;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export the types that make up the engine's public surface.
pub use config::AgentConfig;
pub use config_parse::ConfigContext;
pub use endpoints::{EndpointProber, HttpProber};
pub use exec::{CommandRunner, ShellCommandRunner};
pub use instance::{Instance, InstanceType, InstanceUpdates};
pub use process::{Process, ProcessLister, ProcfsLister};
pub use watcher::{ConfigContextMessage, InstanceUpdatesMessage, Watcher};
