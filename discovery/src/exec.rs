// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Subprocess execution capability with a hard deadline. Used for the
//! `nginx -V` introspection call and the `command -v` executable lookup.

use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} did not exit within {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error("i/o error while running {program}: {source}")]
    Io {
        program: String,
        source: std::io::Error,
    },
}

/// Capability trait for running a command and capturing its combined
/// stdout and stderr, subject to a timeout.
pub trait CommandRunner: Send + Sync {
    fn output(&self, program: &str, args: &[&str], timeout: Duration) -> Result<String, ExecError>;
}

/// Runs the command as a child process, polling for exit and killing it if
/// the deadline passes. Output is read only after exit, which is fine for
/// the small outputs this agent deals in (`nginx -V` is a few hundred bytes).
pub struct ShellCommandRunner;

impl CommandRunner for ShellCommandRunner {
    fn output(&self, program: &str, args: &[&str], timeout: Duration) -> Result<String, ExecError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!("{program} exited with {status}");
                    break;
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ExecError::Timeout {
                            program: program.to_string(),
                            timeout,
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(source) => {
                    let _ = child.kill();
                    return Err(ExecError::Io {
                        program: program.to_string(),
                        source,
                    });
                }
            }
        }

        let output = child.wait_with_output().map_err(|source| ExecError::Io {
            program: program.to_string(),
            source,
        })?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(combined)
    }
}
