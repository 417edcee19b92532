// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Shared fakes and fixtures for the unit tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::endpoints::EndpointProber;
use crate::exec::{CommandRunner, ExecError};
use crate::instance::{Instance, InstanceType};
use crate::process::{Process, ProcessLister};

/// A typical `nginx -V` output for an open-source build.
pub const OSS_VERSION_OUTPUT: &str = "nginx version: nginx/1.25.3\n\
built by gcc 12.2.0 (Debian 12.2.0-14)\n\
built with OpenSSL 3.0.11 19 Sep 2023\n\
TLS SNI support enabled\n\
configure arguments: --prefix=/usr/local/nginx \
--conf-path=/usr/local/etc/nginx/nginx.conf \
--with-http_stub_status_module --with-http_ssl_module\n";

/// The same build identifying as NGINX Plus.
pub const PLUS_VERSION_OUTPUT: &str = "nginx version: nginx/1.25.3 (nginx-plus-r31)\n\
built by gcc 12.2.0 (Debian 12.2.0-14)\n\
built with OpenSSL 3.0.11 19 Sep 2023\n\
TLS SNI support enabled\n\
configure arguments: --prefix=/usr/local/nginx \
--conf-path=/usr/local/etc/nginx/nginx.conf \
--with-http_stub_status_module --with-http_ssl_module\n";

/// The OSS output rewritten to point at a test-owned config file.
pub fn oss_output_with_conf(conf: &Path) -> String {
    OSS_VERSION_OUTPUT.replace(
        "--conf-path=/usr/local/etc/nginx/nginx.conf",
        &format!("--conf-path={}", conf.display()),
    )
}

pub fn make_process(pid: i32, ppid: i32, cmdline: &str) -> Process {
    Process {
        pid,
        ppid,
        name: "nginx".to_string(),
        cmdline: cmdline.to_string(),
        exe: "/usr/sbin/nginx".to_string(),
    }
}

pub fn make_instance(id: &str, pid: i32, children: &[i32]) -> Instance {
    Instance {
        id: id.to_string(),
        kind: InstanceType::Nginx,
        version: "1.25.3".to_string(),
        pid,
        exe_path: "/usr/sbin/nginx".to_string(),
        config_path: "/etc/nginx/nginx.conf".to_string(),
        prefix: "/usr/local/nginx".to_string(),
        child_pids: children.to_vec(),
        loadable_modules: Vec::new(),
        builtin_modules: Vec::new(),
        log_paths: Vec::new(),
        endpoints: Vec::new(),
    }
}

pub fn make_instance_with_config(id: &str, conf: &Path) -> Instance {
    let mut instance = make_instance(id, 1, &[]);
    instance.config_path = conf.display().to_string();
    instance
}

/// Writes an nginx.conf under `dir` and returns its path.
pub fn write_config(dir: &Path, text: &str) -> PathBuf {
    let path = dir.join("nginx.conf");
    std::fs::write(&path, text).unwrap();
    path
}

/// Canned-output command runner. Unknown programs fail the way a missing
/// binary does.
#[derive(Default)]
pub struct FakeRunner {
    outputs: HashMap<String, String>,
}

impl FakeRunner {
    pub fn insert(&mut self, program: &str, output: &str) {
        self.outputs.insert(program.to_string(), output.to_string());
    }
}

impl CommandRunner for FakeRunner {
    fn output(&self, program: &str, _args: &[&str], _timeout: Duration) -> Result<String, ExecError> {
        self.outputs
            .get(program)
            .cloned()
            .ok_or_else(|| ExecError::Spawn {
                program: program.to_string(),
                source: io::Error::from(io::ErrorKind::NotFound),
            })
    }
}

/// Canned-body endpoint prober. Unknown URLs behave like unreachable hosts.
#[derive(Default)]
pub struct FakeProber {
    bodies: HashMap<String, String>,
}

impl FakeProber {
    pub fn insert(&mut self, url: &str, body: &str) {
        self.bodies.insert(url.to_string(), body.to_string());
    }
}

impl EndpointProber for FakeProber {
    fn get(&self, url: &str) -> Option<String> {
        self.bodies.get(url).cloned()
    }
}

/// Fixed process snapshot.
pub struct FakeLister {
    processes: Vec<Process>,
}

impl FakeLister {
    pub fn new(processes: Vec<Process>) -> Self {
        FakeLister { processes }
    }
}

impl ProcessLister for FakeLister {
    fn list(&self) -> io::Result<Vec<Process>> {
        Ok(self.processes.clone())
    }
}
