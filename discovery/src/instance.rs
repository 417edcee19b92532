// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Tracked instances, their stable identities, and the snapshot diff.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceType {
    Nginx,
    NginxPlus,
    Agent,
    AppProtect,
}

impl InstanceType {
    /// Instance kinds whose configuration file the parser understands.
    pub fn is_nginx_family(self) -> bool {
        matches!(self, InstanceType::Nginx | InstanceType::NginxPlus)
    }
}

/// One tracked running software unit. The identity is stable across pid
/// changes; the runtime fields describe the currently observed processes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instance {
    pub id: String,
    pub kind: InstanceType,
    pub version: String,
    pub pid: i32,
    pub exe_path: String,
    pub config_path: String,
    pub prefix: String,
    pub child_pids: Vec<i32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub loadable_modules: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub builtin_modules: Vec<String>,
    /// Log targets discovered by the last config parse.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub log_paths: Vec<String>,
    /// stub_status / Plus API URLs discovered by the last config parse.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<String>,
}

impl Instance {
    /// Folds a sibling observation with the same identity into this one
    /// (orphaned workers that hash to the same binary/config/prefix).
    pub fn merge(&mut self, other: Instance) {
        if self.pid == 0 {
            self.pid = other.pid;
        }
        self.child_pids.extend(other.child_pids);
        self.child_pids.sort_unstable();
        self.child_pids.dedup();
    }
}

/// Stable identity for the (executable, config file, install prefix) triple.
/// Same triple, same identity, regardless of pids, restarts, or reloads.
pub fn instance_id(exe_path: &str, config_path: &str, prefix: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{exe_path}_{config_path}_{prefix}"));
    hex::encode(hasher.finalize())
}

/// Output contract of one reconciliation cycle: three disjoint lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InstanceUpdates {
    pub new: Vec<Instance>,
    pub updated: Vec<Instance>,
    pub deleted: Vec<Instance>,
}

impl InstanceUpdates {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Full-snapshot diff. An instance counts as updated only when its master
/// pid or its *set* of child pids changed; re-observing the same shape does
/// not produce an update. Lists are sorted by identity for stable output.
pub fn diff_snapshots(
    previous: &HashMap<String, Instance>,
    current: &HashMap<String, Instance>,
) -> InstanceUpdates {
    let mut updates = InstanceUpdates::default();

    for (id, instance) in current {
        match previous.get(id) {
            None => updates.new.push(instance.clone()),
            Some(old) => {
                let old_children: HashSet<i32> = old.child_pids.iter().copied().collect();
                let new_children: HashSet<i32> = instance.child_pids.iter().copied().collect();
                if old.pid != instance.pid || old_children != new_children {
                    updates.updated.push(instance.clone());
                }
            }
        }
    }

    for (id, instance) in previous {
        if !current.contains_key(id) {
            updates.deleted.push(instance.clone());
        }
    }

    updates.new.sort_by(|a, b| a.id.cmp(&b.id));
    updates.updated.sort_by(|a, b| a.id.cmp(&b.id));
    updates.deleted.sort_by(|a, b| a.id.cmp(&b.id));
    updates
}

/// The agent reports itself alongside what it monitors.
pub fn agent_instance() -> Instance {
    let exe_path = std::env::current_exe()
        .ok()
        .and_then(|p| p.to_str().map(str::to_string))
        .unwrap_or_default();
    let pid = i32::try_from(std::process::id()).unwrap_or(0);
    Instance {
        id: instance_id(&exe_path, "", ""),
        kind: InstanceType::Agent,
        version: env!("CARGO_PKG_VERSION").to_string(),
        pid,
        exe_path,
        config_path: String::new(),
        prefix: String::new(),
        child_pids: Vec::new(),
        loadable_modules: Vec::new(),
        builtin_modules: Vec::new(),
        log_paths: Vec::new(),
        endpoints: Vec::new(),
    }
}

/// NGINX App Protect has no process of its own to correlate; its presence
/// is signalled by a version marker file.
pub fn app_protect_instance(marker: &Path) -> Option<Instance> {
    let version = std::fs::read_to_string(marker).ok()?.trim().to_string();
    let marker_path = marker.to_str().unwrap_or_default().to_string();
    Some(Instance {
        id: instance_id(&marker_path, "", ""),
        kind: InstanceType::AppProtect,
        version,
        pid: 0,
        exe_path: String::new(),
        config_path: marker_path,
        prefix: String::new(),
        child_pids: Vec::new(),
        loadable_modules: Vec::new(),
        builtin_modules: Vec::new(),
        log_paths: Vec::new(),
        endpoints: Vec::new(),
    })
}
