// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Correlates a flat process snapshot into NGINX master/worker groups.
//!
//! NGINX rewrites its command line, so classification goes by the process
//! title: the supervising process reads "nginx: master process <argv>" and
//! each request handler "nginx: worker process". Workers are attached to
//! their parent when it is present in the same snapshot; workers whose
//! parent vanished (mid-reload races, binary upgrades) form their own
//! minimal group so the instance is not lost for the cycle.

use std::collections::HashMap;

use crate::process::Process;

const MASTER_TITLE: &str = "nginx: master process";
const WORKER_TITLE: &str = "nginx: worker process";

/// One correlated unit: a master with its workers, or (for orphans) a
/// masterless group holding a single worker.
#[derive(Debug, Clone)]
pub struct ProcessGroup {
    pub master: Option<Process>,
    pub workers: Vec<Process>,
}

impl ProcessGroup {
    /// Pid reported for the resulting instance: the master pid, or zero for
    /// an orphaned worker with no master to represent.
    pub fn pid(&self) -> i32 {
        self.master.as_ref().map_or(0, |m| m.pid)
    }

    /// Best available executable path hint: the master's, else the first
    /// worker's (workers share the master's binary).
    pub fn exe_hint(&self) -> &str {
        if let Some(master) = &self.master {
            return &master.exe;
        }
        self.workers.first().map_or("", |w| w.exe.as_str())
    }

    pub fn worker_pids(&self) -> Vec<i32> {
        self.workers.iter().map(|w| w.pid).collect()
    }
}

pub fn is_worker(process: &Process) -> bool {
    process.cmdline.starts_with(WORKER_TITLE)
}

pub fn is_master(process: &Process) -> bool {
    process.cmdline.starts_with(MASTER_TITLE) && !is_worker(process)
}

/// Builds master/worker groups from one snapshot. Workers whose parent is
/// present but not itself a recognized master (cache manager restarts,
/// processes we cannot classify) are reparented and yield no group of their
/// own, matching the instance-per-master model.
pub fn correlate(processes: &[Process]) -> Vec<ProcessGroup> {
    let present: HashMap<i32, &Process> = processes.iter().map(|p| (p.pid, p)).collect();

    let mut children: HashMap<i32, Vec<Process>> = HashMap::new();
    let mut orphans: Vec<Process> = Vec::new();
    for process in processes.iter().filter(|p| is_worker(p)) {
        if present.contains_key(&process.ppid) {
            children
                .entry(process.ppid)
                .or_default()
                .push(process.clone());
        } else {
            orphans.push(process.clone());
        }
    }

    let mut groups: Vec<ProcessGroup> = processes
        .iter()
        .filter(|p| is_master(p))
        .map(|master| ProcessGroup {
            workers: children.remove(&master.pid).unwrap_or_default(),
            master: Some(master.clone()),
        })
        .collect();

    // Each orphan becomes a minimal group; identity-based merging of
    // sibling orphans happens later, once identities are computed.
    groups.extend(orphans.into_iter().map(|worker| ProcessGroup {
        master: None,
        workers: vec![worker],
    }));

    groups
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::test_utils::make_process;

    #[test]
    fn test_master_with_two_workers() {
        let processes = vec![
            make_process(1234, 1, "nginx: master process /usr/sbin/nginx"),
            make_process(789, 1234, "nginx: worker process"),
            make_process(567, 1234, "nginx: worker process"),
        ];
        let groups = correlate(&processes);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].pid(), 1234);
        let mut pids = groups[0].worker_pids();
        pids.sort_unstable();
        assert_eq!(pids, vec![567, 789]);
    }

    #[test]
    fn test_orphan_workers_get_zero_pid_groups() {
        let processes = vec![
            make_process(789, 999, "nginx: worker process"),
            make_process(567, 999, "nginx: worker process"),
        ];
        let groups = correlate(&processes);
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.pid() == 0));
        assert!(groups.iter().all(|g| g.workers.len() == 1));
    }

    #[test]
    fn test_worker_under_unrecognized_parent_yields_nothing() {
        // Parent present but its title does not match the master pattern
        // (e.g. "nginx: cache manager process"): the worker is reparented
        // and no group is created.
        let processes = vec![
            make_process(1000, 1, "nginx: cache manager process"),
            make_process(1001, 1000, "nginx: worker process"),
        ];
        assert!(correlate(&processes).is_empty());
    }

    #[test]
    fn test_master_without_workers_still_grouped() {
        let processes = vec![make_process(42, 1, "nginx: master process nginx")];
        let groups = correlate(&processes);
        assert_eq!(groups.len(), 1);
        assert!(groups[0].workers.is_empty());
    }

    #[test]
    fn test_unrelated_processes_ignored() {
        let processes = vec![
            make_process(2, 1, "/usr/bin/bash"),
            make_process(3, 1, "python3 app.py"),
        ];
        assert!(correlate(&processes).is_empty());
    }

    #[test]
    fn test_worker_title_is_not_master() {
        let worker = make_process(5, 1, "nginx: worker process");
        assert!(is_worker(&worker));
        assert!(!is_master(&worker));
    }
}
