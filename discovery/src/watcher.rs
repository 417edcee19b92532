// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! The instance watcher: a single control loop that re-enumerates
//! processes on a fixed interval, reconciles the instance snapshot, and
//! parses configuration for new or updated NGINX instances.
//!
//! The watcher exclusively owns the snapshot and the config-context cache;
//! both are replaced wholesale, never shared across cycles. One cycle runs
//! to completion before the next tick is processed.

use std::collections::HashMap;

use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::config_parse::{self, ConfigContext};
use crate::correlate::{self, ProcessGroup};
use crate::endpoints::EndpointProber;
use crate::exec::CommandRunner;
use crate::instance::{
    self, Instance, InstanceType, InstanceUpdates, agent_instance, app_protect_instance,
    diff_snapshots,
};
use crate::nginx;
use crate::nginx_conf::ParseError;
use crate::process::{Process, ProcessLister};

/// One reconciliation cycle's instance delta, with a correlation id for
/// tracing the emission downstream.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceUpdatesMessage {
    pub correlation_id: Uuid,
    pub updates: InstanceUpdates,
}

/// The parsed log/endpoint metadata for a single instance.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigContextMessage {
    pub correlation_id: Uuid,
    pub context: ConfigContext,
}

#[derive(Error, Debug)]
pub enum ReparseError {
    #[error("no cached instance with id {id}")]
    UnknownInstance { id: String },
    #[error(transparent)]
    Parse(#[from] ParseError),
}

pub struct Watcher {
    config: AgentConfig,
    lister: Box<dyn ProcessLister>,
    runner: Box<dyn CommandRunner>,
    prober: Box<dyn EndpointProber>,
    snapshot: HashMap<String, Instance>,
    contexts: HashMap<String, ConfigContext>,
    updates_tx: mpsc::UnboundedSender<InstanceUpdatesMessage>,
    contexts_tx: mpsc::UnboundedSender<ConfigContextMessage>,
}

impl Watcher {
    /// Builds the watcher with its capabilities and returns the receivers
    /// for the two output queues.
    pub fn new(
        config: AgentConfig,
        lister: Box<dyn ProcessLister>,
        runner: Box<dyn CommandRunner>,
        prober: Box<dyn EndpointProber>,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<InstanceUpdatesMessage>,
        mpsc::UnboundedReceiver<ConfigContextMessage>,
    ) {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (contexts_tx, contexts_rx) = mpsc::unbounded_channel();
        (
            Watcher {
                config,
                lister,
                runner,
                prober,
                snapshot: HashMap::new(),
                contexts: HashMap::new(),
                updates_tx,
                contexts_tx,
            },
            updates_rx,
            contexts_rx,
        )
    }

    /// Drives the periodic reconciliation loop until cancellation. The
    /// output queues close exactly once, when the watcher is dropped on
    /// return.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            "instance watcher started, polling every {:?}",
            self.config.poll_interval()
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("instance watcher shutting down");
                    return;
                }
                _ = ticker.tick() => self.cycle(),
            }
        }
    }

    /// One reconciliation cycle: poll, correlate, extract, diff, emit,
    /// parse configs for new/updated NGINX instances.
    pub fn cycle(&mut self) {
        let processes = match self.lister.list() {
            Ok(processes) => processes,
            Err(err) => {
                warn!("process listing failed, skipping cycle: {err}");
                return;
            }
        };

        let current = self.build_snapshot(&processes);
        let updates = diff_snapshots(&self.snapshot, &current);
        self.snapshot = current;

        if updates.is_empty() {
            debug!("no instance changes in this cycle");
            return;
        }

        let to_parse: Vec<Instance> = updates
            .new
            .iter()
            .chain(updates.updated.iter())
            .filter(|i| i.kind.is_nginx_family())
            .cloned()
            .collect();

        info!(
            "instances changed: {} new, {} updated, {} deleted",
            updates.new.len(),
            updates.updated.len(),
            updates.deleted.len()
        );
        let _ = self.updates_tx.send(InstanceUpdatesMessage {
            correlation_id: Uuid::new_v4(),
            updates,
        });

        for instance in to_parse {
            self.parse_and_emit(&instance);
        }
    }

    /// Re-parses the configuration of one cached instance out of band. An
    /// unchanged Config Context emits nothing; a changed one replaces the
    /// cache entry and synthesizes an "updated" instance message carrying
    /// the refreshed log/endpoint fields.
    pub fn reparse(&mut self, instance_id: &str) -> Result<(), ReparseError> {
        let instance =
            self.snapshot
                .get(instance_id)
                .cloned()
                .ok_or_else(|| ReparseError::UnknownInstance {
                    id: instance_id.to_string(),
                })?;

        let context = config_parse::parse_config(&instance, &self.config, self.prober.as_ref())?;
        if self.contexts.get(instance_id) == Some(&context) {
            debug!("reparse of {instance_id} produced an identical config context");
            return Ok(());
        }

        self.store_context(instance_id, context.clone());
        let _ = self.contexts_tx.send(ConfigContextMessage {
            correlation_id: Uuid::new_v4(),
            context,
        });
        if let Some(refreshed) = self.snapshot.get(instance_id) {
            let _ = self.updates_tx.send(InstanceUpdatesMessage {
                correlation_id: Uuid::new_v4(),
                updates: InstanceUpdates {
                    updated: vec![refreshed.clone()],
                    ..InstanceUpdates::default()
                },
            });
        }
        Ok(())
    }

    fn build_snapshot(&self, processes: &[Process]) -> HashMap<String, Instance> {
        let mut snapshot = HashMap::new();

        let agent = agent_instance();
        snapshot.insert(agent.id.clone(), agent);

        if let Some(nap) = app_protect_instance(&self.config.app_protect_version_file) {
            snapshot.insert(nap.id.clone(), nap);
        }

        for group in correlate::correlate(processes) {
            match self.instance_from_group(&group) {
                Some(instance) => {
                    // Orphaned workers sharing a binary/config/prefix hash
                    // to the same identity and merge.
                    match snapshot.entry(instance.id.clone()) {
                        std::collections::hash_map::Entry::Occupied(mut entry) => {
                            entry.get_mut().merge(instance);
                        }
                        std::collections::hash_map::Entry::Vacant(entry) => {
                            entry.insert(instance);
                        }
                    }
                }
                None => {
                    // Transient extraction failure: keep the previous entry
                    // for this master rather than flapping it to deleted.
                    if let Some(previous) = self
                        .snapshot
                        .values()
                        .find(|i| group.pid() != 0 && i.pid == group.pid())
                    {
                        warn!(
                            "keeping previous instance {} after a failed info read",
                            previous.id
                        );
                        snapshot.insert(previous.id.clone(), previous.clone());
                    }
                }
            }
        }

        snapshot
    }

    fn instance_from_group(&self, group: &ProcessGroup) -> Option<Instance> {
        let timeout = self.config.probe_timeout();
        let info = match nginx::extract(group.exe_hint(), self.runner.as_ref(), timeout) {
            Ok(info) => info,
            Err(err) => {
                debug!("skipping process group (pid {}): {err}", group.pid());
                return None;
            }
        };

        let id = instance::instance_id(&info.exe_path, &info.conf_path, &info.prefix);
        let mut child_pids = group.worker_pids();
        child_pids.sort_unstable();

        Some(Instance {
            kind: if info.plus {
                InstanceType::NginxPlus
            } else {
                InstanceType::Nginx
            },
            version: info.version,
            pid: group.pid(),
            exe_path: info.exe_path,
            config_path: info.conf_path,
            prefix: info.prefix,
            child_pids,
            loadable_modules: info.loadable_modules,
            builtin_modules: info.builtin_modules,
            log_paths: self
                .contexts
                .get(&id)
                .map(ConfigContext::log_paths)
                .unwrap_or_default(),
            endpoints: self
                .contexts
                .get(&id)
                .map(ConfigContext::endpoint_urls)
                .unwrap_or_default(),
            id,
        })
    }

    fn parse_and_emit(&mut self, instance: &Instance) {
        match config_parse::parse_config(instance, &self.config, self.prober.as_ref()) {
            Ok(context) => {
                self.store_context(&instance.id, context.clone());
                let _ = self.contexts_tx.send(ConfigContextMessage {
                    correlation_id: Uuid::new_v4(),
                    context,
                });
            }
            Err(err) => {
                warn!("config parse failed for instance {}: {err}", instance.id);
            }
        }
    }

    /// Replaces the cached context for an identity and refreshes the
    /// snapshot entry's discovered log/endpoint summary.
    fn store_context(&mut self, instance_id: &str, context: ConfigContext) {
        if let Some(entry) = self.snapshot.get_mut(instance_id) {
            entry.log_paths = context.log_paths();
            entry.endpoints = context.endpoint_urls();
        }
        self.contexts.insert(instance_id.to_string(), context);
    }

    /// Cached context for an identity, if any. Exposed for the on-demand
    /// reparse path and tests.
    pub fn context(&self, instance_id: &str) -> Option<&ConfigContext> {
        self.contexts.get(instance_id)
    }

    pub fn snapshot(&self) -> &HashMap<String, Instance> {
        &self.snapshot
    }
}
