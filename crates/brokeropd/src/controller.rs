//! Periodic reconciliation over every stored instance.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use brokerop_core::config::ApiSection;
use brokerop_core::labels::{clone_and_merge, instance_selector};
use brokerop_core::{Instance, Pod, PodPhase, ResourceReader};
use brokerop_nodes::{HttpRequester, Requester};
use brokerop_state::StateStore;
use brokerop_status::StatusReconciler;

/// Outcome counts of one sweep over all instances.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub reconciled: usize,
    pub failed: usize,
}

pub struct Controller {
    reconciler: StatusReconciler<StateStore>,
    api: ApiSection,
    api_timeout: Duration,
}

impl Controller {
    pub fn new(store: StateStore, api: ApiSection, api_timeout: Duration) -> Self {
        Self {
            reconciler: StatusReconciler::new(store),
            api,
            api_timeout,
        }
    }

    fn store(&self) -> &StateStore {
        self.reconciler.cluster()
    }

    /// Reconcile every stored instance once. A failed instance does not stop
    /// the sweep.
    pub async fn sweep(&self) -> anyhow::Result<SweepSummary> {
        let instances = self.store().list_instances()?;
        let mut summary = SweepSummary::default();

        for instance in &instances {
            let requester = self.requester_for(instance);
            let requester = requester.as_ref().map(|r| r as &dyn Requester);

            match self.reconciler.reconcile(instance, requester).await {
                Ok(_) => summary.reconciled += 1,
                Err(e) => {
                    warn!(instance = %instance.table_key(), error = %e, "reconcile failed");
                    summary.failed += 1;
                }
            }
        }

        debug!(
            reconciled = summary.reconciled,
            failed = summary.failed,
            "sweep complete"
        );
        Ok(summary)
    }

    /// Sweep every `interval` until `shutdown` flips.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = interval.as_millis() as u64, "controller started");

        loop {
            if let Err(e) = self.sweep().await {
                tracing::error!(error = %e, "sweep failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    info!("controller shutting down");
                    break;
                }
            }
        }
    }

    /// Requester for the instance's administrative API, if a core pod can
    /// serve it.
    fn requester_for(&self, instance: &Instance) -> Option<HttpRequester> {
        let selector = clone_and_merge(
            &instance_selector(instance),
            &instance.spec.core_template.labels,
        );
        let pods = match self.store().list_pods(&instance.meta.namespace, &selector) {
            Ok(pods) => pods,
            Err(e) => {
                warn!(instance = %instance.table_key(), error = %e, "pod list failed");
                return None;
            }
        };

        let Some(address) = api_endpoint(&pods, self.api.port) else {
            debug!(instance = %instance.table_key(), "no running core pod to query");
            return None;
        };

        Some(
            HttpRequester::new(&address, self.api_timeout)
                .with_basic_auth(&self.api.username, &self.api.password),
        )
    }
}

/// `ip:port` of the first running pod (by name) that has an address.
pub fn api_endpoint(pods: &[Pod], port: u16) -> Option<String> {
    let mut candidates: Vec<&Pod> = pods
        .iter()
        .filter(|p| p.phase == PodPhase::Running && p.pod_ip.is_some())
        .collect();
    candidates.sort_by(|a, b| a.meta.name.cmp(&b.meta.name));

    candidates
        .first()
        .and_then(|p| p.pod_ip.as_deref())
        .map(|ip| format!("{ip}:{port}"))
}
