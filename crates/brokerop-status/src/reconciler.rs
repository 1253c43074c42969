//! Reconcile orchestrator: one status pass per instance.
//!
//! Sequences revision resolution, node fetching, correlation and the state
//! machine, then writes the status once. Only the write can fail the pass;
//! everything before it degrades and is reported through events and logs.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use brokerop_core::labels::instance_selector;
use brokerop_core::{
    BrokerNode, EventRecorder, EventType, Instance, InstanceStatus, NodesStatus,
    ResourceReader, StatusWriter,
};
use brokerop_nodes::{NodeFetchError, Requester, fetch_nodes};

use crate::correlate::correlate;
use crate::error::{ReconcileError, ReconcileResult};
use crate::machine::next_status;
use crate::revision::{ResolvedWorkloads, resolve_workloads};

/// Event reason when the administrative API could not be read.
pub const REASON_FETCH_FAILED: &str = "FailedToGetNodeStatuses";

/// Event reason when several workloads carry the same revision hash.
pub const REASON_AMBIGUOUS_REVISION: &str = "AmbiguousRevision";

/// Event reason when the lifecycle phase changes.
pub const REASON_PHASE_CHANGED: &str = "PhaseChanged";

/// Drives status reconciliation against a platform collaborator `C`.
pub struct StatusReconciler<C> {
    cluster: C,
    clock: fn() -> u64,
}

impl<C> StatusReconciler<C>
where
    C: ResourceReader + StatusWriter + EventRecorder,
{
    /// Create a reconciler reading and writing through `cluster`.
    pub fn new(cluster: C) -> Self {
        Self {
            cluster,
            clock: epoch_secs,
        }
    }

    /// Replace the clock used for condition timestamps (for testing).
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    /// Run one reconciliation pass for `instance` and persist its status.
    ///
    /// `requester` reaches the instance's administrative API; pass `None`
    /// to skip live membership (the previous node lists are kept). Returns
    /// the status that was written.
    pub async fn reconcile(
        &self,
        instance: &Instance,
        requester: Option<&dyn Requester>,
    ) -> ReconcileResult<InstanceStatus> {
        let key = instance.table_key();
        let mut next = instance.clone();

        let workloads = resolve_workloads(&self.cluster, &next);
        self.report_ambiguous(&next, &workloads);

        mirror_replicas(&mut next);

        let nodes = match requester {
            Some(requester) => match self.observe_nodes(&next, requester).await {
                Ok(nodes) => Some(nodes),
                Err(e) => {
                    self.cluster.record(
                        &next,
                        EventType::Warning,
                        REASON_FETCH_FAILED,
                        &e.to_string(),
                    );
                    None
                }
            },
            None => {
                debug!(instance = %key, "no api requester, keeping previous nodes");
                None
            }
        };

        let status = next_status(&next, &workloads, nodes, (self.clock)());
        let previous_phase = instance.status.phase;
        next.status = status;

        self.cluster
            .update_status(&next)
            .map_err(|source| ReconcileError::PersistStatus {
                instance: key.clone(),
                source,
            })?;

        if next.status.phase != previous_phase {
            let message = format!("{previous_phase} -> {}", next.status.phase);
            self.cluster
                .record(&next, EventType::Normal, REASON_PHASE_CHANGED, &message);
        }

        info!(
            instance = %key,
            phase = %next.status.phase,
            core_ready = next.status.core_nodes_status.ready_replicas,
            core_replicas = next.status.core_nodes_status.replicas,
            "status reconciled"
        );
        Ok(next.status)
    }

    /// Fetch live members and bind them to the instance's pods.
    async fn observe_nodes(
        &self,
        instance: &Instance,
        requester: &dyn Requester,
    ) -> Result<Vec<BrokerNode>, NodeFetchError> {
        let nodes = fetch_nodes(requester).await?;

        let pods = self
            .cluster
            .list_pods(&instance.meta.namespace, &instance_selector(instance))
            .unwrap_or_else(|e| {
                warn!(
                    instance = %instance.table_key(),
                    error = %e,
                    "pod list failed, nodes stay uncorrelated"
                );
                Vec::new()
            });

        Ok(correlate(nodes, &pods))
    }

    fn report_ambiguous(&self, instance: &Instance, workloads: &ResolvedWorkloads) {
        let status = &instance.status;
        let replicant_status = status.replicant_nodes_status.clone().unwrap_or_default();
        let tiers = [
            ("core", workloads.core.ambiguous(&status.core_nodes_status)),
            ("replicant", workloads.replicant.ambiguous(&replicant_status)),
        ];
        for (tier, hits) in tiers {
            for (revision, matches) in hits {
                let message =
                    format!("{matches} {tier} workloads carry revision {revision}, using the first");
                self.cluster.record(
                    instance,
                    EventType::Warning,
                    REASON_AMBIGUOUS_REVISION,
                    &message,
                );
            }
        }
    }
}

/// Copy desired replica counts into the status and allocate or drop the
/// replicant sub-status to match the instance spec.
fn mirror_replicas(instance: &mut Instance) {
    instance.status.core_nodes_status.replicas = instance.spec.core_template.replicas;
    if instance.replicant_configured() {
        let replicas = instance.replicant_replicas();
        instance
            .status
            .replicant_nodes_status
            .get_or_insert_with(NodesStatus::default)
            .replicas = replicas;
    } else {
        instance.status.replicant_nodes_status = None;
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use brokerop_core::{InstanceSpec, ObjectMeta, TierTemplate};

    fn instance(replicant: Option<u32>) -> Instance {
        Instance {
            meta: ObjectMeta {
                name: "broker".to_string(),
                namespace: "default".to_string(),
                uid: "inst".to_string(),
                ..Default::default()
            },
            spec: InstanceSpec {
                image: "broker:5".to_string(),
                core_template: TierTemplate {
                    labels: Default::default(),
                    replicas: 3,
                },
                replicant_template: replicant.map(|replicas| TierTemplate {
                    labels: Default::default(),
                    replicas,
                }),
            },
            status: InstanceStatus::default(),
        }
    }

    #[test]
    fn mirror_allocates_replicant_status_when_configured() {
        let mut inst = instance(Some(4));
        mirror_replicas(&mut inst);
        assert_eq!(inst.status.core_nodes_status.replicas, 3);
        assert_eq!(inst.status.replicant_nodes_status.unwrap().replicas, 4);
    }

    #[test]
    fn mirror_drops_replicant_status_when_not_configured() {
        let mut inst = instance(Some(0));
        inst.status.replicant_nodes_status = Some(NodesStatus {
            replicas: 7,
            current_revision: "r".to_string(),
            ..Default::default()
        });
        mirror_replicas(&mut inst);
        assert!(inst.status.replicant_nodes_status.is_none());
    }

    #[test]
    fn mirror_keeps_existing_revisions() {
        let mut inst = instance(Some(2));
        inst.status.replicant_nodes_status = Some(NodesStatus {
            replicas: 1,
            current_revision: "r1".to_string(),
            ..Default::default()
        });
        mirror_replicas(&mut inst);
        let rs = inst.status.replicant_nodes_status.unwrap();
        assert_eq!(rs.replicas, 2);
        assert_eq!(rs.current_revision, "r1");
    }
}
