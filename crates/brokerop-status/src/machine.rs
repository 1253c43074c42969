//! Status state machine: derives the next instance status.
//!
//! Pure: the same previous status, spec, workloads, node list and clock
//! reading always give the same result. Nothing here touches the
//! platform or the network.
//!
//! # Phases
//!
//! ```text
//!             core workload seen            core ready, replicants not
//! Creating ───────────────────▶ CoreProgressing ───────────▶ CoreReady
//!                                     │  ▲                        │
//!                     core ready,     │  │ core lost, rollout     │ replicants ready
//!                     no replicants   ▼  │ in flight              ▼
//!                                   Ready ◀───────────────────────┘
//!                                     │  ▲
//!               core lost, no rollout ▼  │ core ready again
//!                                   Degraded
//! ```
//!
//! Losing core readiness only degrades the instance when nodes actually went
//! away or stopped. A scale-up, where every observed core node is still
//! ready and new ones have yet to join, goes back to `CoreProgressing`.
//! Once degraded, the instance stays degraded until the core is ready again.
//!
//! The core tier never waits on the replicant tier; the instance is only
//! `Ready` once both are.

use tracing::debug;

use brokerop_core::{
    BrokerNode, Condition, ConditionStatus, ConditionType, Instance, InstancePhase,
    InstanceStatus, NodeRole, NodesStatus, Workload,
};

use crate::revision::{ResolvedWorkloads, TierWorkloads};

/// Per-tier result of one step.
#[derive(Debug, Clone)]
struct TierOutcome {
    status: NodesStatus,
    ready: bool,
    has_workload: bool,
    rollout_in_flight: bool,
    /// Fewer ready nodes than the previous pass still wanted, or an observed
    /// node that is not ready.
    lost_nodes: bool,
}

/// Compute the next status for `instance`.
///
/// `instance.status` is the previous status. `nodes` is the freshly
/// correlated member list, or `None` when no fresh list is available for
/// this pass, in which case the previous node lists are kept. `now` is a
/// unix timestamp used for condition bookkeeping.
pub fn next_status(
    instance: &Instance,
    workloads: &ResolvedWorkloads,
    nodes: Option<Vec<BrokerNode>>,
    now: u64,
) -> InstanceStatus {
    let previous = &instance.status;
    let mut status = previous.clone();

    if let Some(nodes) = nodes {
        let (core, replicant) = partition_nodes(nodes);
        status.core_nodes = core;
        status.replicant_nodes = replicant;
    }

    let core = advance_tier(
        &previous.core_nodes_status,
        instance.spec.core_template.replicas,
        &workloads.core,
        &status.core_nodes,
    );
    status.core_nodes_status = core.status.clone();

    let replicant = if instance.replicant_configured() {
        let prev = previous.replicant_nodes_status.clone().unwrap_or_default();
        let outcome = advance_tier(
            &prev,
            instance.replicant_replicas(),
            &workloads.replicant,
            &status.replicant_nodes,
        );
        status.replicant_nodes_status = Some(outcome.status.clone());
        Some(outcome)
    } else {
        status.replicant_nodes_status = None;
        None
    };

    status.phase = derive_phase(previous.phase, &core, replicant.as_ref());
    update_conditions(&mut status, &core, replicant.as_ref(), now);

    if status.phase != previous.phase {
        debug!(
            instance = %instance.table_key(),
            from = %previous.phase,
            to = %status.phase,
            "instance phase changed"
        );
    }

    status
}

/// Split by role and sort by node name. Nodes with an unknown role are dropped.
fn partition_nodes(nodes: Vec<BrokerNode>) -> (Vec<BrokerNode>, Vec<BrokerNode>) {
    let mut core = Vec::new();
    let mut replicant = Vec::new();
    for node in nodes {
        match node.role {
            NodeRole::Core => core.push(node),
            NodeRole::Replicant => replicant.push(node),
            NodeRole::Unknown => debug!(node = %node.node, "dropping node with unknown role"),
        }
    }
    core.sort_by(|a, b| a.node.cmp(&b.node));
    replicant.sort_by(|a, b| a.node.cmp(&b.node));
    (core, replicant)
}

/// Running nodes whose pod is controlled by `workload`.
fn count_ready(nodes: &[BrokerNode], workload: &Workload) -> u32 {
    let count = nodes
        .iter()
        .filter(|n| n.is_running() && n.controller_uid.as_deref() == Some(workload.meta.uid.as_str()))
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

fn advance_tier(
    previous: &NodesStatus,
    replicas: u32,
    workloads: &TierWorkloads,
    nodes: &[BrokerNode],
) -> TierOutcome {
    let mut status = previous.clone();
    status.replicas = replicas;

    let mut current = workloads.current.workload();
    let update = workloads.update.workload();

    if status.rollout_in_flight() {
        status.updated_replicas = update.map_or(0, |w| count_ready(nodes, w));
        // Promote once every desired replica runs the update revision.
        if let Some(update) = update {
            if status.updated_replicas == replicas {
                status.current_revision = status.update_revision.clone();
                current = Some(update);
            }
        }
    }

    status.ready_replicas = current.map_or(0, |w| count_ready(nodes, w));
    let rollout_in_flight = status.rollout_in_flight();
    if !rollout_in_flight {
        status.updated_replicas = status.ready_replicas;
    }

    let observed = u32::try_from(nodes.len()).unwrap_or(u32::MAX);
    TierOutcome {
        ready: status.ready_replicas == replicas && current.is_some(),
        has_workload: current.is_some() || update.is_some(),
        rollout_in_flight,
        lost_nodes: status.ready_replicas < previous.ready_replicas.min(replicas)
            || status.ready_replicas < observed,
        status,
    }
}

fn derive_phase(
    previous: InstancePhase,
    core: &TierOutcome,
    replicant: Option<&TierOutcome>,
) -> InstancePhase {
    let replicant_ready = replicant.is_none_or(|r| r.ready);

    if core.ready && replicant_ready {
        InstancePhase::Ready
    } else if core.ready {
        InstancePhase::CoreReady
    } else if !core.rollout_in_flight
        && previous.reached_core_ready()
        && (previous == InstancePhase::Degraded || core.lost_nodes)
    {
        InstancePhase::Degraded
    } else if core.has_workload || core.rollout_in_flight {
        InstancePhase::CoreProgressing
    } else {
        InstancePhase::Creating
    }
}

fn update_conditions(
    status: &mut InstanceStatus,
    core: &TierOutcome,
    replicant: Option<&TierOutcome>,
    now: u64,
) {
    let (reason, message) = tier_condition("core", core);
    set_condition(
        &mut status.conditions,
        ConditionType::CoreNodesReady,
        core.ready.into(),
        reason,
        message,
        now,
    );

    match replicant {
        Some(outcome) => {
            let (reason, message) = tier_condition("replicant", outcome);
            set_condition(
                &mut status.conditions,
                ConditionType::ReplicantNodesReady,
                outcome.ready.into(),
                reason,
                message,
                now,
            );
        }
        None => status
            .conditions
            .retain(|c| c.kind != ConditionType::ReplicantNodesReady),
    }

    let message = match status.phase {
        InstancePhase::Ready => "all configured tiers are ready".to_string(),
        InstancePhase::CoreReady => "core nodes ready, waiting for replicant nodes".to_string(),
        InstancePhase::CoreProgressing => "waiting for core nodes".to_string(),
        InstancePhase::Degraded => "core nodes lost readiness".to_string(),
        InstancePhase::Creating => "waiting for core workload".to_string(),
    };
    set_condition(
        &mut status.conditions,
        ConditionType::Ready,
        (status.phase == InstancePhase::Ready).into(),
        status.phase.as_str(),
        message,
        now,
    );
}

fn tier_condition(tier: &str, outcome: &TierOutcome) -> (&'static str, String) {
    let s = &outcome.status;
    let reason = if outcome.ready {
        "NodesReady"
    } else if outcome.rollout_in_flight {
        "NodesUpdating"
    } else {
        "NodesProgressing"
    };
    let mut message = format!("{}/{} {tier} nodes ready", s.ready_replicas, s.replicas);
    if !s.current_revision.is_empty() {
        message.push_str(&format!(" at revision {}", s.current_revision));
    }
    if outcome.rollout_in_flight {
        message.push_str(&format!(
            ", {}/{} at revision {}",
            s.updated_replicas, s.replicas, s.update_revision
        ));
    }
    (reason, message)
}

/// Insert or update a condition. Timestamps only move when something changes.
fn set_condition(
    conditions: &mut Vec<Condition>,
    kind: ConditionType,
    status: ConditionStatus,
    reason: &str,
    message: String,
    now: u64,
) {
    match conditions.iter_mut().find(|c| c.kind == kind) {
        Some(existing) => {
            if existing.status != status {
                existing.last_transition_time = now;
            }
            if existing.status != status || existing.reason != reason || existing.message != message
            {
                existing.status = status;
                existing.reason = reason.to_string();
                existing.message = message;
                existing.last_update_time = now;
            }
        }
        None => conditions.push(Condition {
            kind,
            status,
            reason: reason.to_string(),
            message,
            last_transition_time: now,
            last_update_time: now,
        }),
    }
}
