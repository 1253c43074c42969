//! Domain types for the broker cluster operator.
//!
//! These mirror the subset of the orchestration platform's object model the
//! status reconciler reads (instances, stateful sets, replica sets, pods)
//! plus the status it writes back. All types are JSON-serializable so the
//! state store can keep them in redb value columns.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Platform-assigned unique id of an object.
pub type Uid = String;

/// Label set / label selector. Ordered so serialized output is stable.
pub type Labels = BTreeMap<String, String>;

// ── Metadata ──────────────────────────────────────────────────────

/// Identity and bookkeeping shared by every stored object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    pub uid: Uid,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,
    /// Bumped by the store on every write; used for optimistic concurrency.
    #[serde(default)]
    pub resource_version: u64,
}

/// Reference from a dependent object to the object that owns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
    pub uid: Uid,
    /// Whether the owner is the managing controller of the dependent.
    #[serde(default)]
    pub controller: bool,
}

impl ObjectMeta {
    /// Build the composite key `{namespace}/{name}` used by the state store.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// The owner reference marked as controller, if any.
    pub fn controller_of(&self) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|r| r.controller)
    }
}

// ── Instance ──────────────────────────────────────────────────────

/// A broker cluster deployment: desired spec plus observed status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    pub meta: ObjectMeta,
    pub spec: InstanceSpec,
    #[serde(default)]
    pub status: InstanceStatus,
}

/// Desired state of a broker cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceSpec {
    /// Broker container image.
    pub image: String,
    /// Stateful tier with stable network identities. Always present.
    pub core_template: TierTemplate,
    /// Stateless, horizontally scaled tier.
    #[serde(default)]
    pub replicant_template: Option<TierTemplate>,
}

/// Per-tier template: selector labels and desired replica count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierTemplate {
    #[serde(default)]
    pub labels: Labels,
    pub replicas: u32,
}

impl Instance {
    /// Whether a replicant tier is configured with at least one replica.
    pub fn replicant_configured(&self) -> bool {
        self.spec
            .replicant_template
            .as_ref()
            .is_some_and(|t| t.replicas > 0)
    }

    /// Desired replicant replicas, or zero when the tier is not configured.
    pub fn replicant_replicas(&self) -> u32 {
        if self.replicant_configured() {
            self.spec
                .replicant_template
                .as_ref()
                .map_or(0, |t| t.replicas)
        } else {
            0
        }
    }

    pub fn table_key(&self) -> String {
        self.meta.table_key()
    }
}

// ── Status ────────────────────────────────────────────────────────

/// Observed state of a broker cluster, written by the status reconciler.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InstanceStatus {
    #[serde(default)]
    pub phase: InstancePhase,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub core_nodes: Vec<BrokerNode>,
    #[serde(default)]
    pub core_nodes_status: NodesStatus,
    #[serde(default)]
    pub replicant_nodes: Vec<BrokerNode>,
    /// Present if and only if a replicant tier is configured.
    #[serde(default)]
    pub replicant_nodes_status: Option<NodesStatus>,
}

impl InstanceStatus {
    /// Look up a condition by type.
    pub fn condition(&self, kind: ConditionType) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.kind == kind)
    }

    /// Whether the `Ready` condition is true.
    pub fn is_ready(&self) -> bool {
        self.condition(ConditionType::Ready)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }
}

/// Per-tier replica accounting and revision markers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodesStatus {
    /// Desired replicas, mirrored from the instance spec on every pass.
    pub replicas: u32,
    /// Running nodes owned by the current-revision workload.
    #[serde(default)]
    pub ready_replicas: u32,
    /// Running nodes owned by the update-revision workload.
    #[serde(default)]
    pub updated_replicas: u32,
    /// Revision the tier is considered to be running.
    #[serde(default)]
    pub current_revision: String,
    /// Revision being rolled out; written by the workload reconciler.
    #[serde(default)]
    pub update_revision: String,
}

impl NodesStatus {
    /// Whether a rollout to a different revision is in flight.
    pub fn rollout_in_flight(&self) -> bool {
        !self.update_revision.is_empty() && self.update_revision != self.current_revision
    }
}

/// Coarse lifecycle state of an instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstancePhase {
    /// Nothing observed yet.
    #[default]
    Creating,
    /// Core workload exists but not all core nodes are ready.
    CoreProgressing,
    /// Core tier ready; replicant tier still coming up.
    CoreReady,
    /// Every configured tier is ready.
    Ready,
    /// Core tier lost readiness after having been ready, with no rollout in flight.
    Degraded,
}

impl InstancePhase {
    /// Whether this phase implies the core tier has been ready at some point.
    pub fn reached_core_ready(self) -> bool {
        matches!(self, Self::CoreReady | Self::Ready | Self::Degraded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Creating => "Creating",
            Self::CoreProgressing => "CoreProgressing",
            Self::CoreReady => "CoreReady",
            Self::Ready => "Ready",
            Self::Degraded => "Degraded",
        }
    }
}

impl std::fmt::Display for InstancePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of status condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionType {
    CoreNodesReady,
    ReplicantNodesReady,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

/// Human-readable observation attached to the status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: ConditionType,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    /// Unix timestamp of the last status flip.
    pub last_transition_time: u64,
    /// Unix timestamp of the last change to status, reason or message.
    pub last_update_time: u64,
}

// ── Broker nodes ──────────────────────────────────────────────────

/// Role of a broker node as reported by the administrative API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Core,
    Replicant,
    #[serde(other)]
    Unknown,
}

/// A live broker cluster member, optionally bound to the pod running it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrokerNode {
    /// Erlang node name, `name@host:port`-shaped.
    pub node: String,
    pub role: NodeRole,
    /// `running` / `stopped`; absent is treated as running.
    #[serde(default)]
    pub node_status: Option<String>,
    #[serde(default)]
    pub otp_release: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub edition: Option<String>,
    /// Uptime in milliseconds.
    #[serde(default)]
    pub uptime: Option<u64>,
    #[serde(default)]
    pub connections: Option<u64>,
    /// Uid of the pod running this node, once correlated.
    #[serde(default)]
    pub pod_uid: Option<Uid>,
    /// Uid of the workload that controls that pod.
    #[serde(default)]
    pub controller_uid: Option<Uid>,
}

impl BrokerNode {
    /// Build an uncorrelated node record.
    pub fn new(node: &str, role: NodeRole) -> Self {
        Self {
            node: node.to_string(),
            role,
            node_status: None,
            otp_release: None,
            version: None,
            edition: None,
            uptime: None,
            connections: None,
            pod_uid: None,
            controller_uid: None,
        }
    }

    /// Host segment of the node name: text after the first `@` (or the
    /// whole name when there is none) up to the first `:`.
    pub fn host(&self) -> &str {
        let after_at = match self.node.find('@') {
            Some(idx) => &self.node[idx + 1..],
            None => &self.node,
        };
        after_at.split(':').next().unwrap_or(after_at)
    }

    pub fn is_running(&self) -> bool {
        self.node_status.as_deref().is_none_or(|s| s == "running")
    }
}

// ── Owned workloads ───────────────────────────────────────────────

/// Which kind of compute group a workload record is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadKind {
    /// Stable-identity group backing the core tier.
    StatefulSet,
    /// Replica-managed group backing the replicant tier.
    ReplicaSet,
}

impl WorkloadKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StatefulSet => "StatefulSet",
            Self::ReplicaSet => "ReplicaSet",
        }
    }
}

/// A compute-group object created by the workload reconciler for one tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Workload {
    pub kind: WorkloadKind,
    pub meta: ObjectMeta,
    /// Desired replica count of the group.
    pub replicas: u32,
}

// ── Pods ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PodPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

/// A single pod belonging to an instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pod {
    pub meta: ObjectMeta,
    /// Assigned network address, once scheduled.
    #[serde(default)]
    pub pod_ip: Option<String>,
    #[serde(default)]
    pub phase: PodPhase,
}

// ── Events ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

/// An event recorded against an instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub namespace: String,
    /// Name of the instance the event is about.
    pub involved: String,
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
    /// Unix timestamp of the first occurrence.
    pub timestamp: u64,
    /// Occurrences folded into this event.
    #[serde(default = "default_event_count")]
    pub count: u32,
    /// Unix timestamp of the latest occurrence.
    #[serde(default)]
    pub last_timestamp: u64,
}

fn default_event_count() -> u32 {
    1
}

impl Event {
    /// Whether `other` repeats this event (same subject, type, reason, message).
    pub fn repeats(&self, other: &Event) -> bool {
        self.namespace == other.namespace
            && self.involved == other.involved
            && self.event_type == other.event_type
            && self.reason == other.reason
            && self.message == other.message
    }
}
