//! Revision resolution: which owned workload backs each tier revision.
//!
//! The workload reconciler labels every stateful set / replica set it
//! creates with the pod-template hash of the tier template it was built
//! from. At most one object per tier carries a given hash under correct
//! rolling-update labeling; when that does not hold the first match is used
//! and the lookup is reported as [`Lookup::Ambiguous`].

use tracing::{debug, warn};

use brokerop_core::labels::{POD_TEMPLATE_HASH_LABEL_KEY, clone_and_add_label};
use brokerop_core::{
    ClusterResult, Instance, Labels, NodesStatus, ResourceReader, Workload, WorkloadKind,
};

/// Outcome of a first-match-or-none workload query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Exactly one object carries the revision.
    Found(Workload),
    /// No object carries the revision (new instance, or the workload
    /// reconciler has not caught up yet).
    NotFound,
    /// Several objects carry the revision; `first` is used.
    Ambiguous { first: Workload, matches: usize },
    /// The list call failed; treated like `NotFound` for this pass.
    Unavailable(String),
}

impl Lookup {
    fn from_items(items: Vec<Workload>) -> Self {
        let matches = items.len();
        let mut items = items.into_iter();
        match (items.next(), matches) {
            (None, _) => Lookup::NotFound,
            (Some(only), 1) => Lookup::Found(only),
            (Some(first), _) => Lookup::Ambiguous { first, matches },
        }
    }

    /// The workload to use, if any.
    pub fn workload(&self) -> Option<&Workload> {
        match self {
            Lookup::Found(w) | Lookup::Ambiguous { first: w, .. } => Some(w),
            Lookup::NotFound | Lookup::Unavailable(_) => None,
        }
    }
}

/// Workloads backing one tier's current and update revisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierWorkloads {
    pub current: Lookup,
    /// Only looked up while a rollout is in flight.
    pub update: Lookup,
}

impl TierWorkloads {
    pub fn none() -> Self {
        Self {
            current: Lookup::NotFound,
            update: Lookup::NotFound,
        }
    }

    /// Every ambiguous lookup with the revision it was made for.
    pub fn ambiguous<'a>(&'a self, status: &'a NodesStatus) -> Vec<(&'a str, usize)> {
        let mut out = Vec::new();
        if let Lookup::Ambiguous { matches, .. } = &self.current {
            out.push((status.current_revision.as_str(), *matches));
        }
        if let Lookup::Ambiguous { matches, .. } = &self.update {
            out.push((status.update_revision.as_str(), *matches));
        }
        out
    }
}

/// Workloads for both tiers of an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWorkloads {
    pub core: TierWorkloads,
    /// `TierWorkloads::none()` when no replicant tier is configured.
    pub replicant: TierWorkloads,
}

/// Resolve the stateful set (core) and replica set (replicant) carrying the
/// revisions recorded in `instance.status`. List failures degrade to
/// [`Lookup::Unavailable`] and are only logged.
pub fn resolve_workloads<R>(reader: &R, instance: &Instance) -> ResolvedWorkloads
where
    R: ResourceReader + ?Sized,
{
    let namespace = instance.meta.namespace.as_str();
    let status = &instance.status;

    let core = resolve_tier(
        WorkloadKind::StatefulSet,
        &instance.spec.core_template.labels,
        &status.core_nodes_status,
        |selector| reader.list_stateful_sets(namespace, selector),
    );

    let replicant = match (&instance.spec.replicant_template, instance.replicant_configured()) {
        (Some(template), true) => {
            let tier_status = status.replicant_nodes_status.clone().unwrap_or_default();
            resolve_tier(
                WorkloadKind::ReplicaSet,
                &template.labels,
                &tier_status,
                |selector| reader.list_replica_sets(namespace, selector),
            )
        }
        _ => TierWorkloads::none(),
    };

    ResolvedWorkloads { core, replicant }
}

fn resolve_tier<F>(
    kind: WorkloadKind,
    tier_labels: &Labels,
    status: &NodesStatus,
    list: F,
) -> TierWorkloads
where
    F: Fn(&Labels) -> ClusterResult<Vec<Workload>>,
{
    let current = lookup(kind, tier_labels, &status.current_revision, &list);
    let update = if status.rollout_in_flight() {
        lookup(kind, tier_labels, &status.update_revision, &list)
    } else {
        Lookup::NotFound
    };
    TierWorkloads { current, update }
}

fn lookup<F>(kind: WorkloadKind, tier_labels: &Labels, revision: &str, list: &F) -> Lookup
where
    F: Fn(&Labels) -> ClusterResult<Vec<Workload>>,
{
    if revision.is_empty() {
        return Lookup::NotFound;
    }

    let selector = clone_and_add_label(tier_labels, POD_TEMPLATE_HASH_LABEL_KEY, revision);
    match list(&selector) {
        Ok(items) => {
            let found = Lookup::from_items(items);
            match &found {
                Lookup::Ambiguous { matches, .. } => warn!(
                    kind = kind.as_str(),
                    %revision,
                    matches,
                    "several workloads carry the same revision, using the first"
                ),
                Lookup::NotFound => debug!(kind = kind.as_str(), %revision, "no workload for revision"),
                Lookup::Found(w) => debug!(
                    kind = kind.as_str(),
                    %revision,
                    workload = %w.meta.name,
                    replicas = w.replicas,
                    "workload resolved"
                ),
                Lookup::Unavailable(_) => {}
            }
            found
        }
        Err(e) => {
            warn!(kind = kind.as_str(), %revision, error = %e, "workload list failed, continuing without it");
            Lookup::Unavailable(e.to_string())
        }
    }
}
