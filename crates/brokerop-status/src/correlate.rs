//! Identity correlation: which pod runs which broker node.
//!
//! Core nodes advertise stable, pod-name-derived hostnames
//! (`emqx@broker-0.broker-headless.ns.svc:4370`), so they are matched by
//! pod-name prefix. Replicant nodes advertise their pod IP, so they are
//! matched by exact address.

use tracing::{debug, trace};

use brokerop_core::{BrokerNode, NodeRole, Pod};

/// Bind every node to the pod running it, if any.
///
/// Returns a freshly built sequence in the same order as `nodes`. Matched
/// nodes carry the pod's uid and, when the pod has a controller owner
/// reference, the controller's uid. Unmatched nodes come back unbound.
pub fn correlate(nodes: Vec<BrokerNode>, pods: &[Pod]) -> Vec<BrokerNode> {
    let mut bound = 0usize;
    let out: Vec<BrokerNode> = nodes
        .into_iter()
        .map(|node| {
            let node = bind(node, pods);
            if node.pod_uid.is_some() {
                bound += 1;
            }
            node
        })
        .collect();

    debug!(nodes = out.len(), pods = pods.len(), bound, "correlated broker nodes");
    out
}

fn bind(node: BrokerNode, pods: &[Pod]) -> BrokerNode {
    let pod = pods.iter().find(|pod| matches_pod(&node, pod));
    let (pod_uid, controller_uid) = match pod {
        Some(pod) => (
            Some(pod.meta.uid.clone()),
            pod.meta.controller_of().map(|owner| owner.uid.clone()),
        ),
        None => {
            trace!(node = %node.node, "no pod matches broker node");
            (None, None)
        }
    };

    BrokerNode {
        pod_uid,
        controller_uid,
        ..node
    }
}

/// Whether `pod` is the pod running `node`.
pub fn matches_pod(node: &BrokerNode, pod: &Pod) -> bool {
    let host = node.host();
    if host.is_empty() {
        return false;
    }
    match node.role {
        NodeRole::Core => host_starts_with_pod_name(host, &pod.meta.name),
        NodeRole::Replicant => pod.pod_ip.as_deref() == Some(host),
        NodeRole::Unknown => false,
    }
}

/// `host` begins with `pod_name` and the match ends at a DNS label boundary,
/// so pod `broker-1` does not claim host `broker-10.svc`.
fn host_starts_with_pod_name(host: &str, pod_name: &str) -> bool {
    if pod_name.is_empty() {
        return false;
    }
    host.strip_prefix(pod_name)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}
