//! Label conventions shared by the operator and the workload reconciler.

use crate::types::{Instance, Labels};

/// Pins an owned workload (and its pods) to one tier revision.
pub const POD_TEMPLATE_HASH_LABEL_KEY: &str = "apps.brokerop.io/pod-template-hash";

/// Name of the instance an object belongs to.
pub const INSTANCE_LABEL_KEY: &str = "apps.brokerop.io/instance";

/// Marks objects managed by this operator.
pub const MANAGED_BY_LABEL_KEY: &str = "apps.brokerop.io/managed-by";

/// Tier of a pod or workload: `core` or `replicant`.
pub const DB_ROLE_LABEL_KEY: &str = "apps.brokerop.io/db-role";

pub const MANAGED_BY: &str = "brokerop";

/// Copy `labels` and set `key` to `value` on the copy.
pub fn clone_and_add_label(labels: &Labels, key: &str, value: &str) -> Labels {
    let mut out = labels.clone();
    out.insert(key.to_string(), value.to_string());
    out
}

/// Copy `base` and overlay every entry of `extra`.
pub fn clone_and_merge(base: &Labels, extra: &Labels) -> Labels {
    let mut out = base.clone();
    out.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    out
}

/// Whether `labels` carries every key/value pair of `selector`.
/// An empty selector matches everything.
pub fn matches(selector: &Labels, labels: &Labels) -> bool {
    selector
        .iter()
        .all(|(k, v)| labels.get(k).is_some_and(|have| have == v))
}

/// Default instance-level labels, used when the instance carries none.
pub fn default_instance_labels(name: &str) -> Labels {
    Labels::from([
        (INSTANCE_LABEL_KEY.to_string(), name.to_string()),
        (MANAGED_BY_LABEL_KEY.to_string(), MANAGED_BY.to_string()),
    ])
}

/// Selector for every pod of an instance regardless of tier.
pub fn instance_selector(instance: &Instance) -> Labels {
    if instance.meta.labels.is_empty() {
        default_instance_labels(&instance.meta.name)
    } else {
        instance.meta.labels.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn clone_and_add_leaves_source_untouched() {
        let base = labels(&[("app", "broker")]);
        let out = clone_and_add_label(&base, POD_TEMPLATE_HASH_LABEL_KEY, "abc");
        assert_eq!(base.len(), 1);
        assert_eq!(out.get(POD_TEMPLATE_HASH_LABEL_KEY).unwrap(), "abc");
        assert_eq!(out.get("app").unwrap(), "broker");
    }

    #[test]
    fn selector_subset_matching() {
        let have = labels(&[("app", "broker"), ("tier", "core")]);
        assert!(matches(&labels(&[("app", "broker")]), &have));
        assert!(matches(&Labels::new(), &have));
        assert!(!matches(&labels(&[("tier", "replicant")]), &have));
        assert!(!matches(&labels(&[("zone", "a")]), &have));
    }

    #[test]
    fn merge_overlays_extra() {
        let out = clone_and_merge(&labels(&[("a", "1"), ("b", "2")]), &labels(&[("b", "3")]));
        assert_eq!(out, labels(&[("a", "1"), ("b", "3")]));
    }
}
