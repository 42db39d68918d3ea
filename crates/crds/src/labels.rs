//! Resource labeling and ownership tagging.
//!
//! Every cloud resource the provisioner creates is tagged with a
//! deterministic ownership label so that teardown can distinguish
//! resources it manages from pre-existing ones. These functions are
//! pure: no network calls, no side effects.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tag prefix differentiating this provisioner's components from other
/// tooling operating on the same project.
pub const PROVIDER_PREFIX: &str = "forge-gcp";

/// Lifecycle of a tagged cloud resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResourceLifecycle {
    /// The resource was created by the provisioner and its lifecycle is
    /// tied to the lifecycle of the build.
    Owned,
}

impl ResourceLifecycle {
    /// Label value written for this lifecycle.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceLifecycle::Owned => "owned",
        }
    }
}

/// Generates the ownership label key for resources associated with a build.
///
/// The key shape (`forge-gcpbuild-<name>`) must stay stable within one
/// deployment's lifetime, otherwise ownership checks on already-tagged
/// resources stop matching.
#[must_use]
pub fn build_tag_key(name: &str) -> String {
    format!("{PROVIDER_PREFIX}build-{name}")
}

/// A map of labels applied to a cloud resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Labels(pub BTreeMap<String, String>);

impl Labels {
    /// Creates an empty label set.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Returns true if the labels mark the resource as owned by the
    /// given build.
    #[must_use]
    pub fn has_owned(&self, build: &str) -> bool {
        self.0
            .get(&build_tag_key(build))
            .is_some_and(|v| v == ResourceLifecycle::Owned.as_str())
    }

    /// Renders the labels as a filter expression for compute list calls.
    #[must_use]
    pub fn to_compute_filter(&self) -> String {
        let mut out = String::new();
        for (k, v) in &self.0 {
            out.push_str(&format!("(labels.{k} = \"{v}\") "));
        }
        out
    }

    /// Returns the entries of `self` whose key is absent from `other`,
    /// or present with a different value. Used to detect externally-added
    /// labels that must not be clobbered on update.
    #[must_use]
    pub fn difference(&self, other: &Labels) -> Labels {
        let mut res = BTreeMap::new();
        for (key, value) in &self.0 {
            if other.0.get(key) == Some(value) {
                continue;
            }
            res.insert(key.clone(), value.clone());
        }
        Labels(res)
    }

    /// Adds (and overwrites) the current labels with the ones passed in.
    pub fn add_labels(&mut self, other: &Labels) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Returns true if no labels are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for Labels {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Labels(iter.into_iter().collect())
    }
}

/// Parameters for building the label set of a new cloud resource.
#[derive(Debug, Clone)]
pub struct BuildParams {
    /// Lifecycle written as the ownership label value.
    pub lifecycle: ResourceLifecycle,
    /// Build the resource belongs to.
    pub build_name: String,
    /// Any additional labels to apply to the resource.
    pub additional: Labels,
}

/// Builds the full label set for a new resource.
///
/// Additional label keys and values are lowercased (compute label
/// constraints), then the ownership key is set unconditionally so it
/// always wins over a same-named additional label.
#[must_use]
pub fn build(params: &BuildParams) -> Labels {
    let mut labels = Labels::new();
    for (k, v) in &params.additional.0 {
        labels.0.insert(k.to_lowercase(), v.to_lowercase());
    }
    labels.0.insert(
        build_tag_key(&params.build_name),
        params.lifecycle.as_str().to_string(),
    );
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn build_tag_key_shape() {
        assert_eq!(build_tag_key("b1"), "forge-gcpbuild-b1");
    }

    #[test]
    fn built_labels_are_owned() {
        let built = build(&BuildParams {
            lifecycle: ResourceLifecycle::Owned,
            build_name: "b1".to_string(),
            additional: labels(&[("Env", "Dev")]),
        });

        assert!(built.has_owned("b1"));
        assert!(!built.has_owned("b2"));
        // Additional labels are lowercased.
        assert_eq!(built.0.get("env").map(String::as_str), Some("dev"));
    }

    #[test]
    fn ownership_key_wins_over_additional() {
        let built = build(&BuildParams {
            lifecycle: ResourceLifecycle::Owned,
            build_name: "b1".to_string(),
            additional: labels(&[("forge-gcpbuild-b1", "shared")]),
        });

        assert_eq!(
            built.0.get("forge-gcpbuild-b1").map(String::as_str),
            Some("owned")
        );
    }

    #[test]
    fn difference_with_self_is_empty() {
        let a = labels(&[("a", "1"), ("b", "2")]);
        assert!(a.difference(&a).is_empty());
    }

    #[test]
    fn difference_reports_changed_and_missing_keys() {
        let a = labels(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let b = labels(&[("a", "1"), ("b", "changed")]);

        let diff = a.difference(&b);
        assert_eq!(diff, labels(&[("b", "2"), ("c", "3")]));
    }

    #[test]
    fn add_labels_overwrites_on_collision() {
        let mut a = labels(&[("a", "1")]);
        a.add_labels(&labels(&[("a", "2"), ("b", "3")]));
        assert_eq!(a, labels(&[("a", "2"), ("b", "3")]));

        // Safe on an empty map too.
        let mut empty = Labels::new();
        empty.add_labels(&labels(&[("x", "y")]));
        assert_eq!(empty, labels(&[("x", "y")]));
    }

    #[test]
    fn compute_filter_contains_every_label() {
        let a = labels(&[("a", "1"), ("b", "2")]);
        let filter = a.to_compute_filter();
        assert!(filter.contains("(labels.a = \"1\")"));
        assert!(filter.contains("(labels.b = \"2\")"));
    }
}
