//! Label contract applied to every artifact a build produces.
//!
//! Registry garbage collection and the artifact reconciler find "their" artifacts by exact
//! label match, so the key names and the `1`/`0` encoding of the intermediate marker are part
//! of the wire contract.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::TaskId;

pub const LABEL_TASK_ID: &str = "_orchest_env_build_task_uuid";
pub const LABEL_PROJECT_ID: &str = "_orchest_project_uuid";
pub const LABEL_ENVIRONMENT_ID: &str = "_orchest_environment_uuid";
pub const LABEL_INTERMEDIATE: &str = "_orchest_env_build_is_intermediate";

/// A single `key=value` tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub key: String,
    pub value: String,
}

impl Label {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn intermediate(flag: bool) -> Self {
        Self::new(LABEL_INTERMEDIATE, if flag { "1" } else { "0" })
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Ordered identity tags of a build: task, project, environment.
///
/// The intermediate marker is not part of this set because its value changes during the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildLabels(Vec<Label>);

impl BuildLabels {
    pub fn new(task_id: &TaskId, project_id: &str, environment_id: &str) -> Self {
        Self(vec![
            Label::new(LABEL_TASK_ID, task_id.as_str()),
            Label::new(LABEL_PROJECT_ID, project_id),
            Label::new(LABEL_ENVIRONMENT_ID, environment_id),
        ])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value for `key`, if the label is present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|l| l.key == key)
            .map(|l| l.value.as_str())
    }
}

/// Conjunction of exact label predicates used to look artifacts up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelFilter {
    labels: Vec<Label>,
}

impl LabelFilter {
    pub fn new(labels: Vec<Label>) -> Self {
        Self { labels }
    }

    /// Filter selecting the leftovers of a build attempt.
    ///
    /// A normally finished build only owns artifacts still flagged as intermediate.
    /// An aborted build may never reach the `intermediate=0` flip, so the intermediate
    /// predicate is dropped and everything tagged with the task id matches.
    pub fn for_cleanup(task_id: &TaskId, aborted: bool) -> Self {
        let mut labels = Vec::with_capacity(2);
        if !aborted {
            labels.push(Label::intermediate(true));
        }
        labels.push(Label::new(LABEL_TASK_ID, task_id.as_str()));
        Self { labels }
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// `key=value` strings, the form container engines expect in a `label` filter.
    pub fn to_strings(&self) -> Vec<String> {
        self.labels.iter().map(Label::to_string).collect()
    }

    /// Returns `true` if an artifact carrying `tags` satisfies every predicate.
    pub fn matches<'a, I>(&self, tags: I) -> bool
    where
        I: IntoIterator<Item = &'a Label> + Clone,
    {
        self.labels
            .iter()
            .all(|want| tags.clone().into_iter().any(|have| have == want))
    }

    /// Returns `true` if every artifact matched by `other` is also matched by `self`.
    pub fn is_wider_than_or_equal(&self, other: &LabelFilter) -> bool {
        self.labels.iter().all(|l| other.labels.contains(l))
    }
}
