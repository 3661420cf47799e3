use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use crate::resource::{ResourceKind, ResourceNode};

/// Tag- and name-based predicate that exempts resources from scanning or termination.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreservationRule {
    #[serde(default)]
    pub freeform_tags: BTreeMap<String, String>,
    /// namespace -> key -> value
    #[serde(default)]
    pub defined_tags: BTreeMap<String, BTreeMap<String, String>>,
    /// Compartment names that are never scanned nor terminated.
    #[serde(default)]
    pub compartments: BTreeSet<String>,
}

impl PreservationRule {
    pub fn is_empty(&self) -> bool {
        self.freeform_tags.is_empty() && self.defined_tags.is_empty() && self.compartments.is_empty()
    }

    pub fn matches(&self, node: &ResourceNode) -> bool {
        self.matches_tags(node) || self.matches_name(node)
    }

    pub fn matches_tags(&self, node: &ResourceNode) -> bool {
        let freeform = self
            .freeform_tags
            .iter()
            .any(|(key, value)| node.freeform_tags.get(key) == Some(value));
        if freeform {
            return true;
        }

        self.defined_tags.iter().any(|(namespace, pairs)| {
            let Some(tags) = node.defined_tags.get(namespace) else {
                return false;
            };
            pairs.iter().any(|(key, value)| {
                tags.get(key)
                    .is_some_and(|tag| defined_tag_text(tag) == value.as_str())
            })
        })
    }

    // NOTE: name preservation only applies to compartments
    pub fn matches_name(&self, node: &ResourceNode) -> bool {
        node.kind == ResourceKind::Compartment && self.compartments.contains(&node.name)
    }
}

fn defined_tag_text(value: &serde_json::Value) -> std::borrow::Cow<'_, str> {
    match value {
        serde_json::Value::String(s) => std::borrow::Cow::Borrowed(s.as_str()),
        other => std::borrow::Cow::Owned(other.to_string()),
    }
}
