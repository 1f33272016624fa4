//! In-memory state of every device seen on the gateway.

use std::collections::{BTreeMap, HashSet};

use eds_core::DeviceNode;

use crate::description::ThingDescription;

/// Last-known state of one device.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub thing_id: String,
    /// Node as seen on the last description refresh.
    pub node: DeviceNode,
    pub description: ThingDescription,
    /// Whether `description` reached the publisher.
    pub published: bool,
    /// Values as of the last successful publication.
    pub values: BTreeMap<String, String>,
    /// Consecutive description refreshes in which the device was absent.
    pub missing: u32,
}

/// Outcome of [`DeviceRegistry::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    /// The description changed or was never published.
    Updated,
    Unchanged,
}

/// Devices keyed by node id. Entries are kept when a device disappears.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node_id: &str) -> Option<&RegistryEntry> {
        self.entries.get(node_id)
    }

    pub fn upsert(&mut self, node: &DeviceNode, description: ThingDescription) -> Upsert {
        match self.entries.get_mut(&node.node_id) {
            None => {
                self.entries.insert(
                    node.node_id.clone(),
                    RegistryEntry {
                        thing_id: description.id.clone(),
                        node: node.clone(),
                        description,
                        published: false,
                        values: BTreeMap::new(),
                        missing: 0,
                    },
                );
                Upsert::Created
            }
            Some(entry) => {
                entry.node = node.clone();
                entry.missing = 0;
                if entry.description == description && entry.published {
                    return Upsert::Unchanged;
                }
                entry.thing_id = description.id.clone();
                entry.description = description;
                entry.published = false;
                Upsert::Updated
            }
        }
    }

    /// Record the outcome of publishing the current description.
    pub fn set_published(&mut self, node_id: &str, published: bool) {
        if let Some(entry) = self.entries.get_mut(node_id) {
            entry.published = published;
        }
    }

    /// Values that differ from the last recorded ones. Unknown devices report every value.
    pub fn diff_values(
        &self,
        node_id: &str,
        values: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        let Some(entry) = self.entries.get(node_id) else {
            return values.clone();
        };
        values
            .iter()
            .filter(|(name, value)| entry.values.get(*name) != Some(*value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Merge published values into the entry; returns `false` for unknown devices.
    pub fn record_values(&mut self, node_id: &str, values: &BTreeMap<String, String>) -> bool {
        match self.entries.get_mut(node_id) {
            Some(entry) => {
                entry
                    .values
                    .extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
                true
            }
            None => false,
        }
    }

    /// Count one more miss for every device not in `seen`.
    pub fn mark_missing(&mut self, seen: &HashSet<String>) {
        for (id, entry) in self.entries.iter_mut() {
            if !seen.contains(id) {
                entry.missing = entry.missing.saturating_add(1);
            }
        }
    }

    /// Devices absent for at least `threshold` consecutive refreshes.
    pub fn stale(&self, threshold: u32) -> Vec<&RegistryEntry> {
        self.entries
            .values()
            .filter(|entry| entry.missing >= threshold)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eds_core::NodeExtractor;
    use std::time::Duration;

    const FIXTURE: &str = include_str!("../../../fixtures/owserver-details.xml");

    fn nodes() -> Vec<DeviceNode> {
        let root = eds_xml::parse_document(FIXTURE.as_bytes()).expect("parse");
        NodeExtractor::default().extract(&root, Duration::ZERO)
    }

    fn td(node: &DeviceNode) -> ThingDescription {
        ThingDescription::from_node(node, "local", "test")
    }

    #[test]
    fn upsert_tracks_description_changes() {
        let nodes = nodes();
        let mut registry = DeviceRegistry::new();
        assert_eq!(registry.upsert(&nodes[1], td(&nodes[1])), Upsert::Created);
        // not published yet
        assert_eq!(registry.upsert(&nodes[1], td(&nodes[1])), Upsert::Updated);
        registry.set_published(&nodes[1].node_id, true);
        assert_eq!(registry.upsert(&nodes[1], td(&nodes[1])), Upsert::Unchanged);

        let mut renamed = td(&nodes[1]);
        renamed.title = "renamed".into();
        assert_eq!(registry.upsert(&nodes[1], renamed), Upsert::Updated);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn diff_reports_only_changed_values() {
        let nodes = nodes();
        let node = &nodes[2];
        let mut registry = DeviceRegistry::new();
        registry.upsert(node, td(node));

        let values = node.values();
        assert_eq!(registry.diff_values(&node.node_id, &values), values);
        assert!(registry.record_values(&node.node_id, &values));
        assert!(registry.diff_values(&node.node_id, &values).is_empty());

        let mut changed = values.clone();
        changed.insert("relay".into(), "1".into());
        let diff = registry.diff_values(&node.node_id, &changed);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.get("relay").map(String::as_str), Some("1"));

        assert!(!registry.record_values("nope", &changed));
        assert_eq!(registry.diff_values("nope", &changed), changed);
    }

    #[test]
    fn missing_devices_are_kept_and_counted() {
        let nodes = nodes();
        let mut registry = DeviceRegistry::new();
        for node in &nodes {
            registry.upsert(node, td(node));
        }
        let seen: HashSet<String> = nodes[..3].iter().map(|n| n.node_id.clone()).collect();
        registry.mark_missing(&seen);
        registry.mark_missing(&seen);
        assert_eq!(registry.len(), 4);
        let stale: Vec<_> = registry.stale(2).into_iter().map(|e| e.node.node_id.clone()).collect();
        assert_eq!(stale, [nodes[3].node_id.clone()]);

        registry.upsert(&nodes[3], td(&nodes[3]));
        assert!(registry.stale(1).is_empty());
        assert!(!registry.is_empty());
        assert_eq!(registry.ids().count(), 4);
    }
}
