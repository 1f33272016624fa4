//! Thing descriptions published for each device node.

use std::collections::BTreeMap;

use eds_core::{DeviceNode, DeviceType};
use eds_vocab::{names, DataType};
use serde::{Deserialize, Serialize};

/// How a property is exposed to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    /// Read-only information about the device.
    Attribute,
    /// Writable setting.
    Configuration,
    /// Measured value, also published as an event.
    Sensor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyAffordance {
    pub title: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
    pub read_only: bool,
    pub kind: PropertyKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAffordance {
    pub title: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionAffordance {
    pub title: String,
    /// Type of the value the action accepts.
    pub input: DataType,
}

/// Description of one device as published to the hub.
///
/// Values are not part of the description; they travel as separate batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThingDescription {
    pub id: String,
    pub title: String,
    pub description: String,
    pub device_type: DeviceType,
    pub properties: BTreeMap<String, PropertyAffordance>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub events: BTreeMap<String, EventAffordance>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub actions: BTreeMap<String, ActionAffordance>,
}

/// `urn:{zone}:{publisher}:{node_id}:{device_type}`
pub fn thing_id(zone: &str, publisher: &str, node_id: &str, device_type: DeviceType) -> String {
    format!("urn:{zone}:{publisher}:{node_id}:{device_type}")
}

impl ThingDescription {
    pub fn from_node(node: &DeviceNode, zone: &str, publisher: &str) -> Self {
        let mut td = Self {
            id: thing_id(zone, publisher, &node.node_id, node.device_type),
            title: node.name.clone(),
            description: node.description.clone(),
            device_type: node.device_type,
            properties: BTreeMap::new(),
            events: BTreeMap::new(),
            actions: BTreeMap::new(),
        };

        for attr in node.attributes.values() {
            let kind = if attr.is_sensor {
                PropertyKind::Sensor
            } else if attr.writable {
                PropertyKind::Configuration
            } else {
                PropertyKind::Attribute
            };
            td.properties.insert(
                attr.name.clone(),
                PropertyAffordance {
                    title: attr.name.clone(),
                    data_type: attr.data_type,
                    unit: attr.unit.clone(),
                    // sensors are changed through their action
                    read_only: attr.is_sensor || !attr.writable,
                    kind,
                },
            );
            if !attr.is_sensor {
                continue;
            }
            td.events.insert(
                attr.name.clone(),
                EventAffordance {
                    title: attr.name.clone(),
                    data_type: attr.data_type,
                    unit: attr.unit.clone(),
                },
            );
            if attr.writable {
                td.actions.insert(
                    attr.name.clone(),
                    ActionAffordance {
                        title: attr.name.clone(),
                        input: attr.data_type,
                    },
                );
            }
        }
        td
    }

    /// Description of the binding itself, carrying the gateway address it uses.
    pub fn for_service(zone: &str, publisher: &str) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(
            names::GATEWAY_ADDRESS.to_string(),
            PropertyAffordance {
                title: "Gateway address".to_string(),
                data_type: DataType::String,
                unit: String::new(),
                read_only: true,
                kind: PropertyKind::Attribute,
            },
        );
        Self {
            id: thing_id(zone, publisher, publisher, DeviceType::Service),
            title: publisher.to_string(),
            description: "EDS OWServer binding".to_string(),
            device_type: DeviceType::Service,
            properties,
            events: BTreeMap::new(),
            actions: BTreeMap::new(),
        }
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

    #[test]
    fn ids_follow_zone_publisher_node_and_type() {
        let nodes = nodes();
        let td = ThingDescription::from_node(&nodes[1], "home", "owserver-pb");
        assert_eq!(td.id, "urn:home:owserver-pb:5F00000B1F1C3828:thermometer");
        assert_eq!(td.title, "owd_DS18B20");
    }

    #[test]
    fn sensors_get_events_and_writable_sensors_actions() {
        let nodes = nodes();
        let td = ThingDescription::from_node(&nodes[2], "local", "owserver-pb");
        assert_eq!(td.properties.len(), nodes[2].attributes.len());

        let relay = &td.properties[names::RELAY];
        assert_eq!(relay.kind, PropertyKind::Sensor);
        assert!(relay.read_only);
        assert!(td.events.contains_key(names::RELAY));
        assert_eq!(td.actions[names::RELAY].input, DataType::Boolean);

        assert!(td.events.contains_key(names::TEMPERATURE));
        assert!(!td.actions.contains_key(names::TEMPERATURE));

        let alarm = &td.properties["TemperatureHighAlarmValue"];
        assert_eq!(alarm.kind, PropertyKind::Configuration);
        assert!(!alarm.read_only);
        assert_eq!(td.properties["Health"].kind, PropertyKind::Attribute);
        assert!(td.properties["Health"].read_only);
    }

    #[test]
    fn service_description_exposes_gateway_address() {
        let td = ThingDescription::for_service("local", "owserver-pb");
        assert_eq!(td.id, "urn:local:owserver-pb:owserver-pb:service");
        assert!(td.properties.contains_key(names::GATEWAY_ADDRESS));
        let json = serde_json::to_value(&td).expect("json");
        assert_eq!(json["deviceType"], "service");
        assert!(json.get("events").is_none());
    }
}
