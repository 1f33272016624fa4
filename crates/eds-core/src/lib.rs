//! Device node model: flatten a decoded OWServer tree into typed device nodes.

use std::collections::BTreeMap;
use std::time::Duration;

use eds_vocab::{names, round_value, units, vendor, DataType, Vocabulary, GATEWAY_DESCRIPTION};
use eds_xml::XmlNode;
use tracing::{debug, trace};

pub use eds_vocab::DeviceType;

/// One named value of a device node.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Attribute {
    /// Canonical name.
    pub name: String,
    /// Tag the gateway used for this value.
    pub vendor_name: String,
    /// Canonical unit, empty when the gateway reports none.
    pub unit: String,
    pub writable: bool,
    /// Value text, rounded for numeric sensors.
    pub value: String,
    /// Set for leaves found in the sensor table.
    pub is_sensor: bool,
    pub data_type: DataType,
}

/// A 1-Wire device, or the gateway itself, with its attributes keyed by canonical name.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceNode {
    pub device_type: DeviceType,
    /// ROM id, the gateway's `DeviceName`, or a synthesized `{tag}-{position}`.
    pub node_id: String,
    pub name: String,
    pub description: String,
    pub attributes: BTreeMap<String, Attribute>,
}

impl DeviceNode {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Current value of every attribute keyed by canonical name.
    pub fn values(&self) -> BTreeMap<String, String> {
        self.attributes
            .iter()
            .map(|(name, attr)| (name.clone(), attr.value.clone()))
            .collect()
    }

    /// Attributes classified as sensors.
    pub fn sensors(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values().filter(|attr| attr.is_sensor)
    }
}

/// Walks decoded trees using a fixed [`Vocabulary`].
#[derive(Debug, Clone, Default)]
pub struct NodeExtractor {
    vocab: Vocabulary,
}

impl NodeExtractor {
    pub fn new(vocab: Vocabulary) -> Self {
        Self { vocab }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Flatten a gateway document into device nodes, gateway first.
    ///
    /// A non-zero `latency` is recorded on the root node as the `latency`
    /// attribute in seconds.
    pub fn extract(&self, root: &XmlNode, latency: Duration) -> Vec<DeviceNode> {
        self.extract_node(root, latency, true)
    }

    /// Extract `node` and every nested device below it in depth-first pre-order.
    ///
    /// Elements with child elements become devices; elements without become
    /// attributes of their parent. `is_root` enables the `DeviceName`
    /// override and latency injection.
    pub fn extract_node(
        &self,
        node: &XmlNode,
        latency: Duration,
        is_root: bool,
    ) -> Vec<DeviceNode> {
        let mut out = Vec::new();
        self.walk(node, latency, is_root, &mut out);
        debug!(root = node.tag(), nodes = out.len(), "extracted device nodes");
        out
    }

    fn walk(&self, node: &XmlNode, latency: Duration, is_root: bool, out: &mut Vec<DeviceNode>) {
        let position = out.len();
        let mut device = DeviceNode {
            device_type: if is_root {
                DeviceType::Gateway
            } else {
                DeviceType::Unknown
            },
            node_id: String::new(),
            name: node.tag().to_string(),
            description: node.attribute(vendor::DESCRIPTION).unwrap_or_default().to_string(),
            attributes: BTreeMap::new(),
        };

        if is_root && !latency.is_zero() {
            device.attributes.insert(
                names::LATENCY.to_string(),
                Attribute {
                    name: names::LATENCY.to_string(),
                    vendor_name: names::LATENCY.to_string(),
                    unit: units::SECONDS.to_string(),
                    writable: false,
                    value: format!("{:.3}", latency.as_secs_f64()),
                    is_sensor: false,
                    data_type: DataType::Number,
                },
            );
        }

        let mut rom_id = None;
        let mut device_name = None;
        for leaf in node.children().iter().filter(|child| child.is_leaf()) {
            let tag = leaf.tag();
            let text = leaf.text();
            match tag {
                vendor::FAMILY => device.device_type = self.vocab.device_type(text),
                vendor::ROM_ID => rom_id = Some(text.to_string()),
                vendor::DEVICE_NAME if is_root => device_name = Some(text.to_string()),
                _ => {}
            }
            if let Some(attr) = self.leaf_attribute(leaf) {
                device.attributes.insert(attr.name.clone(), attr);
            }
        }

        // DeviceName wins over ROMId on the root regardless of document order.
        match (device_name, rom_id) {
            (Some(name), _) => {
                device.node_id = name.clone();
                device.name = name;
                device.description = GATEWAY_DESCRIPTION.to_string();
            }
            (None, Some(rom)) => device.node_id = rom,
            (None, None) => device.node_id = format!("{}-{}", node.tag(), position),
        }
        trace!(
            node = %device.node_id,
            kind = %device.device_type,
            attributes = device.attributes.len(),
            "device node"
        );
        out.push(device);

        for nested in node.children().iter().filter(|child| !child.is_leaf()) {
            self.walk(nested, Duration::ZERO, false, out);
        }
    }

    /// Classify one leaf; `None` when the vocabulary suppresses it.
    fn leaf_attribute(&self, leaf: &XmlNode) -> Option<Attribute> {
        let tag = leaf.tag();
        let writable = leaf
            .attribute(vendor::WRITABLE)
            .is_some_and(|w| w.trim().eq_ignore_ascii_case("true"));
        let unit = self
            .vocab
            .map_unit(leaf.attribute(vendor::UNITS).unwrap_or_default())
            .to_string();

        if let Some(info) = self.vocab.sensor(tag) {
            return Some(Attribute {
                name: info.name.to_string(),
                vendor_name: tag.to_string(),
                unit,
                writable,
                value: round_value(leaf.text(), info.decimals),
                is_sensor: true,
                data_type: info.data_type,
            });
        }

        let Some(name) = self.vocab.map_attribute(tag) else {
            trace!(tag, "suppressed attribute");
            return None;
        };
        Some(Attribute {
            name: name.to_string(),
            vendor_name: tag.to_string(),
            unit,
            writable,
            value: leaf.text().to_string(),
            is_sensor: false,
            data_type: DataType::String,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eds_xml::parse_document;

    const FIXTURE: &str = include_str!("../../../fixtures/owserver-details.xml");

    fn extract(xml: &str) -> Vec<DeviceNode> {
        let root = parse_document(xml.as_bytes()).expect("parse");
        NodeExtractor::default().extract(&root, Duration::ZERO)
    }

    #[test]
    fn fixture_yields_gateway_then_devices() {
        let nodes = extract(FIXTURE);
        assert_eq!(nodes.len(), 4);

        let gateway = &nodes[0];
        assert_eq!(gateway.device_type, DeviceType::Gateway);
        assert_eq!(gateway.node_id, "EDS OWServer-Enet2");
        assert_eq!(gateway.name, "EDS OWServer-Enet2");
        assert_eq!(gateway.description, GATEWAY_DESCRIPTION);
        assert_eq!(
            gateway.attribute(names::MAC).map(|a| a.value.as_str()),
            Some("00:04:A3:2D:68:E9")
        );
        assert!(gateway.attribute("PollCount").is_none());
        assert!(gateway.attribute("DateTime").is_none());
        assert!(gateway.attribute(names::LATENCY).is_none());

        let kinds: Vec<_> = nodes.iter().map(|n| n.device_type).collect();
        assert_eq!(
            kinds,
            [
                DeviceType::Gateway,
                DeviceType::Thermometer,
                DeviceType::Multisensor,
                DeviceType::Unknown
            ]
        );
        assert_eq!(nodes[1].node_id, "5F00000B1F1C3828");
        assert_eq!(nodes[1].description, "Programmable resolution thermometer");
    }

    #[test]
    fn sensors_are_renamed_rounded_and_typed() {
        let nodes = extract(FIXTURE);
        let multi = &nodes[2];

        let temp = multi.attribute(names::TEMPERATURE).expect("temperature");
        assert!(temp.is_sensor);
        assert_eq!(temp.value, "72.3");
        assert_eq!(temp.unit, units::FAHRENHEIT);
        assert_eq!(temp.vendor_name, "Temperature");
        assert_eq!(multi.attribute(names::HUMIDITY).map(|a| a.value.as_str()), Some("46"));

        let relay = multi.attribute(names::RELAY).expect("relay");
        assert!(relay.writable);
        assert_eq!(relay.data_type, DataType::Boolean);
        assert_eq!(relay.value, "0");

        let alarm = multi.attribute("TemperatureHighAlarmValue").expect("alarm");
        assert!(alarm.writable);
        assert!(!alarm.is_sensor);

        // non-numeric sensor text is kept as is
        let battery = &nodes[3];
        assert_eq!(battery.attribute(names::TEMPERATURE).map(|a| a.value.as_str()), Some("n/a"));
        assert_eq!(battery.attribute("VDD").map(|a| a.unit.as_str()), Some(units::VOLT));
    }

    #[test]
    fn boolean_sensors_are_rounded_too() {
        let xml = concat!(
            "<Root><owd_EDS0065><Family>7E</Family><ROMId>A1</ROMId>",
            r#"<RelayState Writable="True">1.0</RelayState></owd_EDS0065></Root>"#,
        );
        let relay = extract(xml)[1].attribute(names::RELAY).cloned().expect("relay");
        assert_eq!(relay.data_type, DataType::Boolean);
        assert_eq!(relay.value, "1");
    }

    #[test]
    fn extraction_is_deterministic() {
        assert_eq!(extract(FIXTURE), extract(FIXTURE));
    }

    #[test]
    fn device_name_wins_over_rom_id_in_any_order() {
        let xml = r#"<Root><DeviceName>gw</DeviceName><ROMId>AAAA</ROMId></Root>"#;
        assert_eq!(extract(xml)[0].node_id, "gw");
        let xml = r#"<Root><ROMId>AAAA</ROMId><DeviceName>gw</DeviceName></Root>"#;
        let root = &extract(xml)[0];
        assert_eq!(root.node_id, "gw");
        assert_eq!(root.description, GATEWAY_DESCRIPTION);
    }

    #[test]
    fn device_name_below_root_is_a_plain_attribute() {
        let xml = r#"<Root><Dev><ROMId>01</ROMId><DeviceName>cellar</DeviceName></Dev></Root>"#;
        let nodes = extract(xml);
        assert_eq!(nodes[1].node_id, "01");
        assert_eq!(nodes[1].name, "Dev");
        assert_eq!(nodes[1].attribute(names::NAME).map(|a| a.value.as_str()), Some("cellar"));
    }

    #[test]
    fn nesting_is_flattened_pre_order() {
        let xml = r#"<Root>
            <A><ROMId>a</ROMId><B><ROMId>b</ROMId><C><X>1</X></C></B></A>
            <D><ROMId>d</ROMId></D>
        </Root>"#;
        let ids: Vec<_> = extract(xml).into_iter().map(|n| n.node_id).collect();
        assert_eq!(ids, ["Root-0", "a", "b", "C-3", "d"]);
    }

    #[test]
    fn duplicates_overwrite_and_writable_is_case_insensitive() {
        let xml = concat!(
            r#"<Root><Dev><ROMId>1</ROMId><Health>1</Health>"#,
            r#"<Health Writable="TRUE">2</Health></Dev></Root>"#,
        );
        let dev = &extract(xml)[1];
        let health = dev.attribute("Health").expect("health");
        assert_eq!(health.value, "2");
        assert!(health.writable);
        assert_eq!(dev.device_type, DeviceType::Unknown);
    }

    #[test]
    fn unknown_family_is_unknown() {
        let xml = r#"<Root><Dev><Family>ZZ</Family><ROMId>1</ROMId></Dev></Root>"#;
        assert_eq!(extract(xml)[1].device_type, DeviceType::Unknown);
    }

    #[test]
    fn latency_lands_on_root_only() {
        let root = parse_document(FIXTURE.as_bytes()).expect("parse");
        let nodes = NodeExtractor::default().extract(&root, Duration::from_millis(1234));
        let latency = nodes[0].attribute(names::LATENCY).expect("latency");
        assert_eq!(latency.value, "1.234");
        assert_eq!(latency.unit, units::SECONDS);
        assert!(nodes[1..].iter().all(|n| n.attribute(names::LATENCY).is_none()));
    }

    #[test]
    fn values_map_follows_attributes() {
        let nodes = extract(FIXTURE);
        let values = nodes[1].values();
        assert_eq!(values.get(names::TEMPERATURE).map(String::as_str), Some("21.8"));
        assert_eq!(values.len(), nodes[1].attributes.len());
        assert_eq!(nodes[2].sensors().count(), 5);
    }
}
