#![cfg_attr(docsrs, feature(doc_cfg))]
//! Canonical vocabulary for the EDS OWServer bridge.
//!
//! All vendor-specific naming knowledge lives here: attribute renames (and
//! the attributes that are dropped as noise), sensor names with their
//! rounding precision, unit names and the 1-Wire family code table. Adding a
//! sensor type means adding a table row, not touching the extraction code.

use core::fmt;
use std::collections::HashMap;

/// Canonical property names.
pub mod names {
    /// MAC address of the gateway (`MACAddress`).
    pub const MAC: &str = "mac";
    /// Device display name (`DeviceName`).
    pub const NAME: &str = "name";
    /// Network host name (`HostName`).
    pub const HOSTNAME: &str = "hostname";
    /// Round-trip time of the last gateway fetch, in seconds.
    pub const LATENCY: &str = "latency";
    /// Address the bridge uses to reach the gateway.
    pub const GATEWAY_ADDRESS: &str = "gatewayAddress";

    pub const ATMOSPHERIC_PRESSURE: &str = "atmosphericpressure";
    pub const DEWPOINT: &str = "dewpoint";
    pub const HEAT_INDEX: &str = "heatindex";
    pub const HUMIDITY: &str = "humidity";
    pub const HUMIDEX: &str = "humidex";
    pub const LUMINANCE: &str = "luminance";
    pub const RELAY: &str = "relay";
    pub const TEMPERATURE: &str = "temperature";
}

/// Canonical unit names.
pub mod units {
    pub const PERCENT: &str = "%";
    pub const MILLIBAR: &str = "mbar";
    pub const CELSIUS: &str = "°C";
    pub const FAHRENHEIT: &str = "°F";
    pub const MERCURY: &str = "inHg";
    pub const LUX: &str = "lux";
    pub const COUNT: &str = "count";
    pub const VOLT: &str = "V";
    pub const SECONDS: &str = "sec";
}

/// Vendor tag names that carry identity rather than plain attribute data.
pub mod vendor {
    pub const FAMILY: &str = "Family";
    pub const ROM_ID: &str = "ROMId";
    pub const DEVICE_NAME: &str = "DeviceName";
    pub const DESCRIPTION: &str = "Description";
    pub const WRITABLE: &str = "Writable";
    pub const UNITS: &str = "Units";
}

/// Description given to the root node once it is identified by `DeviceName`.
pub const GATEWAY_DESCRIPTION: &str = "EDS OWServer Gateway";

/// Kind of device a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DeviceType {
    Gateway,
    Thermometer,
    Multisensor,
    /// The bridge service itself.
    Service,
    /// Family code not present in the family table.
    Unknown,
}

impl DeviceType {
    pub const fn as_str(self) -> &'static str {
        match self {
            DeviceType::Gateway => "gateway",
            DeviceType::Thermometer => "thermometer",
            DeviceType::Multisensor => "multisensor",
            DeviceType::Service => "service",
            DeviceType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Value type advertised for a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DataType {
    Number,
    Boolean,
    String,
}

/// Canonical identity of a known sensor type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorInfo {
    /// Canonical property name.
    pub name: &'static str,
    /// Number of decimals kept when the raw value is numeric.
    pub decimals: u32,
    pub data_type: DataType,
}

/// Immutable lookup tables built once at construction.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    /// Vendor attribute → canonical name; `None` marks attributes that are dropped.
    attributes: HashMap<&'static str, Option<&'static str>>,
    sensors: HashMap<&'static str, SensorInfo>,
    units: HashMap<&'static str, &'static str>,
    families: HashMap<&'static str, DeviceType>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::owserver()
    }
}

impl Vocabulary {
    /// Tables for the EDS OWServer-ENet2 gateway.
    pub fn owserver() -> Self {
        let attributes = HashMap::from([
            ("MACAddress", Some(names::MAC)),
            ("DeviceName", Some(names::NAME)),
            ("HostName", Some(names::HOSTNAME)),
            // chatty, change every poll and carry no information
            ("DateTime", None),
            ("RawData", None),
            ("Counter1", None),
            ("Counter2", None),
            ("PollCount", None),
            ("PrimaryValue", None),
        ]);

        let sensor = |name, decimals, data_type| SensorInfo {
            name,
            decimals,
            data_type,
        };
        let sensors = HashMap::from([
            (
                "BarometricPressureMb",
                sensor(names::ATMOSPHERIC_PRESSURE, 0, DataType::Number),
            ),
            ("DewPoint", sensor(names::DEWPOINT, 1, DataType::Number)),
            ("HeatIndex", sensor(names::HEAT_INDEX, 1, DataType::Number)),
            ("Humidity", sensor(names::HUMIDITY, 0, DataType::Number)),
            ("Humidex", sensor(names::HUMIDEX, 1, DataType::Number)),
            ("Light", sensor(names::LUMINANCE, 0, DataType::Number)),
            ("RelayState", sensor(names::RELAY, 0, DataType::Boolean)),
            ("Temperature", sensor(names::TEMPERATURE, 1, DataType::Number)),
        ]);

        let units = HashMap::from([
            ("PercentRelativeHumidity", units::PERCENT),
            ("Millibars", units::MILLIBAR),
            ("Centigrade", units::CELSIUS),
            ("Fahrenheit", units::FAHRENHEIT),
            ("InchesOfMercury", units::MERCURY),
            ("Lux", units::LUX),
            ("#", units::COUNT),
            ("Volt", units::VOLT),
        ]);

        // See http://owfs.sourceforge.net/simple_family.html
        let families = HashMap::from([
            ("10", DeviceType::Thermometer),
            ("28", DeviceType::Thermometer),
            ("3B", DeviceType::Thermometer),
            ("42", DeviceType::Thermometer),
            ("7E", DeviceType::Multisensor),
        ]);

        Self {
            attributes,
            sensors,
            units,
            families,
        }
    }

    /// Canonical name for a generic attribute, or `None` when the attribute is suppressed.
    ///
    /// Names missing from the table pass through unchanged.
    pub fn map_attribute<'a>(&self, vendor: &'a str) -> Option<&'a str> {
        match self.attributes.get(vendor) {
            Some(Some(canonical)) => Some(*canonical),
            Some(None) => None,
            None => Some(vendor),
        }
    }

    pub fn sensor(&self, vendor: &str) -> Option<&SensorInfo> {
        self.sensors.get(vendor)
    }

    /// Canonical unit name; unknown units pass through unchanged.
    pub fn map_unit<'a>(&self, vendor: &'a str) -> &'a str {
        self.units.get(vendor).copied().unwrap_or(vendor)
    }

    /// Device type for a 1-Wire family code.
    pub fn device_type(&self, family: &str) -> DeviceType {
        self.families
            .get(family.trim())
            .copied()
            .unwrap_or(DeviceType::Unknown)
    }

    /// Vendor variable name for a canonical property name.
    ///
    /// Sensors are searched first, then renamed attributes. Names without a
    /// vendor counterpart are returned unchanged.
    pub fn vendor_name<'a>(&self, canonical: &'a str) -> &'a str {
        if let Some((vendor, _)) = self
            .sensors
            .iter()
            .find(|(_, info)| info.name == canonical)
        {
            return *vendor;
        }
        self.attributes
            .iter()
            .find(|(_, mapped)| **mapped == Some(canonical))
            .map(|(vendor, _)| *vendor)
            .unwrap_or(canonical)
    }

    /// Look up the sensor entry by its canonical name.
    pub fn sensor_by_canonical(&self, canonical: &str) -> Option<&SensorInfo> {
        self.sensors.values().find(|info| info.name == canonical)
    }
}

/// Round a numeric value to `decimals` fraction digits.
///
/// Rounding is best effort: text that does not parse as a finite number is
/// returned unchanged.
pub fn round_value(raw: &str, decimals: u32) -> String {
    let Ok(value) = raw.trim().parse::<f64>() else {
        return raw.to_string();
    };
    if !value.is_finite() {
        return raw.to_string();
    }
    let ratio = 10f64.powi(decimals as i32);
    let mut rounded = (value * ratio).round() / ratio;
    if rounded == 0.0 {
        // no "-0.0"
        rounded = 0.0;
    }
    format!("{rounded:.prec$}", prec = decimals as usize)
}
