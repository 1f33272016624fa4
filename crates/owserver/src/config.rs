//! Binding configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tl_eds::EdsConfig;

use crate::OwServerError;

pub const DEFAULT_CLIENT_ID: &str = "owserver-pb";
pub const DEFAULT_ZONE: &str = "local";
/// Seconds between description refreshes.
pub const DEFAULT_TD_INTERVAL: u64 = 3600;
/// Seconds between value polls.
pub const DEFAULT_VALUE_INTERVAL: u64 = 60;
pub const DEFAULT_DISCOVERY_TIMEOUT: u64 = 3;

/// Settings for one binding instance. Durations are in whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OwServerConfig {
    /// Publisher id used in thing ids.
    pub client_id: String,
    pub zone: String,
    /// Gateway host, URL or `file://` path. Empty selects discovery.
    pub gateway_address: String,
    pub login_name: String,
    pub password: String,
    /// Publish a description of the binding itself.
    #[serde(rename = "publishTD")]
    pub publish_td: bool,
    pub td_interval: u64,
    pub value_interval: u64,
    pub discovery_timeout: u64,
    /// Wait between clearing the running flag and closing the publisher.
    pub stop_grace: u64,
    /// Delays of the verification polls that follow a successful write.
    pub verify_delays: Vec<u64>,
}

impl Default for OwServerConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.into(),
            zone: DEFAULT_ZONE.into(),
            gateway_address: String::new(),
            login_name: String::new(),
            password: String::new(),
            publish_td: false,
            td_interval: DEFAULT_TD_INTERVAL,
            value_interval: DEFAULT_VALUE_INTERVAL,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            stop_grace: 1,
            verify_delays: vec![1, 5],
        }
    }
}

impl OwServerConfig {
    /// Load a JSON config file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, OwServerError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| OwServerError::Config(format!("{}: {err}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, OwServerError> {
        let config: Self =
            serde_json::from_str(text).map_err(|err| OwServerError::Config(err.to_string()))?;
        Ok(config.normalized())
    }

    /// Replace zero or empty settings that would stall the binding with defaults.
    pub fn normalized(mut self) -> Self {
        if self.td_interval == 0 {
            self.td_interval = DEFAULT_TD_INTERVAL;
        }
        if self.value_interval == 0 {
            self.value_interval = DEFAULT_VALUE_INTERVAL;
        }
        if self.discovery_timeout == 0 {
            self.discovery_timeout = DEFAULT_DISCOVERY_TIMEOUT;
        }
        if self.client_id.is_empty() {
            self.client_id = DEFAULT_CLIENT_ID.into();
        }
        if self.zone.is_empty() {
            self.zone = DEFAULT_ZONE.into();
        }
        self
    }

    pub fn eds_config(&self) -> EdsConfig {
        EdsConfig {
            address: self.gateway_address.clone(),
            login: self.login_name.clone(),
            password: self.password.clone(),
            discovery_timeout: Duration::from_secs(self.discovery_timeout),
            ..EdsConfig::default()
        }
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace)
    }

    pub fn verify_delays(&self) -> Vec<Duration> {
        self.verify_delays
            .iter()
            .copied()
            .map(Duration::from_secs)
            .collect()
    }
}
