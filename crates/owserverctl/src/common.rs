use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use owserver::publisher::{PublishError, Publisher};
use owserver::{OwServerBinding, OwServerConfig, ThingDescription};
use serde::Serialize;
use tl_eds::EdsClient;

/// Gateway settings given on the command line; they override the config file.
#[derive(Debug, Clone, Default)]
pub struct GatewayOverrides {
    pub address: Option<String>,
    pub login: Option<String>,
    pub password: Option<String>,
}

pub fn load_config(path: Option<&Path>, overrides: &GatewayOverrides) -> Result<OwServerConfig> {
    let mut config = match path {
        Some(path) => OwServerConfig::from_json_file(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => OwServerConfig::default(),
    };
    if let Some(address) = &overrides.address {
        config.gateway_address = address.clone();
    }
    if let Some(login) = &overrides.login {
        config.login_name = login.clone();
    }
    if let Some(password) = &overrides.password {
        config.password = password.clone();
    }
    Ok(config.normalized())
}

pub fn client(config: &OwServerConfig) -> Result<EdsClient> {
    EdsClient::new(config.eds_config()).context("create gateway client")
}

/// Binding publishing to stdout, talking to the configured gateway.
pub fn binding(config: OwServerConfig) -> Result<OwServerBinding> {
    let gateway = Arc::new(client(&config)?);
    Ok(OwServerBinding::new(config, Arc::new(JsonLinesPublisher)).with_gateway(gateway))
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    println!("{text}");
    Ok(())
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Publication<'a> {
    Description {
        thing: &'a ThingDescription,
    },
    Values {
        #[serde(rename = "thingId")]
        thing_id: &'a str,
        values: &'a BTreeMap<String, String>,
    },
}

/// Writes one JSON object per publication to stdout.
#[derive(Debug, Default)]
pub struct JsonLinesPublisher;

impl JsonLinesPublisher {
    fn emit(&self, publication: &Publication<'_>) -> Result<(), PublishError> {
        let line = serde_json::to_string(publication)
            .map_err(|err| PublishError::Rejected(err.to_string()))?;
        let mut out = std::io::stdout().lock();
        writeln!(out, "{line}").map_err(|err| PublishError::Rejected(err.to_string()))
    }
}

#[async_trait]
impl Publisher for JsonLinesPublisher {
    async fn publish_description(
        &self,
        description: &ThingDescription,
    ) -> Result<(), PublishError> {
        self.emit(&Publication::Description { thing: description })
    }

    async fn publish_values(
        &self,
        thing_id: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<(), PublishError> {
        self.emit(&Publication::Values { thing_id, values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_over_defaults() {
        let overrides = GatewayOverrides {
            address: Some("10.0.0.9".into()),
            login: Some("admin".into()),
            password: None,
        };
        let config = load_config(None, &overrides).expect("config");
        assert_eq!(config.gateway_address, "10.0.0.9");
        assert_eq!(config.login_name, "admin");
        assert_eq!(config.password, "");
        assert_eq!(config.client_id, "owserver-pb");
    }

    #[test]
    fn publications_are_tagged() {
        let values = BTreeMap::from([("relay".to_string(), "1".to_string())]);
        let json = serde_json::to_value(Publication::Values {
            thing_id: "urn:x",
            values: &values,
        })
        .expect("json");
        assert_eq!(json["kind"], "values");
        assert_eq!(json["thingId"], "urn:x");
        assert_eq!(json["values"]["relay"], "1");
    }
}
