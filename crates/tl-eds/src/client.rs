//! Gateway client: fetch `details.xml` and issue variable writes.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use eds_xml::{parse_document, XmlNode};
use reqwest::RequestBuilder;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, trace};

use crate::discovery::{self, discover};
use crate::EdsError;

/// Document path of the device tree.
pub const DETAILS_PATH: &str = "/details.xml";
/// Endpoint accepting `rom`, `variable` and `value` query parameters.
pub const WRITE_PATH: &str = "/devices.htm";
/// Address prefix selecting a local file instead of the network.
pub const FILE_PREFIX: &str = "file://";

/// Default HTTP request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Connection settings for one gateway.
#[derive(Debug, Clone)]
pub struct EdsConfig {
    /// Host, host:port, base URL or `file://` path. Empty selects discovery.
    pub address: String,
    /// Basic auth user; empty disables authentication.
    pub login: String,
    pub password: String,
    pub discovery_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for EdsConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            login: String::new(),
            password: String::new(),
            discovery_timeout: discovery::DEFAULT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Access to one OWServer gateway.
///
/// Fetches and discovery are serialized: a second caller waits for the
/// in-flight fetch to finish. Writes do not take that lock.
pub struct EdsClient {
    address: Mutex<String>,
    login: String,
    password: String,
    discovery_timeout: Duration,
    fetch_lock: AsyncMutex<()>,
    http: reqwest::Client,
}

impl EdsClient {
    pub fn new(config: EdsConfig) -> Result<Self, EdsError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            address: Mutex::new(config.address.trim().to_string()),
            login: config.login,
            password: config.password,
            discovery_timeout: config.discovery_timeout,
            fetch_lock: AsyncMutex::new(()),
            http,
        })
    }

    /// Configured or discovered address; empty until discovery succeeded.
    pub fn last_address(&self) -> String {
        self.address
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fetch and decode the gateway document.
    pub async fn read_document(&self) -> Result<XmlNode, EdsError> {
        let raw = self.read_raw().await?;
        Ok(parse_document(&raw)?)
    }

    /// Fetch the raw gateway document, discovering the gateway first when no address is known.
    pub async fn read_raw(&self) -> Result<Bytes, EdsError> {
        let _guard = self.fetch_lock.lock().await;
        let address = self.resolve_address().await?;

        if let Some(path) = address.strip_prefix(FILE_PREFIX) {
            let data = tokio::fs::read(path).await?;
            trace!(path, bytes = data.len(), "read gateway document from file");
            return Ok(Bytes::from(data));
        }

        let url = format!("{}{}", base_url(&address), DETAILS_PATH);
        let started = Instant::now();
        let body = self
            .authorize(self.http.get(&url))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        debug!(%url, bytes = body.len(), elapsed = ?started.elapsed(), "fetched gateway document");
        Ok(body)
    }

    /// Set `variable` of device `rom` to `value`. The response body is not interpreted.
    pub async fn write_data(&self, rom: &str, variable: &str, value: &str) -> Result<(), EdsError> {
        let address = self.last_address();
        if address.is_empty() {
            return Err(EdsError::NotInitialized("gateway address unknown".into()));
        }
        if address.starts_with(FILE_PREFIX) {
            return Err(EdsError::Unsupported(format!("write to {address}")));
        }

        let url = format!("{}{}", base_url(&address), WRITE_PATH);
        info!(%url, rom, variable, value, "writing gateway variable");
        let response = self
            .authorize(self.http.get(&url))
            .query(&[("rom", rom), ("variable", variable), ("value", value)])
            .send()
            .await
            .map_err(|err| EdsError::Write(format!("{url}: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EdsError::Write(format!("{url} returned {status}")));
        }
        Ok(())
    }

    async fn resolve_address(&self) -> Result<String, EdsError> {
        let current = self.last_address();
        if !current.is_empty() {
            return Ok(current);
        }
        let ip = discover(self.discovery_timeout).await?;
        let found = ip.to_string();
        info!(address = %found, "using discovered gateway");
        *self.address.lock().unwrap_or_else(PoisonError::into_inner) = found.clone();
        Ok(found)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if self.login.is_empty() {
            request
        } else {
            request.basic_auth(&self.login, Some(&self.password))
        }
    }
}

impl std::fmt::Debug for EdsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdsClient")
            .field("address", &self.last_address())
            .field("login", &self.login)
            .finish_non_exhaustive()
    }
}

fn base_url(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.trim_end_matches('/').to_string()
    } else {
        format!("http://{address}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FIXTURE: &str = include_str!("../../../fixtures/owserver-details.xml");

    fn client(address: &str) -> EdsClient {
        EdsClient::new(EdsConfig {
            address: address.to_string(),
            login: "user".into(),
            password: "secret".into(),
            ..EdsConfig::default()
        })
        .expect("client")
    }

    #[test]
    fn base_url_accepts_hosts_and_urls() {
        assert_eq!(base_url("10.0.0.5"), "http://10.0.0.5");
        assert_eq!(base_url("http://10.0.0.5:8080/"), "http://10.0.0.5:8080");
        assert_eq!(base_url("https://gw"), "https://gw");
    }

    #[tokio::test]
    async fn details_are_fetched_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DETAILS_PATH))
            .and(header("authorization", "Basic dXNlcjpzZWNyZXQ="))
            .respond_with(ResponseTemplate::new(200).set_body_string(FIXTURE))
            .expect(1)
            .mount(&server)
            .await;

        let root = client(&server.uri()).read_document().await.expect("read");
        assert_eq!(root.tag(), "Devices-Detail-Response");
        assert!(root.find_child("owd_EDS0065").is_some());
    }

    #[tokio::test]
    async fn error_status_and_bad_xml_fail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DETAILS_PATH))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let err = client(&server.uri()).read_document().await.expect_err("401");
        assert!(matches!(err, EdsError::Http(_)));

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DETAILS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<Devices><x>"))
            .mount(&server)
            .await;
        let err = client(&server.uri()).read_document().await.expect_err("xml");
        assert!(matches!(err, EdsError::Xml(_)));
    }

    #[tokio::test]
    async fn write_encodes_query_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(WRITE_PATH))
            .and(query_param("rom", "A10000003C6E177E"))
            .and(query_param("variable", "RelayState"))
            .and(query_param("value", "1"))
            .and(header("authorization", "Basic dXNlcjpzZWNyZXQ="))
            .respond_with(ResponseTemplate::new(200).set_body_string("whatever"))
            .expect(1)
            .mount(&server)
            .await;

        client(&server.uri())
            .write_data("A10000003C6E177E", "RelayState", "1")
            .await
            .expect("write");
    }

    #[tokio::test]
    async fn write_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(WRITE_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let err = client(&server.uri())
            .write_data("01", "RelayState", "1")
            .await
            .expect_err("500");
        assert!(matches!(err, EdsError::Write(_)));

        let err = client("").write_data("01", "RelayState", "1").await.expect_err("no address");
        assert!(matches!(err, EdsError::NotInitialized(_)));
    }

    #[tokio::test]
    async fn file_address_reads_local_document() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(FIXTURE.as_bytes()).expect("write fixture");
        let address = format!("{FILE_PREFIX}{}", file.path().display());

        let client = client(&address);
        let root = client.read_document().await.expect("read");
        assert_eq!(root.children().len(), 20);

        let err = client.write_data("01", "RelayState", "1").await.expect_err("file");
        assert!(matches!(err, EdsError::Unsupported(_)));
    }

    #[tokio::test]
    async fn missing_file_keeps_address() {
        let dir = tempfile::tempdir().expect("tempdir");
        let address = format!("{FILE_PREFIX}{}", dir.path().join("absent.xml").display());
        let client = client(&address);
        let err = client.read_document().await.expect_err("missing");
        assert!(matches!(err, EdsError::Io(_)));
        assert_eq!(client.last_address(), address);
    }
}
