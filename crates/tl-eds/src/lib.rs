//! EDS OWServer transport: gateway discovery (UDP) and document access (HTTP or file).

use std::time::Duration;

use thiserror::Error;

pub mod client;
pub mod discovery;

pub use client::{EdsClient, EdsConfig, DETAILS_PATH, FILE_PREFIX, WRITE_PATH};
pub use discovery::{discover, discover_with, Discovery, DISCOVERY_PORT};

/// Errors raised while locating, reading or writing the gateway.
#[derive(Debug, Error)]
pub enum EdsError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Xml(#[from] eds_xml::XmlError),
    #[error("no gateway answered discovery within {0:?}")]
    DiscoveryTimeout(Duration),
    #[error("not initialized: {0}")]
    NotInitialized(String),
    #[error("write failed: {0}")]
    Write(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}
