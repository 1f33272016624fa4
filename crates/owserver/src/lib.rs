#![cfg_attr(docsrs, feature(doc_cfg))]
//! EDS OWServer binding: polls the gateway, keeps a device registry and
//! publishes thing descriptions and property values.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use owserver::{MemoryPublisher, OwServerBinding, OwServerConfig, OwServerError};
//!
//! # async fn run() -> Result<(), OwServerError> {
//! let config = OwServerConfig {
//!     gateway_address: "192.168.1.20".into(),
//!     login_name: "admin".into(),
//!     password: "secret".into(),
//!     ..OwServerConfig::default()
//! };
//! let publisher = Arc::new(MemoryPublisher::default());
//! let binding = OwServerBinding::new(config, publisher.clone());
//! binding.start().await?;
//! binding.write_property("A10000003C6E177E", "relay", "true").await?;
//! binding.stop().await;
//! println!("published {} descriptions", publisher.descriptions().len());
//! # Ok(())
//! # }
//! ```

pub use eds_core as nodes;
pub use eds_vocab as vocab;
pub use eds_xml as xml;
pub use tl_eds as eds;

pub mod config;
pub mod description;
pub mod gateway;
pub mod publisher;
pub mod registry;
pub mod scheduler;
pub mod service;
pub mod sim;

use thiserror::Error;

pub use config::OwServerConfig;
pub use description::ThingDescription;
pub use gateway::Gateway;
pub use publisher::{MemoryPublisher, PublishError, Publisher};
pub use registry::{DeviceRegistry, RegistryEntry, Upsert};
pub use scheduler::{Countdown, PendingVerification, TickAction};
pub use service::OwServerBinding;
pub use sim::SimulatedGateway;

/// Error type produced by the binding.
#[derive(Debug, Error)]
pub enum OwServerError {
    /// Fetch, discovery or write against the gateway failed.
    #[error(transparent)]
    Gateway(#[from] tl_eds::EdsError),
    /// The publisher refused a description or value batch.
    #[error(transparent)]
    Publish(#[from] PublishError),
    /// No gateway client exists yet.
    #[error("not initialized: {0}")]
    NotInitialized(String),
    /// The device is not in the registry.
    #[error("unknown device: {0}")]
    UnknownDevice(String),
    /// The property is read-only or not offered by the device.
    #[error("{node}: property {property} is not writable")]
    NotWritable { node: String, property: String },
    /// A stopped binding has closed its publisher and cannot start again.
    #[error("binding was stopped")]
    Stopped,
    /// Configuration could not be loaded.
    #[error("config: {0}")]
    Config(String),
}
