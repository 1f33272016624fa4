//! Seam towards the hub transport.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tracing::trace;

use crate::description::ThingDescription;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publisher not connected")]
    NotConnected,
    #[error("publication rejected: {0}")]
    Rejected(String),
}

/// Destination of descriptions and value batches.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish_description(&self, description: &ThingDescription) -> Result<(), PublishError>;

    async fn publish_values(
        &self,
        thing_id: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<(), PublishError>;

    /// Release the transport. Called once when the binding stops.
    async fn close(&self) {}
}

#[derive(Debug, Default)]
struct Recorded {
    descriptions: Vec<ThingDescription>,
    values: Vec<(String, BTreeMap<String, String>)>,
}

/// Publisher that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    recorded: Mutex<Recorded>,
    disconnected: AtomicBool,
    closed: AtomicBool,
}

impl MemoryPublisher {
    /// Simulate losing or regaining the hub connection.
    pub fn set_connected(&self, connected: bool) {
        self.disconnected.store(!connected, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn descriptions(&self) -> Vec<ThingDescription> {
        self.recorded().descriptions.clone()
    }

    /// All value batches in publication order.
    pub fn value_batches(&self) -> Vec<(String, BTreeMap<String, String>)> {
        self.recorded().values.clone()
    }

    /// Drain recorded value batches.
    pub fn take_values(&self) -> Vec<(String, BTreeMap<String, String>)> {
        std::mem::take(&mut self.recorded().values)
    }

    fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Result<(), PublishError> {
        if self.disconnected.load(Ordering::SeqCst) || self.is_closed() {
            Err(PublishError::NotConnected)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish_description(
        &self,
        description: &ThingDescription,
    ) -> Result<(), PublishError> {
        self.check()?;
        trace!(id = %description.id, "recorded description");
        self.recorded().descriptions.push(description.clone());
        Ok(())
    }

    async fn publish_values(
        &self,
        thing_id: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<(), PublishError> {
        self.check()?;
        trace!(thing_id, count = values.len(), "recorded values");
        self.recorded()
            .values
            .push((thing_id.to_string(), values.clone()));
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
