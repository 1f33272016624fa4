//! The binding service: background poll loop, manual polls and property writes.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use std::time::Duration;

use eds_core::{DeviceNode, NodeExtractor};
use eds_vocab::{names, DataType, Vocabulary};
use tl_eds::EdsClient;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::OwServerConfig;
use crate::description::{thing_id, ThingDescription};
use crate::gateway::Gateway;
use crate::publisher::Publisher;
use crate::registry::{DeviceRegistry, Upsert};
use crate::scheduler::{Countdown, TickAction, VerificationQueue, TICK};
use crate::OwServerError;

/// Value batches keyed by thing id.
pub type ValueMap = BTreeMap<String, BTreeMap<String, String>>;

/// Bridges one OWServer gateway to a [`Publisher`].
pub struct OwServerBinding {
    inner: Arc<Inner>,
    /// Handle of the poll loop; `Some` while running.
    run: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    config: OwServerConfig,
    publisher: Arc<dyn Publisher>,
    extractor: NodeExtractor,
    gateway: RwLock<Option<Arc<dyn Gateway>>>,
    /// Held for the duration of a cycle.
    registry: Mutex<DeviceRegistry>,
    verifications: StdMutex<VerificationQueue>,
    running: AtomicBool,
    stopped: AtomicBool,
}

impl OwServerBinding {
    pub fn new(config: OwServerConfig, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: config.normalized(),
                publisher,
                extractor: NodeExtractor::new(Vocabulary::owserver()),
                gateway: RwLock::new(None),
                registry: Mutex::new(DeviceRegistry::new()),
                verifications: StdMutex::new(VerificationQueue::default()),
                running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }),
            run: Mutex::new(None),
        }
    }

    /// Use `gateway` instead of building a client from the configuration.
    pub fn with_gateway(self, gateway: Arc<dyn Gateway>) -> Self {
        *self
            .inner
            .gateway
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(gateway);
        self
    }

    pub fn config(&self) -> &OwServerConfig {
        &self.inner.config
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Start the background poll loop. Starting a running binding is a no-op.
    ///
    /// A binding cannot be restarted after [`stop`](Self::stop): its
    /// publisher is closed by then.
    pub async fn start(&self) -> Result<(), OwServerError> {
        let mut run = self.run.lock().await;
        if run.is_some() {
            warn!("binding already running");
            return Ok(());
        }
        let inner = &self.inner;
        if inner.stopped.load(Ordering::Acquire) {
            return Err(OwServerError::Stopped);
        }
        if inner.gateway().is_err() {
            let client = EdsClient::new(inner.config.eds_config())?;
            *inner
                .gateway
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(client));
        }
        if inner.config.publish_td {
            let td = ThingDescription::for_service(&inner.config.zone, &inner.config.client_id);
            inner.publisher.publish_description(&td).await?;
        }
        inner.running.store(true, Ordering::Release);
        *run = Some(tokio::spawn(poll_loop(Arc::clone(inner))));
        info!(
            client_id = %inner.config.client_id,
            address = %inner.config.gateway_address,
            "binding started"
        );
        Ok(())
    }

    /// Stop the loop, wait the grace period, close the publisher and join the loop.
    pub async fn stop(&self) {
        let mut run = self.run.lock().await;
        self.inner.running.store(false, Ordering::Release);
        let Some(task) = run.take() else {
            return;
        };
        self.inner.stopped.store(true, Ordering::Release);
        time::sleep(self.inner.config.stop_grace()).await;
        self.inner.publisher.close().await;
        if let Err(err) = task.await {
            warn!(?err, "poll loop ended abnormally");
        }
        info!("binding stopped");
    }

    /// Fetch the document and publish new or changed descriptions.
    pub async fn refresh_descriptions(&self) -> Result<usize, OwServerError> {
        self.inner.refresh_descriptions().await
    }

    /// Publish all values, or only those changed since the last publication.
    pub async fn update_values(&self, only_changed: bool) -> Result<usize, OwServerError> {
        self.inner.update_values(only_changed).await
    }

    /// Current values of every device without publishing them.
    pub async fn poll_values(&self) -> Result<ValueMap, OwServerError> {
        self.inner.poll_values().await
    }

    /// One-shot refresh of descriptions followed by a full value push.
    pub async fn poll(&self) -> Result<(), OwServerError> {
        self.inner.refresh_descriptions().await?;
        self.inner.update_values(false).await?;
        Ok(())
    }

    /// Write a property of a registered device and schedule verification polls.
    ///
    /// Properties the device reports as read-only are refused without
    /// contacting the gateway.
    pub async fn write_property(
        &self,
        node_id: &str,
        property: &str,
        value: &str,
    ) -> Result<(), OwServerError> {
        self.inner.write_property(node_id, property, value).await
    }

    /// Run the verification polls due at `now`. Returns how many ran.
    pub async fn run_due_verifications(&self, now: Instant) -> usize {
        self.inner.run_due_verifications(now).await
    }

    pub fn pending_verifications(&self) -> usize {
        self.inner.verifications().len()
    }

    pub async fn registry(&self) -> MutexGuard<'_, DeviceRegistry> {
        self.inner.registry.lock().await
    }
}

impl Inner {
    fn gateway(&self) -> Result<Arc<dyn Gateway>, OwServerError> {
        self.gateway
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| OwServerError::NotInitialized("gateway client not created".into()))
    }

    fn verifications(&self) -> std::sync::MutexGuard<'_, VerificationQueue> {
        self.verifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn thing_id(&self, node: &DeviceNode) -> String {
        thing_id(
            &self.config.zone,
            &self.config.client_id,
            &node.node_id,
            node.device_type,
        )
    }

    async fn fetch_nodes(&self, with_latency: bool) -> Result<Vec<DeviceNode>, OwServerError> {
        let gateway = self.gateway()?;
        let started = Instant::now();
        let root = gateway.read_document().await?;
        let latency = if with_latency {
            started.elapsed()
        } else {
            Duration::ZERO
        };
        Ok(self.extractor.extract(&root, latency))
    }

    async fn refresh_descriptions(&self) -> Result<usize, OwServerError> {
        let nodes = self.fetch_nodes(false).await?;
        let mut registry = self.registry.lock().await;
        let mut first_err = None;
        let mut published = 0;
        for node in &nodes {
            let td = ThingDescription::from_node(node, &self.config.zone, &self.config.client_id);
            if registry.upsert(node, td.clone()) == Upsert::Unchanged {
                continue;
            }
            match self.publisher.publish_description(&td).await {
                Ok(()) => {
                    registry.set_published(&node.node_id, true);
                    published += 1;
                }
                Err(err) => {
                    warn!(id = %td.id, %err, "description not published");
                    first_err = first_err.or(Some(err));
                }
            }
        }
        let seen: HashSet<String> = nodes.iter().map(|n| n.node_id.clone()).collect();
        registry.mark_missing(&seen);
        debug!(nodes = nodes.len(), published, devices = registry.len(), "descriptions refreshed");
        match first_err {
            Some(err) => Err(err.into()),
            None => Ok(published),
        }
    }

    async fn update_values(&self, only_changed: bool) -> Result<usize, OwServerError> {
        let nodes = self.fetch_nodes(true).await?;
        let mut registry = self.registry.lock().await;
        let mut first_err = None;
        let mut batches = 0;
        for node in &nodes {
            let Some(entry) = registry.get(&node.node_id) else {
                warn!(node = %node.node_id, "values for unregistered device skipped");
                continue;
            };
            let thing_id = entry.thing_id.clone();
            let values = node.values();
            let batch = if only_changed {
                registry.diff_values(&node.node_id, &values)
            } else {
                values
            };
            if only_changed && batch.is_empty() {
                continue;
            }
            match self.publisher.publish_values(&thing_id, &batch).await {
                Ok(()) => {
                    registry.record_values(&node.node_id, &batch);
                    batches += 1;
                }
                Err(err) => {
                    warn!(%thing_id, %err, "values not published");
                    first_err = first_err.or(Some(err));
                }
            }
        }
        if !only_changed && self.config.publish_td {
            let (id, values) = self.service_values();
            if let Err(err) = self.publisher.publish_values(&id, &values).await {
                first_err = first_err.or(Some(err));
            }
        }
        debug!(only_changed, batches, "values updated");
        match first_err {
            Some(err) => Err(err.into()),
            None => Ok(batches),
        }
    }

    async fn poll_values(&self) -> Result<ValueMap, OwServerError> {
        let nodes = self.fetch_nodes(true).await?;
        let mut out: ValueMap = nodes
            .iter()
            .map(|node| (self.thing_id(node), node.values()))
            .collect();
        if self.config.publish_td {
            let (id, values) = self.service_values();
            out.insert(id, values);
        }
        Ok(out)
    }

    fn service_values(&self) -> (String, BTreeMap<String, String>) {
        let address = self
            .gateway()
            .map(|gateway| gateway.address())
            .unwrap_or_default();
        let td = ThingDescription::for_service(&self.config.zone, &self.config.client_id);
        (
            td.id,
            BTreeMap::from([(names::GATEWAY_ADDRESS.to_string(), address)]),
        )
    }

    async fn write_property(
        &self,
        node_id: &str,
        property: &str,
        value: &str,
    ) -> Result<(), OwServerError> {
        let gateway = self.gateway()?;
        let vocab = self.extractor.vocabulary();
        let data_type = {
            let registry = self.registry.lock().await;
            let entry = registry
                .get(node_id)
                .ok_or_else(|| OwServerError::UnknownDevice(node_id.to_string()))?;
            match entry.node.attribute(property) {
                Some(attr) if !attr.writable => {
                    return Err(OwServerError::NotWritable {
                        node: node_id.to_string(),
                        property: property.to_string(),
                    });
                }
                Some(attr) => Some(attr.data_type),
                None => vocab.sensor_by_canonical(property).map(|info| info.data_type),
            }
        };
        let variable = vocab.vendor_name(property);
        let value = match data_type {
            Some(DataType::Boolean) => bool_value(value),
            _ => value.to_string(),
        };

        if let Err(err) = gateway.write_data(node_id, variable, &value).await {
            error!(node_id, variable, %err, "write failed");
            return Err(err.into());
        }
        self.verifications().schedule(
            node_id,
            property,
            Instant::now(),
            &self.config.verify_delays(),
        );
        info!(node_id, property, value = %value, "write accepted, verification scheduled");
        Ok(())
    }

    async fn run_due_verifications(&self, now: Instant) -> usize {
        let due = self.verifications().take_due(now);
        for pending in &due {
            debug!(node = %pending.node_id, property = %pending.property, "verifying write");
            if let Err(err) = self.update_values(true).await {
                warn!(%err, "verification poll failed");
            }
        }
        due.len()
    }
}

/// Gateway variables take booleans as `1` or `0`.
fn bool_value(value: &str) -> String {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "1" => "1".to_string(),
        "false" | "off" | "0" => "0".to_string(),
        other => other.to_string(),
    }
}

async fn poll_loop(inner: Arc<Inner>) {
    let mut countdown = Countdown::new(inner.config.td_interval, inner.config.value_interval);
    let mut ticker = time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if !inner.running.load(Ordering::Acquire) {
            break;
        }
        match countdown.tick() {
            TickAction::Full => {
                if let Err(err) = inner.refresh_descriptions().await {
                    error!(%err, "description refresh failed, retrying next tick");
                    countdown.retry_full();
                }
                if let Err(err) = inner.update_values(false).await {
                    error!(%err, "value push failed");
                }
            }
            TickAction::Values => {
                if let Err(err) = inner.update_values(true).await {
                    warn!(%err, "value poll failed");
                }
            }
            TickAction::Idle => {}
        }
        inner.run_due_verifications(Instant::now()).await;
    }
    debug!("poll loop finished");
}
