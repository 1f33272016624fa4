//! In-process gateway serving a fixture document.
//!
//! Writes are applied with a lag counted in reads, the way the real gateway
//! only reflects a changed variable after a while.

use std::path::Path;

use async_trait::async_trait;
use eds_vocab::vendor;
use eds_xml::{parse_document, XmlNode};
use tl_eds::{EdsError, FILE_PREFIX};
use tokio::sync::Mutex;
use tracing::debug;

use crate::gateway::Gateway;

/// Reads that still observe the old value after a write.
pub const DEFAULT_WRITE_LAG: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedWrite {
    pub rom: String,
    pub variable: String,
    pub value: String,
}

#[derive(Debug)]
struct Pending {
    write: SimulatedWrite,
    reads_left: u32,
}

#[derive(Debug)]
struct State {
    document: XmlNode,
    pending: Vec<Pending>,
    writes: Vec<SimulatedWrite>,
    reads: usize,
}

#[derive(Debug)]
pub struct SimulatedGateway {
    address: String,
    write_lag: u32,
    state: Mutex<State>,
}

impl SimulatedGateway {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EdsError> {
        Ok(Self::new("sim://fixture".to_string(), parse_document(bytes)?))
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, EdsError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let document = parse_document(&bytes)?;
        Ok(Self::new(format!("{FILE_PREFIX}{}", path.display()), document))
    }

    fn new(address: String, document: XmlNode) -> Self {
        Self {
            address,
            write_lag: DEFAULT_WRITE_LAG,
            state: Mutex::new(State {
                document,
                pending: Vec::new(),
                writes: Vec::new(),
                reads: 0,
            }),
        }
    }

    pub fn with_write_lag(mut self, reads: u32) -> Self {
        self.write_lag = reads;
        self
    }

    /// Accepted writes in arrival order.
    pub async fn writes(&self) -> Vec<SimulatedWrite> {
        self.state.lock().await.writes.clone()
    }

    pub async fn reads(&self) -> usize {
        self.state.lock().await.reads
    }
}

#[async_trait]
impl Gateway for SimulatedGateway {
    async fn read_document(&self) -> Result<XmlNode, EdsError> {
        let mut state = self.state.lock().await;
        state.reads += 1;
        let State {
            document, pending, ..
        } = &mut *state;
        pending.retain_mut(|p| {
            if p.reads_left > 0 {
                p.reads_left -= 1;
                return true;
            }
            if let Some(leaf) = device_mut(document, &p.write.rom)
                .and_then(|device| device.find_child_mut(&p.write.variable))
            {
                leaf.set_text(p.write.value.clone());
                debug!(rom = %p.write.rom, variable = %p.write.variable, "simulated write applied");
            }
            false
        });
        Ok(state.document.clone())
    }

    async fn write_data(&self, rom: &str, variable: &str, value: &str) -> Result<(), EdsError> {
        let mut state = self.state.lock().await;
        let known = device_mut(&mut state.document, rom)
            .and_then(|device| device.find_child_mut(variable))
            .is_some_and(|leaf| leaf.is_leaf());
        if !known {
            return Err(EdsError::Write(format!("no variable {variable} on device {rom}")));
        }
        let write = SimulatedWrite {
            rom: rom.to_string(),
            variable: variable.to_string(),
            value: value.to_string(),
        };
        state.writes.push(write.clone());
        state.pending.push(Pending {
            write,
            reads_left: self.write_lag,
        });
        Ok(())
    }

    fn address(&self) -> String {
        self.address.clone()
    }
}

/// Device element whose `ROMId` leaf equals `rom`, searched depth first.
fn device_mut<'a>(node: &'a mut XmlNode, rom: &str) -> Option<&'a mut XmlNode> {
    let matches = node
        .find_child(vendor::ROM_ID)
        .is_some_and(|id| id.is_leaf() && id.text() == rom);
    if matches {
        return Some(node);
    }
    node.children_mut()
        .iter_mut()
        .find_map(|child| device_mut(child, rom))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = include_str!("../../../fixtures/owserver-details.xml");
    const MULTI: &str = "A10000003C6E177E";

    fn relay(doc: &XmlNode) -> String {
        doc.find_child("owd_EDS0065")
            .and_then(|d| d.find_child("RelayState"))
            .map(|l| l.text().to_string())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn writes_show_up_after_the_lag() {
        let sim = SimulatedGateway::from_bytes(FIXTURE.as_bytes()).expect("fixture");
        assert_eq!(relay(&sim.read_document().await.expect("read")), "0");

        sim.write_data(MULTI, "RelayState", "1").await.expect("write");
        assert_eq!(relay(&sim.read_document().await.expect("read")), "0");
        assert_eq!(relay(&sim.read_document().await.expect("read")), "1");
        assert_eq!(sim.writes().await.len(), 1);
        assert_eq!(sim.reads().await, 3);
    }

    #[tokio::test]
    async fn zero_lag_applies_on_next_read() {
        let sim = SimulatedGateway::from_bytes(FIXTURE.as_bytes())
            .expect("fixture")
            .with_write_lag(0);
        sim.write_data(MULTI, "RelayState", "1").await.expect("write");
        assert_eq!(relay(&sim.read_document().await.expect("read")), "1");
    }

    #[tokio::test]
    async fn unknown_targets_are_rejected() {
        let sim = SimulatedGateway::from_bytes(FIXTURE.as_bytes()).expect("fixture");
        assert!(matches!(
            sim.write_data("FFFF", "RelayState", "1").await,
            Err(EdsError::Write(_))
        ));
        assert!(matches!(
            sim.write_data(MULTI, "NoSuchVariable", "1").await,
            Err(EdsError::Write(_))
        ));
        assert!(sim.writes().await.is_empty());
    }

    #[tokio::test]
    async fn file_fixture_keeps_its_address() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures/owserver-details.xml");
        let sim = SimulatedGateway::from_file(path).await.expect("file");
        assert!(sim.address().starts_with(FILE_PREFIX));
        assert!(SimulatedGateway::from_file("/nonexistent.xml").await.is_err());
    }
}
