//! Gateway access seam shared by the network client and the simulator.

use async_trait::async_trait;
use eds_xml::XmlNode;
use tl_eds::{EdsClient, EdsError};

/// Source of gateway documents and sink of variable writes.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn read_document(&self) -> Result<XmlNode, EdsError>;

    async fn write_data(&self, rom: &str, variable: &str, value: &str) -> Result<(), EdsError>;

    /// Address currently in use; empty before discovery.
    fn address(&self) -> String;
}

#[async_trait]
impl Gateway for EdsClient {
    async fn read_document(&self) -> Result<XmlNode, EdsError> {
        EdsClient::read_document(self).await
    }

    async fn write_data(&self, rom: &str, variable: &str, value: &str) -> Result<(), EdsError> {
        EdsClient::write_data(self, rom, variable, value).await
    }

    fn address(&self) -> String {
        self.last_address()
    }
}
