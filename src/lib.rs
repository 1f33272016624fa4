//! Aggregator for the OWServer bridge workspace.
//!
//! Re-exports the layered crates so the demos under `demos/` can reach every
//! layer through one dependency.

pub use eds_core as nodes;
pub use eds_xml as xml;
pub use owserver;
pub use tl_eds as transport;
