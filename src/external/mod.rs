//! Collaborators the bracket engine talks to but does not own.

mod catalog;
mod transport;

pub use catalog::{evolution_targets, Catalog, StaticCatalog};
pub use transport::{MemoryTransport, Sent, Transport, TransportError};
