pub mod events;
pub mod monitor;
pub mod slice;

pub use events::{ChaEvent, EventCatalog, EventSelect};
pub use monitor::{ChaMonitor, Prefetcher};
pub use slice::{attribute_slice, AddressMap, DiscoverySettings, OffsetLog, SliceHit, SliceProbe};
