// Macros (must be first for visibility)
#[macro_use]
pub mod macros;

pub mod benchmark;
pub mod common;
pub mod config;
pub mod counters;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod orchestrator;
pub mod report;
pub mod topology;

pub use benchmark::{Benchmark, BenchmarkContext, BenchmarkRegistry};
pub use config::ProbeConfig;
pub use counters::cha::{AddressMap, ChaMonitor, EventCatalog, OffsetLog, SliceProbe};
pub use error::{ChaSliceError, Result};
pub use metrics::cha::CountsTable;
pub use orchestrator::MeasurementPipeline;
pub use report::ReportWriter;
pub use topology::{CoreRole, SocketCores};
