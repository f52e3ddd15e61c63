//! Measurement orchestration
//!
//! Splits the monitored events into counter-sized batches and drives the
//! freeze/program/run/read cycle for each of them.

pub mod pipeline;

pub use pipeline::{plan_batches, Batch, MeasurementPipeline};
