//! Temp Relay Library
//!
//! Store-and-forward telemetry agent core: sample temperature sensors on a
//! fixed interval, persist every valid reading in an append-only file, and
//! drain the backlog to a remote collector whenever connectivity allows, with
//! at-least-once delivery and strict FIFO ordering.
//!
//! - **config**: Environment-based configuration
//! - **record**: Measurement record data model and line codec
//! - **sampler**: All-or-nothing measurement cycles over the sensor bus capability
//! - **store**: Durable append-only backlog with atomic staging commits
//! - **replay**: Backlog drain with whole-suffix requeue on publish failure
//! - **connectivity**: Bounded-timeout link and session acquisition
//! - **scheduler**: The single cooperative loop tying it all together
//! - **sim**: Simulated capabilities for development and demos
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use temp_relay::config::Config;
//! use temp_relay::connectivity::Connectivity;
//! use temp_relay::sampler::Sampler;
//! use temp_relay::scheduler::Scheduler;
//! use temp_relay::sim::{SimLink, SimSensorBus, SimSession};
//! use temp_relay::store::DurableLog;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let config = Config::default();
//!
//!     let log = DurableLog::new(config.data_file.clone());
//!     log.recover().await.expect("log recovery");
//!
//!     let sampler = Sampler::discover(SimSensorBus::new(2)).await;
//!     let connectivity = Connectivity::new(SimLink::new(), SimSession::new(0.05), &config);
//!
//!     let mut scheduler = Scheduler::new(sampler, log, connectivity, config.sample_interval);
//!     scheduler.run().await;
//! }
//! ```

// Module declarations
pub mod config;
pub mod connectivity;
pub mod record;
pub mod replay;
pub mod sampler;
pub mod scheduler;
pub mod sim;
pub mod store;

// Re-export commonly used types at crate root for convenience
pub use config::{Config, ConfigError};
pub use connectivity::{Connectivity, LinkStatus, NetworkLink, Session};
pub use record::{MeasurementRecord, RecordError};
pub use replay::{drain, ChannelPublisher, ReplayReport};
pub use sampler::{ChannelId, Sampler, SamplerStats, SensorBus, SensorReading, MAX_SENSORS};
pub use scheduler::{CycleStats, Scheduler};
pub use store::{DurableLog, StoreError};
