//! Simulated capabilities for development and demos.
//!
//! These stand-ins implement the sensor, link and session traits with
//! rand-driven behavior so the full agent loop (sample, store, acquire,
//! drain) can run without hardware or a broker. The session's configurable
//! failure rate makes the store-and-forward path visible in a demo run.

use rand::Rng;
use tracing::{debug, info};

use crate::connectivity::{LinkStatus, NetworkLink, Session};
use crate::sampler::{ChannelId, SensorBus};

/// Simulated sensor bus with a fixed channel population.
pub struct SimSensorBus {
    channel_count: usize,

    /// Probability that any single read reports a disconnected channel
    dropout_rate: f64,
}

impl SimSensorBus {
    pub fn new(channel_count: usize) -> Self {
        Self {
            channel_count,
            dropout_rate: 0.0,
        }
    }

    /// Make reads fail with the given probability, to exercise the
    /// discard-whole-cycle path.
    pub fn with_dropout(mut self, dropout_rate: f64) -> Self {
        self.dropout_rate = dropout_rate;
        self
    }
}

impl SensorBus for SimSensorBus {
    async fn discover(&mut self) -> Vec<ChannelId> {
        (0..self.channel_count as u64).map(ChannelId).collect()
    }

    async fn request_conversion(&mut self) {}

    async fn read_channel(&mut self, id: ChannelId) -> Option<f32> {
        let mut rng = rand::thread_rng();
        if self.dropout_rate > 0.0 && rng.gen_bool(self.dropout_rate) {
            return None;
        }
        // Each channel idles around its own baseline with a little jitter.
        let base = 20.0 + id.0 as f32 * 1.5;
        Some(base + rng.gen_range(-0.25..0.25))
    }
}

/// Simulated network link that always acquires on connect.
pub struct SimLink {
    up: bool,
}

impl SimLink {
    pub fn new() -> Self {
        Self { up: false }
    }
}

impl Default for SimLink {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkLink for SimLink {
    fn status(&self) -> LinkStatus {
        if self.up {
            LinkStatus::Up
        } else {
            LinkStatus::Down
        }
    }

    fn signal_strength(&self) -> i32 {
        if self.up {
            rand::thread_rng().gen_range(-75..-45)
        } else {
            0
        }
    }

    async fn connect(&mut self, ssid: &str, _credential: &str) {
        info!(ssid, "sim link connected");
        self.up = true;
    }

    async fn disconnect(&mut self) {
        self.up = false;
    }
}

/// Simulated publish session; publishes are logged rather than transmitted.
pub struct SimSession {
    open: bool,

    /// Probability that any single publish fails
    failure_rate: f64,
}

impl SimSession {
    pub fn new(failure_rate: f64) -> Self {
        Self {
            open: false,
            failure_rate,
        }
    }
}

impl Session for SimSession {
    fn is_open(&self) -> bool {
        self.open
    }

    async fn open(&mut self) -> bool {
        self.open = true;
        info!("sim session open");
        true
    }

    async fn close(&mut self) {
        self.open = false;
    }

    async fn keepalive(&mut self) {}

    async fn publish(&mut self, topic: &str, value: f32) -> bool {
        if self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate) {
            debug!(topic, "sim publish failed");
            return false;
        }
        info!(topic, value = format!("{:.2}", value), "sim publish");
        true
    }
}
