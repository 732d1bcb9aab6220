//! Measurement sampler wrapping the sensor bus capability.
//!
//! The sampler fixes the sensor population once at startup and turns each
//! measurement cycle into an all-or-nothing reading: either every known
//! channel produced a valid value, or the whole cycle is discarded. Partial
//! readings are never stored, because a record's channel count must match the
//! true sensor population for replay framing to hold.

use tracing::{info, warn};

/// Fixed upper bound on the sensor population.
pub const MAX_SENSORS: usize = 8;

/// Identity of one sensor on the bus, assigned at discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u64);

/// Sensor bus capability consumed by the sampler.
///
/// `read_channel` returns `None` for a disconnected channel (the bus
/// implementation maps its own sentinel value to `None`).
#[allow(async_fn_in_trait)]
pub trait SensorBus {
    async fn discover(&mut self) -> Vec<ChannelId>;
    async fn request_conversion(&mut self);
    async fn read_channel(&mut self, id: ChannelId) -> Option<f32>;
}

/// One complete, validated measurement cycle.
///
/// Channel index is the position in `values`; the length always equals the
/// channel population fixed at discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub values: Vec<f32>,
}

impl SensorReading {
    pub fn channel_count(&self) -> usize {
        self.values.len()
    }
}

/// Statistics about sampling cycles.
#[derive(Debug, Clone, Copy, Default)]
pub struct SamplerStats {
    /// Cycles that produced a complete valid reading
    pub cycles_valid: u64,

    /// Cycles discarded because at least one channel was invalid
    pub cycles_discarded: u64,
}

/// Wraps a [`SensorBus`] and enforces the all-or-nothing reading invariant.
pub struct Sampler<B> {
    bus: B,
    channels: Vec<ChannelId>,
    stats: SamplerStats,
}

impl<B: SensorBus> Sampler<B> {
    /// Discover the sensor population and fix it for the process lifetime.
    ///
    /// Hot-plug is out of scope: channels found here are the only channels
    /// this sampler will ever read, truncated to [`MAX_SENSORS`].
    pub async fn discover(mut bus: B) -> Self {
        let mut channels = bus.discover().await;
        if channels.len() > MAX_SENSORS {
            warn!(
                found = channels.len(),
                max = MAX_SENSORS,
                "more sensors than supported, ignoring the excess"
            );
            channels.truncate(MAX_SENSORS);
        }
        info!(channels = channels.len(), "sensor discovery complete");
        Self {
            bus,
            channels,
            stats: SamplerStats::default(),
        }
    }

    /// Number of channels fixed at discovery.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Run one measurement cycle.
    ///
    /// Returns `None` when any channel is disconnected or when no channels
    /// were discovered; a `Some` reading always covers the full population.
    pub async fn sample(&mut self) -> Option<SensorReading> {
        if self.channels.is_empty() {
            return None;
        }

        self.bus.request_conversion().await;

        let mut values = Vec::with_capacity(self.channels.len());
        for (index, id) in self.channels.iter().enumerate() {
            match self.bus.read_channel(*id).await {
                Some(v) => values.push(v),
                None => {
                    warn!(channel = index, "sensor disconnected, discarding cycle");
                    self.stats.cycles_discarded += 1;
                    return None;
                }
            }
        }

        self.stats.cycles_valid += 1;
        Some(SensorReading { values })
    }

    /// Current sampling statistics.
    pub fn stats(&self) -> SamplerStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bus with fixed channels and scripted per-channel values.
    struct ScriptedBus {
        channels: Vec<ChannelId>,
        values: Vec<Option<f32>>,
        conversions: u32,
    }

    impl SensorBus for ScriptedBus {
        async fn discover(&mut self) -> Vec<ChannelId> {
            self.channels.clone()
        }

        async fn request_conversion(&mut self) {
            self.conversions += 1;
        }

        async fn read_channel(&mut self, id: ChannelId) -> Option<f32> {
            let index = self.channels.iter().position(|c| *c == id).unwrap();
            self.values[index]
        }
    }

    #[tokio::test]
    async fn test_valid_cycle_covers_all_channels() {
        let bus = ScriptedBus {
            channels: vec![ChannelId(1), ChannelId(2)],
            values: vec![Some(21.5), Some(22.0)],
            conversions: 0,
        };
        let mut sampler = Sampler::discover(bus).await;
        assert_eq!(sampler.channel_count(), 2);

        let reading = sampler.sample().await.expect("complete reading");
        assert_eq!(reading.values, vec![21.5, 22.0]);
        assert_eq!(sampler.stats().cycles_valid, 1);
        assert_eq!(sampler.bus.conversions, 1);
    }

    #[tokio::test]
    async fn test_disconnected_channel_discards_whole_cycle() {
        let bus = ScriptedBus {
            channels: vec![ChannelId(1), ChannelId(2)],
            values: vec![Some(21.5), None],
            conversions: 0,
        };
        let mut sampler = Sampler::discover(bus).await;

        assert!(sampler.sample().await.is_none());
        assert_eq!(sampler.stats().cycles_valid, 0);
        assert_eq!(sampler.stats().cycles_discarded, 1);
    }

    #[tokio::test]
    async fn test_zero_channels_always_empty() {
        let bus = ScriptedBus {
            channels: vec![],
            values: vec![],
            conversions: 0,
        };
        let mut sampler = Sampler::discover(bus).await;
        assert_eq!(sampler.channel_count(), 0);

        assert!(sampler.sample().await.is_none());
        assert!(sampler.sample().await.is_none());
        // No conversion is even requested without channels.
        assert_eq!(sampler.bus.conversions, 0);
    }

    #[tokio::test]
    async fn test_population_truncated_to_bound() {
        let channels: Vec<ChannelId> = (0..(MAX_SENSORS as u64 + 3)).map(ChannelId).collect();
        let values = vec![Some(20.0); channels.len()];
        let bus = ScriptedBus {
            channels,
            values,
            conversions: 0,
        };
        let sampler = Sampler::discover(bus).await;
        assert_eq!(sampler.channel_count(), MAX_SENSORS);
    }
}
