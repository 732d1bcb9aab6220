//! Measurement record data model and line codec.
//!
//! A record is the durable unit of the agent: one timestamped set of
//! per-channel temperature readings plus the signal strength at the time of
//! measurement. Records are serialized as single comma-delimited lines so the
//! backlog file stays human-inspectable and resynchronizable: a truncated or
//! garbled line is detectable and skippable on its own, without
//! desynchronizing the rest of the file.

use crate::sampler::{SensorReading, MAX_SENSORS};

/// A single durable measurement.
///
/// Owned by the durable log from the moment it is appended until every one of
/// its channels has been confirmed published.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    /// Monotonic timestamp in milliseconds since agent start
    pub timestamp_ms: u64,

    /// Per-channel Celsius values; channel index is the position
    pub values: Vec<f32>,

    /// Signal strength at measurement time (0 when the link was down)
    pub signal_strength: i32,
}

/// Errors produced when decoding a stored line back into a record.
#[derive(Debug)]
pub enum RecordError {
    /// The line has too few fields to be a record
    TooShort,

    /// A field failed to parse as its expected type
    Field { index: usize, value: String },

    /// Channel count is zero or exceeds the fixed sensor bound
    ChannelCount(usize),

    /// Declared channel count does not match the number of value fields
    FieldCount { declared: usize, actual: usize },
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::TooShort => write!(f, "line too short to be a record"),
            RecordError::Field { index, value } => {
                write!(f, "field {} is not a valid number: '{}'", index, value)
            }
            RecordError::ChannelCount(n) => {
                write!(f, "channel count {} outside 1..={}", n, MAX_SENSORS)
            }
            RecordError::FieldCount { declared, actual } => {
                write!(
                    f,
                    "declared {} channels but line carries {} values",
                    declared, actual
                )
            }
        }
    }
}

impl std::error::Error for RecordError {}

impl MeasurementRecord {
    /// Create a record from a validated reading.
    pub fn new(timestamp_ms: u64, reading: &SensorReading, signal_strength: i32) -> Self {
        Self {
            timestamp_ms,
            values: reading.values.clone(),
            signal_strength,
        }
    }

    /// Number of channels carried by this record.
    pub fn channel_count(&self) -> usize {
        self.values.len()
    }

    /// Serialize as one log line (without trailing newline):
    /// `timestamp,channelCount,v1,...,vN,signalStrength`
    pub fn to_line(&self) -> String {
        let mut line = format!("{},{}", self.timestamp_ms, self.values.len());
        for v in &self.values {
            line.push_str(&format!(",{:.2}", v));
        }
        line.push_str(&format!(",{}", self.signal_strength));
        line
    }

    /// Decode one stored line.
    ///
    /// A line that fails here is corrupt: the caller drops it and moves on,
    /// it is never retried and never aborts the surrounding drain.
    pub fn parse_line(line: &str) -> Result<Self, RecordError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let fields: Vec<&str> = line.split(',').collect();

        // timestamp + count + at least one value + signal
        if fields.len() < 4 {
            return Err(RecordError::TooShort);
        }

        let timestamp_ms: u64 = fields[0].parse().map_err(|_| RecordError::Field {
            index: 0,
            value: fields[0].to_string(),
        })?;

        let channel_count: usize = fields[1].parse().map_err(|_| RecordError::Field {
            index: 1,
            value: fields[1].to_string(),
        })?;

        if channel_count == 0 || channel_count > MAX_SENSORS {
            return Err(RecordError::ChannelCount(channel_count));
        }

        let actual = fields.len() - 3;
        if actual != channel_count {
            return Err(RecordError::FieldCount {
                declared: channel_count,
                actual,
            });
        }

        let mut values = Vec::with_capacity(channel_count);
        for (i, field) in fields[2..2 + channel_count].iter().enumerate() {
            let v: f32 = field.parse().map_err(|_| RecordError::Field {
                index: 2 + i,
                value: field.to_string(),
            })?;
            values.push(v);
        }

        let signal_field = fields[2 + channel_count];
        let signal_strength: i32 = signal_field.parse().map_err(|_| RecordError::Field {
            index: 2 + channel_count,
            value: signal_field.to_string(),
        })?;

        Ok(Self {
            timestamp_ms,
            values,
            signal_strength,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(values: &[f32]) -> SensorReading {
        SensorReading {
            values: values.to_vec(),
        }
    }

    #[test]
    fn test_line_format() {
        let record = MeasurementRecord::new(120_000, &reading(&[21.50, 21.75, 22.00]), -62);
        assert_eq!(record.to_line(), "120000,3,21.50,21.75,22.00,-62");
    }

    #[test]
    fn test_line_round_trip() {
        let record = MeasurementRecord::new(42, &reading(&[-5.25, 103.0]), -71);
        let parsed = MeasurementRecord::parse_line(&record.to_line()).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_parse_strips_newline() {
        let parsed = MeasurementRecord::parse_line("1000,1,20.00,-50\n").unwrap();
        assert_eq!(parsed.timestamp_ms, 1000);
        assert_eq!(parsed.values, vec![20.00]);
        assert_eq!(parsed.signal_strength, -50);
    }

    #[test]
    fn test_parse_rejects_short_line() {
        assert!(matches!(
            MeasurementRecord::parse_line("1000,1"),
            Err(RecordError::TooShort)
        ));
        assert!(matches!(
            MeasurementRecord::parse_line(""),
            Err(RecordError::TooShort)
        ));
    }

    #[test]
    fn test_parse_rejects_bad_numbers() {
        assert!(matches!(
            MeasurementRecord::parse_line("abc,1,20.00,-50"),
            Err(RecordError::Field { index: 0, .. })
        ));
        assert!(matches!(
            MeasurementRecord::parse_line("1000,1,warm,-50"),
            Err(RecordError::Field { index: 2, .. })
        ));
        assert!(matches!(
            MeasurementRecord::parse_line("1000,1,20.00,strong"),
            Err(RecordError::Field { index: 3, .. })
        ));
    }

    #[test]
    fn test_parse_rejects_channel_count_out_of_bounds() {
        assert!(matches!(
            MeasurementRecord::parse_line("1000,0,20.00,-50"),
            Err(RecordError::ChannelCount(0))
        ));
        let too_many = MAX_SENSORS + 1;
        let values: Vec<String> = (0..too_many).map(|_| "20.00".to_string()).collect();
        let line = format!("1000,{},{},-50", too_many, values.join(","));
        assert!(matches!(
            MeasurementRecord::parse_line(&line),
            Err(RecordError::ChannelCount(n)) if n == too_many
        ));
    }

    #[test]
    fn test_parse_rejects_count_mismatch() {
        // Declares three channels but carries two values.
        assert!(matches!(
            MeasurementRecord::parse_line("1000,3,20.00,21.00,-50"),
            Err(RecordError::FieldCount {
                declared: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_error_display() {
        let err = RecordError::ChannelCount(9);
        assert!(format!("{}", err).contains('9'));

        let err = RecordError::Field {
            index: 2,
            value: "warm".to_string(),
        };
        assert!(format!("{}", err).contains("warm"));
    }
}
