//! Backlog replay engine.
//!
//! Drains the durable log through the publish capability: each record's
//! channels are published in order, and on the first failure the failed
//! record plus every unread line after it is rewritten verbatim into the
//! staging file, which then atomically replaces the log. Re-queuing the whole
//! unread suffix keeps FIFO delivery order intact and avoids hammering a
//! struggling endpoint; redelivering a record next cycle is harmless because
//! records carry their own timestamps.

use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tracing::{debug, info, warn};

use crate::record::MeasurementRecord;
use crate::store::{DurableLog, StoreError};

/// Pause between records during a drain, so the session keepalive is serviced
/// and a long drain is not mistaken for a dead connection.
const RECORD_PACING: Duration = Duration::from_millis(50);

/// Publish capability consumed by the replay engine.
///
/// One call publishes one channel's value; `false` is a transient failure
/// that stops the current drain and leaves the record queued.
#[allow(async_fn_in_trait)]
pub trait ChannelPublisher {
    async fn publish_channel(&mut self, channel: usize, value: f32) -> bool;
    async fn keepalive(&mut self);
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Records fully published and removed from the log
    pub records_delivered: u64,

    /// Lines written back for a later cycle: the failed record's line plus
    /// the unread suffix, which may include lines not yet parsed as records
    pub lines_requeued: u64,

    /// Malformed lines dropped permanently
    pub lines_dropped: u64,
}

impl ReplayReport {
    /// True when a publish failure cut the pass short.
    pub fn stopped_early(&self) -> bool {
        self.lines_requeued > 0
    }
}

/// Drain the log once through `publisher`.
///
/// Must only be called once connectivity has been acquired. A missing or
/// empty log is a complete no-op: no staging file is created and no commit
/// happens. Otherwise the pass always ends in an atomic commit, so the log
/// afterwards holds exactly the unsent remainder (possibly zero-length).
pub async fn drain<P: ChannelPublisher>(
    log: &DurableLog,
    publisher: &mut P,
) -> Result<ReplayReport, StoreError> {
    let mut report = ReplayReport::default();

    if !log.has_pending().await {
        return Ok(report);
    }
    let Some(mut reader) = log.open_reader().await? else {
        return Ok(report);
    };

    // No staging file, no drain: records may only leave the log through a
    // committed staging pass.
    let mut staging = log.create_staging().await?;

    let mut stopped = false;
    // Lines are read as raw bytes: corruption can garble the encoding
    // itself, and an undecodable line must stay a droppable (or verbatim
    // requeueable) line rather than an unreadable file.
    let mut buf: Vec<u8> = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(source) => {
                // An unreadable remainder cannot be re-staged; abandon the
                // pass so the primary keeps the full backlog. Already
                // delivered records will be re-sent next cycle, which
                // at-least-once tolerates.
                warn!(error = %source, "log read failed mid-drain, abandoning pass");
                log.discard_staging().await;
                return Err(StoreError::Read {
                    path: log.path().to_path_buf(),
                    source,
                });
            }
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }

        if stopped {
            // Unread suffix after a failed record: preserved verbatim.
            log.stage_line(&mut staging, &buf).await?;
            report.lines_requeued += 1;
            continue;
        }

        let record = match std::str::from_utf8(&buf) {
            Ok(line) => match MeasurementRecord::parse_line(line) {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, line = %line, "dropping corrupt log line");
                    report.lines_dropped += 1;
                    continue;
                }
            },
            Err(e) => {
                warn!(error = %e, "dropping undecodable log line");
                report.lines_dropped += 1;
                continue;
            }
        };

        if publish_record(publisher, &record).await {
            report.records_delivered += 1;
            debug!(
                timestamp_ms = record.timestamp_ms,
                channels = record.channel_count(),
                "record delivered"
            );
            // Keep the session alive between records; a multi-record drain
            // must not starve the keepalive.
            publisher.keepalive().await;
            tokio::time::sleep(RECORD_PACING).await;
        } else {
            log.stage_line(&mut staging, &buf).await?;
            report.lines_requeued += 1;
            stopped = true;
        }
    }

    log.commit_staging(staging).await?;

    info!(
        delivered = report.records_delivered,
        requeued = report.lines_requeued,
        dropped = report.lines_dropped,
        "drain pass complete"
    );
    Ok(report)
}

/// Publish every channel of one record in channel order, stopping at the
/// first failure. All-or-nothing: only a fully published record counts.
async fn publish_record<P: ChannelPublisher>(
    publisher: &mut P,
    record: &MeasurementRecord,
) -> bool {
    for (channel, value) in record.values.iter().enumerate() {
        if !publisher.publish_channel(channel, *value).await {
            warn!(
                timestamp_ms = record.timestamp_ms,
                channel,
                "publish failed, record stays queued"
            );
            return false;
        }
    }
    true
}
