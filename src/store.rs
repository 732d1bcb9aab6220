//! Durable append-only measurement log.
//!
//! The log file is the agent's sole durability mechanism: a record is in the
//! file from the moment its measurement is validated until every one of its
//! channels has been confirmed published. Drain commits go through a staging
//! file that is atomically renamed over the primary, so a crash mid-drain
//! leaves either the old log or the new log intact, never a half-written
//! hybrid.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tracing::{info, warn};

use crate::record::MeasurementRecord;

/// Errors from durable log operations.
///
/// Callers treat every variant as "this unit of work is lost, carry on":
/// storage trouble degrades the agent, it never terminates it.
#[derive(Debug)]
pub enum StoreError {
    /// Failed to open the backing file
    Open { path: PathBuf, source: std::io::Error },

    /// Failed while reading lines during a drain
    Read { path: PathBuf, source: std::io::Error },

    /// Failed to write or flush
    Write { path: PathBuf, source: std::io::Error },

    /// Failed to commit the staging file over the primary
    Commit { path: PathBuf, source: std::io::Error },

    /// Failed to inspect or promote files during startup recovery
    Recover { path: PathBuf, source: std::io::Error },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Open { path, source } => {
                write!(f, "failed to open {}: {}", path.display(), source)
            }
            StoreError::Read { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            StoreError::Write { path, source } => {
                write!(f, "failed to write {}: {}", path.display(), source)
            }
            StoreError::Commit { path, source } => {
                write!(f, "failed to commit staging into {}: {}", path.display(), source)
            }
            StoreError::Recover { path, source } => {
                write!(f, "failed to recover {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Open { source, .. }
            | StoreError::Read { source, .. }
            | StoreError::Write { source, .. }
            | StoreError::Commit { source, .. }
            | StoreError::Recover { source, .. } => Some(source),
        }
    }
}

/// Append-only log of serialized [`MeasurementRecord`] lines.
///
/// One writer, one reader, both the owning process; no locking is needed
/// because append and drain never interleave within the single cooperative
/// loop.
#[derive(Debug, Clone)]
pub struct DurableLog {
    path: PathBuf,
    staging_path: PathBuf,
}

impl DurableLog {
    /// Create a handle for the log at `path`; the staging file lives next to
    /// it under `<path>.staging`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let staging_path = staging_path_for(&path);
        Self { path, staging_path }
    }

    /// Path of the primary backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True iff the backing file exists and is non-empty. Pure query.
    pub async fn has_pending(&self) -> bool {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len() > 0,
            Err(_) => false,
        }
    }

    /// Append one record as a single delimited line.
    ///
    /// The file is opened, written, flushed and closed within this call; a
    /// failure loses this measurement only, never corrupts earlier lines.
    pub async fn append(&self, record: &MeasurementRecord) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|source| StoreError::Open {
                path: self.path.clone(),
                source,
            })?;

        let mut line = record.to_line();
        line.push('\n');

        file.write_all(line.as_bytes())
            .await
            .map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        file.flush().await.map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })?;

        Ok(())
    }

    /// Startup recovery for the staging file.
    ///
    /// With the atomic-rename commit the staging file can only be left behind
    /// by a crash *before* commit, in which case the primary is still
    /// authoritative and the staging content is a stale subset: discard it.
    /// If the primary is missing but staging exists (older layouts, manual
    /// cleanup), the staging file is the best surviving state: promote it.
    ///
    /// Returns `true` if a staging file was promoted to primary.
    pub async fn recover(&self) -> Result<bool, StoreError> {
        if !exists(&self.staging_path).await {
            return Ok(false);
        }

        if exists(&self.path).await {
            warn!(
                staging = %self.staging_path.display(),
                "discarding uncommitted staging file left by an interrupted drain"
            );
            tokio::fs::remove_file(&self.staging_path)
                .await
                .map_err(|source| StoreError::Recover {
                    path: self.staging_path.clone(),
                    source,
                })?;
            Ok(false)
        } else {
            info!(
                staging = %self.staging_path.display(),
                primary = %self.path.display(),
                "promoting orphaned staging file to primary log"
            );
            tokio::fs::rename(&self.staging_path, &self.path)
                .await
                .map_err(|source| StoreError::Recover {
                    path: self.staging_path.clone(),
                    source,
                })?;
            Ok(true)
        }
    }

    /// Open the primary file for sequential reading.
    ///
    /// Returns `None` when the file does not exist (nothing to drain).
    pub(crate) async fn open_reader(&self) -> Result<Option<BufReader<File>>, StoreError> {
        match File::open(&self.path).await {
            Ok(file) => Ok(Some(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Open {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Create (truncating) the staging file for a drain in progress.
    pub(crate) async fn create_staging(&self) -> Result<BufWriter<File>, StoreError> {
        let file = File::create(&self.staging_path)
            .await
            .map_err(|source| StoreError::Open {
                path: self.staging_path.clone(),
                source,
            })?;
        Ok(BufWriter::new(file))
    }

    /// Write one raw line (newline appended) into the staging file.
    ///
    /// Takes bytes, not text: requeued lines must survive verbatim even when
    /// corruption has garbled them beyond valid UTF-8.
    pub(crate) async fn stage_line(
        &self,
        staging: &mut BufWriter<File>,
        line: &[u8],
    ) -> Result<(), StoreError> {
        staging
            .write_all(line)
            .await
            .map_err(|source| StoreError::Write {
                path: self.staging_path.clone(),
                source,
            })?;
        staging
            .write_all(b"\n")
            .await
            .map_err(|source| StoreError::Write {
                path: self.staging_path.clone(),
                source,
            })
    }

    /// Commit a finished staging file: flush it, then atomically rename it
    /// over the primary. Rename-over-existing is the platform's atomic
    /// replace, so there is no window where neither file holds the backlog.
    pub(crate) async fn commit_staging(
        &self,
        mut staging: BufWriter<File>,
    ) -> Result<(), StoreError> {
        staging.flush().await.map_err(|source| StoreError::Write {
            path: self.staging_path.clone(),
            source,
        })?;
        let file = staging.into_inner();
        file.sync_all().await.map_err(|source| StoreError::Write {
            path: self.staging_path.clone(),
            source,
        })?;
        drop(file);

        tokio::fs::rename(&self.staging_path, &self.path)
            .await
            .map_err(|source| StoreError::Commit {
                path: self.path.clone(),
                source,
            })
    }

    /// Remove a staging file from an abandoned drain, if present.
    pub(crate) async fn discard_staging(&self) {
        if let Err(e) = tokio::fs::remove_file(&self.staging_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    staging = %self.staging_path.display(),
                    error = %e,
                    "failed to remove abandoned staging file"
                );
            }
        }
    }
}

fn staging_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".staging");
    PathBuf::from(name)
}

async fn exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::SensorReading;
    use std::sync::atomic::{AtomicU32, Ordering};

    static TEST_SEQ: AtomicU32 = AtomicU32::new(0);

    fn temp_log(tag: &str) -> DurableLog {
        let seq = TEST_SEQ.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "temp-relay-store-{}-{}-{}.csv",
            tag,
            std::process::id(),
            seq
        ));
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(staging_path_for(&path));
        DurableLog::new(path)
    }

    fn record(ts: u64, values: &[f32], signal: i32) -> MeasurementRecord {
        MeasurementRecord::new(
            ts,
            &SensorReading {
                values: values.to_vec(),
            },
            signal,
        )
    }

    #[tokio::test]
    async fn test_has_pending_missing_file() {
        let log = temp_log("missing");
        assert!(!log.has_pending().await);
    }

    #[tokio::test]
    async fn test_has_pending_empty_file() {
        let log = temp_log("empty");
        std::fs::write(log.path(), "").unwrap();
        assert!(!log.has_pending().await);
    }

    #[tokio::test]
    async fn test_append_then_pending() {
        let log = temp_log("append");
        log.append(&record(1000, &[21.50, 21.75, 22.00], -62))
            .await
            .unwrap();
        assert!(log.has_pending().await);

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content, "1000,3,21.50,21.75,22.00,-62\n");
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let log = temp_log("order");
        log.append(&record(1, &[20.0], -60)).await.unwrap();
        log.append(&record(2, &[21.0], -61)).await.unwrap();
        log.append(&record(3, &[22.0], -62)).await.unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec!["1,1,20.00,-60", "2,1,21.00,-61", "3,1,22.00,-62"]
        );
    }

    #[tokio::test]
    async fn test_commit_replaces_primary_atomically() {
        let log = temp_log("commit");
        log.append(&record(1, &[20.0], -60)).await.unwrap();

        let mut staging = log.create_staging().await.unwrap();
        log.stage_line(&mut staging, b"9,1,25.00,-55").await.unwrap();
        log.commit_staging(staging).await.unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content, "9,1,25.00,-55\n");
        assert!(!exists(&log.staging_path).await);
    }

    #[tokio::test]
    async fn test_recover_promotes_orphaned_staging() {
        let log = temp_log("promote");
        std::fs::write(&log.staging_path, "5,1,23.00,-58\n").unwrap();

        assert!(log.recover().await.unwrap());
        assert!(log.has_pending().await);
        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content, "5,1,23.00,-58\n");
    }

    #[tokio::test]
    async fn test_recover_discards_stale_staging_when_primary_present() {
        let log = temp_log("discard");
        log.append(&record(1, &[20.0], -60)).await.unwrap();
        std::fs::write(&log.staging_path, "partial garbage").unwrap();

        assert!(!log.recover().await.unwrap());
        assert!(!exists(&log.staging_path).await);
        // Primary untouched.
        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content, "1,1,20.00,-60\n");
    }

    #[tokio::test]
    async fn test_recover_no_staging_is_noop() {
        let log = temp_log("noop");
        assert!(!log.recover().await.unwrap());
        assert!(!log.has_pending().await);
    }
}
