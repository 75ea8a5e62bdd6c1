//! Partition lifecycle: provisioning ahead of need, archival after
//! retention.
//!
//! Provisioning runs daily and keeps a partition in place for `now +
//! horizon` so appends never race partition creation. Archival runs
//! monthly and retires partitions that fell entirely out of the retention
//! window: export to cold storage as a checksummed, compressed blob,
//! verify the export by reading it back, and only then drop the partition
//! from hot storage. The three steps are one non-cancelable unit: a
//! failure at any step leaves the partition untouched and active.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use ledger_stream_core::archive::{ArchiveManifest, ColdStorage};
use ledger_stream_core::clock::Clock;
use ledger_stream_core::event::EventRecord;
use ledger_stream_core::event_store::EventStore;
use ledger_stream_core::partition::{Partition, PartitionId, PartitionStatus};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::sync::Arc;
use thiserror::Error;

/// Errors from the archival path.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Exporting the partition to cold storage failed; nothing was
    /// dropped. The whole archival is retried on the next run.
    #[error("Export of {partition_id} failed: {reason}")]
    ExportFailed {
        /// The partition being exported.
        partition_id: PartitionId,
        /// Failure detail.
        reason: String,
    },

    /// The re-read export did not match what was written.
    ///
    /// Fatal for this run: the partition is not dropped, and the mismatch
    /// is surfaced for the operator instead of being retried into a drop.
    #[error("Checksum mismatch verifying export of {partition_id}: wrote {expected}, read {actual}")]
    ChecksumMismatch {
        /// The partition whose export failed verification.
        partition_id: PartitionId,
        /// Checksum recorded at export time.
        expected: String,
        /// Checksum of the re-read blob.
        actual: String,
    },

    /// Event store failure while reading or dropping the partition.
    #[error("Event store error: {0}")]
    Store(#[from] ledger_stream_core::event_store::EventStoreError),
}

/// Everything stored in one cold-storage object: the manifest and the
/// serialized events it describes.
#[derive(Serialize, Deserialize)]
struct ExportBlob {
    manifest: ArchiveManifest,
    events: Vec<u8>,
}

/// Report of one archival run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Partitions exported, verified, and dropped.
    pub archived: Vec<PartitionId>,
    /// Partitions whose archival failed (left active), with the reason.
    pub failed: Vec<(PartitionId, String)>,
}

/// Provisions future partitions and retires expired ones.
pub struct PartitionLifecycleManager {
    events: Arc<dyn EventStore>,
    cold_storage: Arc<dyn ColdStorage>,
    clock: Arc<dyn Clock>,
}

impl PartitionLifecycleManager {
    /// Create a manager over the given store and archive destination.
    #[must_use]
    pub fn new(
        events: Arc<dyn EventStore>,
        cold_storage: Arc<dyn ColdStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            events,
            cold_storage,
            clock,
        }
    }

    /// Ensure a partition covers `now + horizon`.
    ///
    /// Idempotent: returns `None` when coverage already exists, otherwise
    /// creates the covering calendar-year partition and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns the event store's error if listing or creating partitions
    /// fails.
    pub async fn ensure_future_partition(
        &self,
        horizon: chrono::Duration,
    ) -> Result<Option<PartitionId>, ledger_stream_core::event_store::EventStoreError> {
        let target = self.clock.now() + horizon;
        let partitions = self.events.partitions().await?;
        if partitions.iter().any(|p| p.covers(target)) {
            return Ok(None);
        }

        let partition = Partition::covering(target);
        let id = partition.id;
        self.events.create_partition(partition).await?;
        tracing::info!(partition = %id, target = %target, "Provisioned future partition");
        Ok(Some(id))
    }

    /// Archive every active partition that lies entirely outside the
    /// retention window.
    ///
    /// Failures are collected per partition; one failed export never
    /// blocks the others, and a failed partition stays active for the
    /// next run.
    ///
    /// # Errors
    ///
    /// Returns the event store's error only if the partition listing
    /// itself fails.
    pub async fn archive_expired(
        &self,
        retention: chrono::Duration,
    ) -> Result<ArchiveSummary, ledger_stream_core::event_store::EventStoreError> {
        let cutoff = self.clock.now() - retention;
        let partitions = self.events.partitions().await?;
        let mut summary = ArchiveSummary::default();

        for partition in partitions {
            if partition.status != PartitionStatus::Active || !partition.ends_before(cutoff) {
                continue;
            }
            match self.archive_partition(&partition).await {
                Ok(()) => summary.archived.push(partition.id),
                Err(err) => {
                    tracing::error!(
                        partition = %partition.id,
                        error = %err,
                        "Partition archival failed; partition left active"
                    );
                    summary.failed.push((partition.id, err.to_string()));
                }
            }
        }

        metrics::counter!("partitions.archived").increment(summary.archived.len() as u64);
        tracing::info!(
            archived = summary.archived.len(),
            failed = summary.failed.len(),
            "Archival run finished"
        );
        Ok(summary)
    }

    /// Export, verify, and drop one partition.
    ///
    /// The three steps run as a unit: any failure aborts before the drop,
    /// leaving the partition active with all its events.
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::ExportFailed`]: serialization or cold-storage
    ///   write/read failure
    /// - [`ArchiveError::ChecksumMismatch`]: the re-read export does not
    ///   match what was written
    /// - [`ArchiveError::Store`]: event store failure
    pub async fn archive_partition(&self, partition: &Partition) -> Result<(), ArchiveError> {
        let partition_id = partition.id;
        let events = self.events.partition_events(partition_id).await?;

        // Step 1: export.
        let payload = bincode::serialize(&events)
            .map_err(|e| export_failed(partition_id, &e.to_string()))?;
        let checksum = sha256_hex(&payload);
        let manifest = ArchiveManifest {
            partition_id,
            range_start: partition.range_start,
            range_end: partition.range_end,
            event_count: events.len() as u64,
            checksum: checksum.clone(),
            exported_at: self.clock.now(),
        };
        let blob = compress(&ExportBlob {
            manifest,
            events: payload,
        })
        .map_err(|e| export_failed(partition_id, &e))?;

        let key = export_key(partition_id);
        self.cold_storage
            .put(&key, blob)
            .await
            .map_err(|e| export_failed(partition_id, &e.to_string()))?;

        // Step 2: verify by re-reading.
        let read_back = self
            .cold_storage
            .get(&key)
            .await
            .map_err(|e| export_failed(partition_id, &e.to_string()))?;
        let decoded: ExportBlob =
            decompress(&read_back).map_err(|e| export_failed(partition_id, &e))?;
        let actual = sha256_hex(&decoded.events);
        if actual != checksum || decoded.manifest.event_count != events.len() as u64 {
            return Err(ArchiveError::ChecksumMismatch {
                partition_id,
                expected: checksum,
                actual,
            });
        }

        // Step 3: only now drop from hot storage.
        self.events.drop_partition(partition_id).await?;
        self.events.mark_archived(partition_id).await?;

        tracing::info!(
            partition = %partition_id,
            events = events.len(),
            "Partition exported, verified, and dropped"
        );
        Ok(())
    }

    /// Read an archived partition's events back from cold storage.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::ExportFailed`] if the blob is missing or
    /// unreadable, [`ArchiveError::ChecksumMismatch`] if its contents do
    /// not match its manifest.
    pub async fn restore_partition(
        &self,
        partition_id: PartitionId,
    ) -> Result<Vec<EventRecord>, ArchiveError> {
        let blob = self
            .cold_storage
            .get(&export_key(partition_id))
            .await
            .map_err(|e| export_failed(partition_id, &e.to_string()))?;
        let decoded: ExportBlob =
            decompress(&blob).map_err(|e| export_failed(partition_id, &e))?;

        let actual = sha256_hex(&decoded.events);
        if actual != decoded.manifest.checksum {
            return Err(ArchiveError::ChecksumMismatch {
                partition_id,
                expected: decoded.manifest.checksum,
                actual,
            });
        }
        bincode::deserialize(&decoded.events)
            .map_err(|e| export_failed(partition_id, &e.to_string()))
    }
}

fn export_key(partition_id: PartitionId) -> String {
    format!("{partition_id}.bin.gz")
}

fn export_failed(partition_id: PartitionId, reason: &str) -> ArchiveError {
    ArchiveError::ExportFailed {
        partition_id,
        reason: reason.to_string(),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn compress(blob: &ExportBlob) -> Result<Vec<u8>, String> {
    let serialized = bincode::serialize(blob).map_err(|e| e.to_string())?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&serialized).map_err(|e| e.to_string())?;
    encoder.finish().map_err(|e| e.to_string())
}

fn decompress(bytes: &[u8]) -> Result<ExportBlob, String> {
    let mut decoder = GzDecoder::new(bytes);
    let mut serialized = Vec::new();
    decoder
        .read_to_end(&mut serialized)
        .map_err(|e| e.to_string())?;
    bincode::deserialize(&serialized).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex(b"ledger"),
            sha256_hex(b"ledger"),
        );
        assert_ne!(sha256_hex(b"ledger"), sha256_hex(b"ledger2"));
        assert_eq!(sha256_hex(b"").len(), 64);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn export_blob_round_trips_through_gzip() {
        let blob = ExportBlob {
            manifest: ArchiveManifest {
                partition_id: PartitionId::new(2020),
                range_start: chrono::DateTime::<chrono::Utc>::MIN_UTC,
                range_end: chrono::DateTime::<chrono::Utc>::MAX_UTC,
                event_count: 0,
                checksum: sha256_hex(&[]),
                exported_at: chrono::DateTime::<chrono::Utc>::MIN_UTC,
            },
            events: bincode::serialize(&Vec::<EventRecord>::new()).unwrap(),
        };
        let compressed = compress(&blob).unwrap();
        let decoded = decompress(&compressed).unwrap();
        assert_eq!(decoded.manifest.partition_id, PartitionId::new(2020));
        assert_eq!(decoded.manifest.checksum, blob.manifest.checksum);
    }

    #[test]
    fn export_keys_name_the_partition() {
        assert_eq!(export_key(PartitionId::new(2019)), "events_2019.bin.gz");
    }
}
