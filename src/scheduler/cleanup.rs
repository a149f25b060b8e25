// Cleanup tasks run by the scheduler

use std::io::ErrorKind;
use std::path::Path;
use tracing::{error, info, warn};

use crate::status::StatusManager;
use crate::store::StatusStore;
use crate::types::{JobType, StoreError};

/// Error class recorded for WORKING records whose worker lease has lapsed.
pub const LEASE_EXPIRED: &str = "LeaseExpired";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadSweep {
    pub scanned: usize,
    pub kept: Vec<String>,
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

/// Delete upload directories that have no `transcription:<id>` record.
///
/// The listing and the per-directory lookups are not one snapshot: a directory
/// written just before its job's PENDING record lands can be removed here.
pub async fn cleanup_transcription_uploads(
    upload_dir: &Path,
    store: &dyn StatusStore,
) -> Result<UploadSweep, StoreError> {
    info!(upload_dir = %upload_dir.display(), "Starting transcription uploads cleanup job");
    let mut sweep = UploadSweep::default();

    let mut entries = match tokio::fs::read_dir(upload_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("Upload directory does not exist");
            return Ok(sweep);
        }
        Err(e) => {
            error!(error = %e, "Failed to list upload directory");
            return Ok(sweep);
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Failed to read upload directory entry");
                break;
            }
        };

        match entry.file_type().await {
            Ok(file_type) if file_type.is_dir() => {}
            _ => continue,
        }

        let request_id = entry.file_name().to_string_lossy().into_owned();
        sweep.scanned += 1;

        if store.exists(JobType::Transcription, &request_id).await? {
            sweep.kept.push(request_id);
            continue;
        }

        info!(request_id, "Deleting unnecessary directory");
        match tokio::fs::remove_dir_all(entry.path()).await {
            Ok(()) => sweep.deleted.push(request_id),
            Err(e) => {
                error!(request_id, error = %e, "Failed to delete directory");
                sweep.failed.push(request_id);
            }
        }
    }

    info!(
        scanned = sweep.scanned,
        deleted = sweep.deleted.len(),
        failed = sweep.failed.len(),
        "Transcription uploads cleanup job completed"
    );
    Ok(sweep)
}

/// Reserved. Store TTLs already reclaim expired keys.
pub async fn cleanup_expired_keys() {
    info!("Starting expired keys cleanup job");
    info!("Expired keys cleanup job completed");
}

/// Move WORKING records without a live lease to ERROR.
///
/// The status check, the lease check and the write happen in one store step, so
/// a worker finishing or taking its lease mid-sweep is never overwritten.
pub async fn reclaim_abandoned_jobs(status: &StatusManager) -> Result<Vec<(JobType, String)>, StoreError> {
    let mut reclaimed = Vec::new();

    for job_type in JobType::ALL {
        for id in status.list_ids(job_type).await? {
            if status.reclaim_abandoned(job_type, &id, LEASE_EXPIRED).await? {
                warn!(%job_type, request_id = %id, "Reclaimed job abandoned by its worker");
                reclaimed.push((job_type, id));
            }
        }
    }

    if !reclaimed.is_empty() {
        info!(count = reclaimed.len(), "Abandoned jobs reclaimed");
    }
    Ok(reclaimed)
}
