//! Re-encrypt every stored recording under a new key
//!
//! Each blob is downloaded, re-encrypted in memory, uploaded under a fresh
//! locator, and only then is the row repointed and the old blob removed.
//! A crash mid-run leaves every row pointing at a readable blob.

use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::db::assessments;
use crate::services::vault::{rotate_key, AudioCipher, CipherError, StorageRouter};

const AUDIO_EXTENSION: &str = "wav";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationReport {
    pub rotated: usize,
    /// Already readable with the new key (e.g. an interrupted earlier run)
    pub already_current: usize,
    pub failed: usize,
}

pub async fn rotate_all(
    db: &SqlitePool,
    storage: &StorageRouter,
    old: &AudioCipher,
    new: &AudioCipher,
) -> pron_common::Result<RotationReport> {
    let stored = assessments::list_stored_audio(db).await?;
    info!(count = stored.len(), "Rotating encryption key for stored recordings");

    let mut report = RotationReport::default();

    for audio in stored {
        let token = match storage.download(&audio.audio_locator).await {
            Ok(token) => token,
            Err(e) => {
                error!(assessment_id = audio.assessment_id, "Download failed: {}", e);
                report.failed += 1;
                continue;
            }
        };

        let rotated = match rotate_key(old, new, &token) {
            Ok(rotated) => rotated,
            Err(CipherError::InvalidToken) if new.decrypt(&token).is_ok() => {
                report.already_current += 1;
                continue;
            }
            Err(e) => {
                error!(assessment_id = audio.assessment_id, "Re-encryption failed: {}", e);
                report.failed += 1;
                continue;
            }
        };

        let locator = match storage
            .upload(&rotated, AUDIO_EXTENSION, Some(&audio.external_user_id))
            .await
        {
            Ok(locator) => locator,
            Err(e) => {
                error!(assessment_id = audio.assessment_id, "Upload failed: {}", e);
                report.failed += 1;
                continue;
            }
        };

        if let Err(e) = assessments::update_audio_locator(db, audio.assessment_id, &locator).await {
            error!(assessment_id = audio.assessment_id, "Row update failed: {}", e);
            storage.delete_best_effort(&[locator]).await;
            report.failed += 1;
            continue;
        }

        if let Err(e) = storage.delete(&audio.audio_locator).await {
            warn!(assessment_id = audio.assessment_id, "Old blob not removed: {}", e);
        }
        report.rotated += 1;
    }

    info!(
        rotated = report.rotated,
        already_current = report.already_current,
        failed = report.failed,
        "Key rotation finished"
    );
    Ok(report)
}
