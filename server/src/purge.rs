//! Background purge of objects whose file records were deleted.
//!
//! `delete_file` leaves a purge intent next to the removed record. Callers
//! normally follow up with `delete_object`, which clears it; intents still
//! present after the grace period are picked up here and retried on every
//! tick until they succeed or run out of attempts.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;

use crate::config::PurgeConfig;
use crate::domain::{DocumentStore, PurgeIntent};
use crate::object_store::{ObjectStore, ObjectStoreError};
use crate::Database;

/// What one pass over the purge intents achieved.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub purged: usize,
    pub failed: usize,
}

pub struct PurgeWorker {
    db: Database,
    objects: Arc<dyn ObjectStore>,
    config: PurgeConfig,
}

impl PurgeWorker {
    #[must_use]
    pub fn new(db: Database, objects: Arc<dyn ObjectStore>, config: PurgeConfig) -> Self {
        Self {
            db,
            objects,
            config,
        }
    }

    /// Starts the worker as a background task.
    pub fn start(self) -> JoinHandle<()> {
        let period = Duration::from_secs(self.config.interval_secs.max(1));
        tracing::info!("starting purge worker with {}s interval", period.as_secs());

        tokio::spawn(async move {
            let mut interval = time::interval(period);
            loop {
                interval.tick().await;
                match self.run_once(chrono::Utc::now().timestamp()).await {
                    Ok(report) if report != PurgeReport::default() => {
                        tracing::info!(
                            "purge pass: {} objects purged, {} failed",
                            report.purged,
                            report.failed
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("error processing purge intents: {e}"),
                }
            }
        })
    }

    /// Processes intents that are older than the grace period at `now`.
    pub async fn run_once(&self, now: i64) -> Result<PurgeReport, rusqlite::Error> {
        let grace = i64::try_from(self.config.grace_secs).unwrap_or(i64::MAX);
        let due = {
            let mut db = self.db.lock().await;
            db.pending_purges(
                now.saturating_sub(grace),
                self.config.max_attempts,
                self.config.batch_size,
            )?
        };

        let mut report = PurgeReport::default();
        for intent in due {
            match self.purge(&intent).await {
                Ok(true) => report.purged += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    tracing::error!("purge outcome of {} not recorded: {e}", intent.storage_id);
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn purge(&self, intent: &PurgeIntent) -> Result<bool, rusqlite::Error> {
        let key = intent.storage_id.as_str();
        let outcome = self.objects.delete(key).await;

        let mut db = self.db.lock().await;
        match outcome {
            Ok(()) => {
                tracing::info!("purged object {key} of {}", intent.owner_id);
                db.complete_purge(key)?;
                Ok(true)
            }
            Err(ObjectStoreError::NotFound(_)) => {
                tracing::debug!("object {key} already gone");
                db.complete_purge(key)?;
                Ok(true)
            }
            Err(e) => {
                let attempt = intent.attempts + 1;
                if attempt >= self.config.max_attempts {
                    tracing::error!("giving up on purging {key} after {attempt} attempts: {e}");
                } else {
                    tracing::warn!("purging {key} failed (attempt {attempt}): {e}");
                }
                db.fail_purge(key, &e.to_string())?;
                Ok(false)
            }
        }
    }
}
