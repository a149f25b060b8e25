//! Cleanup Scheduler
//!
//! Runs recurring maintenance independently of the workers:
//!
//! | Task | Schedule | Effect |
//! |------|----------|--------|
//! | `cleanup_transcription_uploads` | daily 00:00 UTC | delete upload dirs with no `transcription:<id>` record |
//! | `cleanup_expired_keys` | Sunday 01:00 UTC | reserved, store TTLs do the work |
//! | `reclaim_abandoned_jobs` | fixed interval | WORKING records without a lease become ERROR |
//!
//! On start the registrations left by any previous scheduler are cleared before
//! the current set is registered, so restarts never stack duplicate tasks.

pub mod cleanup;

pub use cleanup::{cleanup_expired_keys, cleanup_transcription_uploads, reclaim_abandoned_jobs, UploadSweep};

use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::status::StatusManager;
use crate::store::{StatusStore, TaskBook};
use crate::types::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Daily { hour: u32, minute: u32 },
    Weekly { weekday: Weekday, hour: u32, minute: u32 },
    Every(chrono::Duration),
}

impl Schedule {
    /// First run strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Schedule::Daily { hour, minute } => {
                let candidate = now.date_naive().and_time(time_of_day(hour, minute)).and_utc();
                if candidate > now {
                    candidate
                } else {
                    candidate + chrono::Duration::days(1)
                }
            }
            Schedule::Weekly { weekday, hour, minute } => {
                let ahead = (7 + weekday.num_days_from_monday() - now.weekday().num_days_from_monday()) % 7;
                let date = now.date_naive() + chrono::Duration::days(ahead as i64);
                let candidate = date.and_time(time_of_day(hour, minute)).and_utc();
                if candidate > now {
                    candidate
                } else {
                    candidate + chrono::Duration::weeks(1)
                }
            }
            Schedule::Every(period) => now + period,
        }
    }

    /// Cron-style description stored with the task registration.
    pub fn describe(&self) -> String {
        match *self {
            Schedule::Daily { hour, minute } => format!("{} {} * * *", minute, hour),
            Schedule::Weekly { weekday, hour, minute } => {
                format!("{} {} * * {}", minute, hour, weekday.num_days_from_sunday())
            }
            Schedule::Every(period) => format!("@every {}s", period.num_seconds()),
        }
    }
}

fn time_of_day(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupTask {
    OrphanUploads,
    ExpiredKeys,
    AbandonedWork,
}

impl CleanupTask {
    pub fn id(&self) -> &'static str {
        match self {
            CleanupTask::OrphanUploads => "cleanup_transcription_uploads",
            CleanupTask::ExpiredKeys => "cleanup_expired_keys",
            CleanupTask::AbandonedWork => "reclaim_abandoned_jobs",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RecurringTask {
    pub task: CleanupTask,
    pub schedule: Schedule,
}

pub struct CleanupScheduler {
    store: Arc<dyn StatusStore>,
    book: Arc<dyn TaskBook>,
    status: StatusManager,
    upload_dir: PathBuf,
    tasks: Vec<RecurringTask>,
}

impl CleanupScheduler {
    pub fn new<S>(store: Arc<S>, upload_dir: PathBuf, sweep_interval: chrono::Duration) -> Self
    where
        S: StatusStore + TaskBook + 'static,
    {
        let tasks = vec![
            RecurringTask {
                task: CleanupTask::OrphanUploads,
                schedule: Schedule::Daily { hour: 0, minute: 0 },
            },
            RecurringTask {
                task: CleanupTask::ExpiredKeys,
                schedule: Schedule::Weekly {
                    weekday: Weekday::Sun,
                    hour: 1,
                    minute: 0,
                },
            },
            RecurringTask {
                task: CleanupTask::AbandonedWork,
                schedule: Schedule::Every(sweep_interval),
            },
        ];

        let status_store: Arc<dyn StatusStore> = store.clone();
        Self {
            status: StatusManager::new(status_store.clone()),
            store: status_store,
            book: store,
            upload_dir,
            tasks,
        }
    }

    pub fn tasks(&self) -> &[RecurringTask] {
        &self.tasks
    }

    /// Clear every previously registered task, then register the current set.
    pub async fn register_tasks(&self) -> Result<(), StoreError> {
        let cleared = self.book.clear_tasks().await?;
        if cleared > 0 {
            info!(cleared, "Cleared previously registered tasks");
        }
        for recurring in &self.tasks {
            self.book
                .register_task(recurring.task.id(), &recurring.schedule.describe())
                .await?;
            info!(task = recurring.task.id(), schedule = %recurring.schedule.describe(), "Task registered");
        }
        Ok(())
    }

    pub async fn run_task(&self, task: CleanupTask) -> Result<(), StoreError> {
        match task {
            CleanupTask::OrphanUploads => {
                cleanup_transcription_uploads(&self.upload_dir, self.store.as_ref()).await?;
            }
            CleanupTask::ExpiredKeys => cleanup_expired_keys().await,
            CleanupTask::AbandonedWork => {
                reclaim_abandoned_jobs(&self.status).await?;
            }
        }
        Ok(())
    }

    /// Register tasks and drive them until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<(), StoreError> {
        self.register_tasks().await?;
        info!("Scheduler started");

        let mut loops = JoinSet::new();
        for recurring in self.tasks.clone() {
            loops.spawn(self.clone().drive(recurring, shutdown.clone()));
        }
        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Scheduler task loop aborted");
            }
        }

        info!("Scheduler stopped");
        Ok(())
    }

    async fn drive(self: Arc<Self>, recurring: RecurringTask, shutdown: CancellationToken) {
        let id = recurring.task.id();
        loop {
            let now = Utc::now();
            let next = recurring.schedule.next_after(now);
            let wait = (next - now).to_std().unwrap_or_default();
            debug!(task = id, next_run = %next, "Next run scheduled");

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            if let Err(e) = self.run_task(recurring.task).await {
                error!(task = id, error = %e, "Scheduled task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStatusStore;
    use chrono::TimeZone;
    use std::time::Duration;
    use tempfile::TempDir;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_daily_runs_next_midnight() {
        let schedule = Schedule::Daily { hour: 0, minute: 0 };
        assert_eq!(schedule.next_after(at(2024, 1, 1, 12, 0)), at(2024, 1, 2, 0, 0));
        assert_eq!(schedule.next_after(at(2024, 1, 1, 0, 0)), at(2024, 1, 2, 0, 0));
        assert_eq!(schedule.describe(), "0 0 * * *");
    }

    #[test]
    fn test_weekly_runs_sunday_one_am() {
        let schedule = Schedule::Weekly {
            weekday: Weekday::Sun,
            hour: 1,
            minute: 0,
        };
        // 2024-01-01 is a Monday, 2024-01-07 a Sunday.
        assert_eq!(schedule.next_after(at(2024, 1, 1, 9, 0)), at(2024, 1, 7, 1, 0));
        assert_eq!(schedule.next_after(at(2024, 1, 7, 0, 30)), at(2024, 1, 7, 1, 0));
        assert_eq!(schedule.next_after(at(2024, 1, 7, 1, 0)), at(2024, 1, 14, 1, 0));
        assert_eq!(schedule.describe(), "0 1 * * 0");
    }

    #[test]
    fn test_every_adds_period() {
        let schedule = Schedule::Every(chrono::Duration::seconds(600));
        assert_eq!(schedule.next_after(at(2024, 1, 1, 0, 0)), at(2024, 1, 1, 0, 10));
    }

    #[tokio::test]
    async fn test_restart_clears_previous_registrations() {
        let store = Arc::new(MemoryStatusStore::new());
        store.register_task("stale_task", "* * * * *").await.unwrap();
        let scheduler = CleanupScheduler::new(store.clone(), PathBuf::from("unused"), chrono::Duration::seconds(600));

        scheduler.register_tasks().await.unwrap();
        scheduler.register_tasks().await.unwrap();

        assert_eq!(
            store.registered_tasks().await.unwrap(),
            vec![
                "cleanup_expired_keys".to_string(),
                "cleanup_transcription_uploads".to_string(),
                "reclaim_abandoned_jobs".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_run_task_orphan_uploads() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("gone")).unwrap();
        let store = Arc::new(MemoryStatusStore::new());
        let scheduler = CleanupScheduler::new(store, root.path().to_path_buf(), chrono::Duration::seconds(600));

        scheduler.run_task(CleanupTask::OrphanUploads).await.unwrap();
        scheduler.run_task(CleanupTask::ExpiredKeys).await.unwrap();

        assert!(!root.path().join("gone").exists());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let store = Arc::new(MemoryStatusStore::new());
        let scheduler = Arc::new(CleanupScheduler::new(
            store.clone(),
            PathBuf::from("unused"),
            chrono::Duration::seconds(600),
        ));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        handle.await.unwrap().unwrap();
        assert_eq!(store.registered_tasks().await.unwrap().len(), 3);
    }
}
