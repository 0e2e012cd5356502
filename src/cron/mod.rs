//! Cron service for scheduling background agent turns.
//!
//! Jobs live in a single JSON store that is rewritten atomically whenever a
//! job changes. A polling loop publishes one synthetic [`InboundMessage`] per
//! due job onto the shared bus; the scheduler never calls into the agent
//! directly.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bus::{InboundMessage, MessageBus};
use crate::error::{FemtoError, Result};

/// Sender id stamped on every message the scheduler publishes.
pub const CRON_SENDER: &str = "cron";

/// When a job runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CronSchedule {
    /// Once, at a fixed unix-millisecond timestamp.
    At { at_ms: i64 },
    /// Repeatedly, `every_ms` after each firing.
    Every { every_ms: i64 },
    /// Five-field cron expression, evaluated in UTC.
    Cron { expr: String },
}

impl std::fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CronSchedule::At { at_ms } => match DateTime::from_timestamp_millis(*at_ms) {
                Some(dt) => write!(f, "at({})", dt.to_rfc3339()),
                None => write!(f, "at({})", at_ms),
            },
            CronSchedule::Every { every_ms } => write!(f, "every({}ms)", every_ms),
            CronSchedule::Cron { expr } => write!(f, "cron({})", expr),
        }
    }
}

/// The synthetic message a job injects when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronPayload {
    pub message: String,
    pub channel: String,
    pub chat_id: String,
}

impl CronPayload {
    pub fn new(message: &str, channel: &str, chat_id: &str) -> Self {
        Self {
            message: message.to_string(),
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
        }
    }

    /// Build the inbound message for one firing of `job_id`.
    fn to_inbound(&self, job_id: &str) -> Result<InboundMessage> {
        if self.message.trim().is_empty() {
            return Err(FemtoError::Scheduler("payload message is empty".into()));
        }
        if self.channel.is_empty() || self.chat_id.is_empty() {
            return Err(FemtoError::Scheduler(
                "payload has no target conversation".into(),
            ));
        }
        Ok(
            InboundMessage::new(&self.channel, CRON_SENDER, &self.chat_id, &self.message)
                .with_metadata("cron_job_id", job_id),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CronJobState {
    pub next_run_at_ms: Option<i64>,
    pub last_run_at_ms: Option<i64>,
    pub last_status: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJob {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub schedule: CronSchedule,
    pub payload: CronPayload,
    #[serde(default)]
    pub state: CronJobState,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    #[serde(default)]
    pub delete_after_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CronStore {
    version: u32,
    jobs: Vec<CronJob>,
}

impl Default for CronStore {
    fn default() -> Self {
        Self {
            version: 1,
            jobs: Vec::new(),
        }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

// ============================================================================
// Schedule computation
// ============================================================================

/// Parse one cron field into the sorted set of values it matches.
///
/// Accepts `*`, single values, `a-b` ranges, `/step` on either of those, and
/// comma-separated lists of all three.
fn parse_cron_field(field: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    let mut values = Vec::new();
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, step.parse::<usize>().ok().filter(|s| *s > 0)?),
            None => (part, 1),
        };
        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (a.parse::<u32>().ok()?, b.parse::<u32>().ok()?)
        } else {
            let v = range.parse::<u32>().ok()?;
            // "5/15" means every 15 starting at 5
            if step > 1 {
                (v, max)
            } else {
                (v, v)
            }
        };
        if lo < min || hi > max || lo > hi {
            return None;
        }
        values.extend((lo..=hi).step_by(step));
    }
    values.sort_unstable();
    values.dedup();
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

fn next_run_from_cron_expr(expr: &str, now: i64) -> Option<i64> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return None;
    }

    let minutes = parse_cron_field(fields[0], 0, 59)?;
    let hours = parse_cron_field(fields[1], 0, 23)?;
    let dom = parse_cron_field(fields[2], 1, 31)?;
    let month = parse_cron_field(fields[3], 1, 12)?;
    // 7 is an alias for Sunday
    let dow: Vec<u32> = parse_cron_field(fields[4], 0, 7)?
        .into_iter()
        .map(|d| d % 7)
        .collect();

    // Both day fields restricted: either may match.
    let either_day = !fields[2].starts_with('*') && !fields[4].starts_with('*');
    let day_matches = |dt: &DateTime<Utc>| {
        let by_dom = dom.contains(&dt.day());
        let by_dow = dow.contains(&dt.weekday().num_days_from_sunday());
        if either_day {
            by_dom || by_dow
        } else {
            by_dom && by_dow
        }
    };

    let mut candidate = DateTime::from_timestamp_millis(now)?
        .with_second(0)?
        .with_nanosecond(0)?
        + Duration::minutes(1);
    let limit = candidate + Duration::days(366 * 4);

    while candidate <= limit {
        if !month.contains(&candidate.month()) || !day_matches(&candidate) {
            candidate = candidate.with_hour(0)?.with_minute(0)? + Duration::days(1);
            continue;
        }
        if !hours.contains(&candidate.hour()) {
            candidate = candidate.with_minute(0)? + Duration::hours(1);
            continue;
        }
        if minutes.contains(&candidate.minute()) {
            return Some(candidate.timestamp_millis());
        }
        candidate += Duration::minutes(1);
    }

    None
}

/// Returns true if the cron expression is valid and has a future run time.
pub fn is_valid_cron_expr(expr: &str) -> bool {
    next_run_from_cron_expr(expr, now_ms()).is_some()
}

/// Next due time for `schedule`, evaluated at `now_ms`.
///
/// - `At` always yields its fixed timestamp, even when it is in the past, so
///   a one-shot job missed while the process was down still fires once.
/// - `Every` yields `now_ms + every_ms`, independent of when it last ran.
/// - `Cron` yields the first matching minute strictly after `now_ms`.
///
/// `None` means the schedule can never fire (non-positive interval, invalid
/// or unsatisfiable expression).
///
/// ```
/// use femtoclaw::cron::{compute_next_run, CronSchedule};
///
/// let every = CronSchedule::Every { every_ms: 60_000 };
/// assert_eq!(compute_next_run(&every, 1_000), Some(61_000));
///
/// let at = CronSchedule::At { at_ms: 500 };
/// assert_eq!(compute_next_run(&at, 1_000), Some(500));
/// ```
pub fn compute_next_run(schedule: &CronSchedule, now_ms: i64) -> Option<i64> {
    match schedule {
        CronSchedule::At { at_ms } => Some(*at_ms),
        CronSchedule::Every { every_ms } => {
            if *every_ms > 0 {
                now_ms.checked_add(*every_ms)
            } else {
                None
            }
        }
        CronSchedule::Cron { expr } => next_run_from_cron_expr(expr, now_ms),
    }
}

/// Parse ISO datetime string into unix milliseconds.
pub fn parse_at_datetime_ms(input: &str) -> Result<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(input, format) {
            return Ok(naive.and_utc().timestamp_millis());
        }
    }
    Err(FemtoError::Scheduler(format!(
        "Invalid 'at' datetime '{}'. Use RFC3339 or YYYY-MM-DDTHH:MM:SS",
        input
    )))
}

// ============================================================================
// Service
// ============================================================================

/// Persistent cron scheduler.
pub struct CronService {
    store_path: PathBuf,
    store: Arc<RwLock<CronStore>>,
    bus: Arc<MessageBus>,
    poll_interval: StdDuration,
    running: Arc<AtomicBool>,
    handle: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl CronService {
    /// Create a new cron service with a one-second poll interval.
    pub fn new(store_path: PathBuf, bus: Arc<MessageBus>) -> Self {
        Self {
            store_path,
            store: Arc::new(RwLock::new(CronStore::default())),
            bus,
            poll_interval: StdDuration::from_secs(1),
            running: Arc::new(AtomicBool::new(false)),
            handle: Arc::new(RwLock::new(None)),
        }
    }

    /// Set the polling interval. Clock-driven jobs fire within one interval
    /// of their due time.
    pub fn with_poll_interval(mut self, interval: StdDuration) -> Self {
        self.poll_interval = interval.max(StdDuration::from_millis(10));
        self
    }

    pub fn from_config(config: &crate::config::Config, bus: Arc<MessageBus>) -> Self {
        Self::new(config.cron_store_path(), bus).with_poll_interval(StdDuration::from_millis(
            config.scheduler.poll_interval_ms,
        ))
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Load jobs from disk, replacing the in-memory set.
    ///
    /// Enabled jobs without a due time get one computed from now. Jobs whose
    /// due time already passed keep it, so the next poll fires them once.
    pub async fn load(&self) -> Result<()> {
        let mut loaded = read_store(&self.store_path).await?;
        let now = now_ms();
        for job in loaded.jobs.iter_mut().filter(|j| j.enabled) {
            if job.state.next_run_at_ms.is_none() {
                job.state.next_run_at_ms = compute_next_run(&job.schedule, now);
            }
        }
        info!(jobs = loaded.jobs.len(), path = %self.store_path.display(), "Loaded cron store");
        *self.store.write().await = loaded;
        Ok(())
    }

    /// Load the store and start the polling loop (idempotent).
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = self.load().await {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let store = Arc::clone(&self.store);
        let store_path = self.store_path.clone();
        let bus = Arc::clone(&self.bus);
        let running = Arc::clone(&self.running);
        let interval = self.poll_interval;

        let handle = tokio::spawn(async move {
            info!(poll_ms = interval.as_millis() as u64, "Cron service started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            while running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if let Err(err) = tick(&store, &store_path, &bus, now_ms()).await {
                    error!(error = %err, "Cron tick failed");
                }
            }
            info!("Cron service stopped");
        });

        *self.handle.write().await = Some(handle);
        Ok(())
    }

    /// Stop scheduler loop.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.write().await.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Fire every job due at `now` and return how many were published.
    ///
    /// The polling loop calls this once per interval; exposed so callers
    /// can drive the scheduler with an explicit clock.
    pub async fn run_due(&self, now: i64) -> Result<usize> {
        tick(&self.store, &self.store_path, &self.bus, now).await
    }

    /// Add a new job.
    pub async fn add_job(
        &self,
        name: String,
        schedule: CronSchedule,
        payload: CronPayload,
        delete_after_run: bool,
    ) -> Result<CronJob> {
        let now = now_ms();
        let next_run_at_ms = compute_next_run(&schedule, now).ok_or_else(|| {
            FemtoError::Scheduler(format!("Schedule {} never fires", schedule))
        })?;
        let job = CronJob {
            id: Uuid::new_v4().simple().to_string()[..8].to_string(),
            name,
            enabled: true,
            schedule,
            payload,
            state: CronJobState {
                next_run_at_ms: Some(next_run_at_ms),
                ..Default::default()
            },
            created_at_ms: now,
            updated_at_ms: now,
            delete_after_run,
        };

        self.store.write().await.jobs.push(job.clone());
        self.save().await?;
        info!(job_id = %job.id, job_name = %job.name, schedule = %job.schedule, "Added cron job");
        Ok(job)
    }

    /// List jobs, soonest first.
    pub async fn list_jobs(&self, include_disabled: bool) -> Vec<CronJob> {
        let store = self.store.read().await;
        let mut jobs: Vec<CronJob> = store
            .jobs
            .iter()
            .filter(|job| include_disabled || job.enabled)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.state.next_run_at_ms.unwrap_or(i64::MAX));
        jobs
    }

    pub async fn get_job(&self, job_id: &str) -> Option<CronJob> {
        let store = self.store.read().await;
        store.jobs.iter().find(|job| job.id == job_id).cloned()
    }

    /// Remove a job by id.
    pub async fn remove_job(&self, job_id: &str) -> Result<bool> {
        let removed = {
            let mut store = self.store.write().await;
            let before = store.jobs.len();
            store.jobs.retain(|job| job.id != job_id);
            store.jobs.len() < before
        };
        if removed {
            self.save().await?;
            info!(job_id, "Removed cron job");
        }
        Ok(removed)
    }

    /// Enable or disable a job. Enabling recomputes its due time from now.
    pub async fn enable_job(&self, job_id: &str, enabled: bool) -> Result<bool> {
        let found = {
            let mut store = self.store.write().await;
            match store.jobs.iter_mut().find(|job| job.id == job_id) {
                Some(job) => {
                    let now = now_ms();
                    job.enabled = enabled;
                    job.updated_at_ms = now;
                    job.state.next_run_at_ms = if enabled {
                        compute_next_run(&job.schedule, now)
                    } else {
                        None
                    };
                    true
                }
                None => false,
            }
        };
        if found {
            self.save().await?;
        }
        Ok(found)
    }

    async fn save(&self) -> Result<()> {
        let json = {
            let store = self.store.read().await;
            serde_json::to_string_pretty(&*store)?
        };
        write_store_atomic(&self.store_path, &json).await
    }
}

impl Drop for CronService {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

async fn read_store(path: &Path) -> Result<CronStore> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(serde_json::from_str::<CronStore>(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CronStore::default()),
        Err(e) => Err(e.into()),
    }
}

async fn write_store_atomic(path: &Path, json: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Outcome of one job within a tick.
enum Firing {
    Published,
    PublishFailed(String),
    PayloadInvalid(String),
}

async fn tick(
    store: &Arc<RwLock<CronStore>>,
    store_path: &Path,
    bus: &Arc<MessageBus>,
    now: i64,
) -> Result<usize> {
    let due_jobs: Vec<CronJob> = {
        let guard = store.read().await;
        guard
            .jobs
            .iter()
            .filter(|job| {
                job.enabled && job.state.next_run_at_ms.map(|n| n <= now).unwrap_or(false)
            })
            .cloned()
            .collect()
    };

    if due_jobs.is_empty() {
        return Ok(0);
    }

    // Publish without holding the store lock; a bounded bus may block here.
    let mut outcomes: Vec<(String, Firing)> = Vec::with_capacity(due_jobs.len());
    for job in &due_jobs {
        let firing = match job.payload.to_inbound(&job.id) {
            Ok(inbound) => match bus.publish_inbound(inbound).await {
                Ok(()) => {
                    debug!(job_id = %job.id, job_name = %job.name, "Cron job fired");
                    Firing::Published
                }
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Failed to publish cron job");
                    Firing::PublishFailed(e.to_string())
                }
            },
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Skipping cron firing");
                Firing::PayloadInvalid(e.to_string())
            }
        };
        outcomes.push((job.id.clone(), firing));
    }

    let mut published = 0;
    {
        let mut guard = store.write().await;
        let mut finished: Vec<String> = Vec::new();
        for (job_id, firing) in outcomes {
            let Some(job) = guard.jobs.iter_mut().find(|j| j.id == job_id) else {
                continue;
            };
            job.updated_at_ms = now;
            match firing {
                Firing::Published => {
                    published += 1;
                    job.state.last_run_at_ms = Some(now);
                    job.state.last_status = Some("ok".to_string());
                    job.state.last_error = None;
                    if job.delete_after_run {
                        finished.push(job_id.clone());
                    }
                }
                Firing::PublishFailed(e) => {
                    job.state.last_run_at_ms = Some(now);
                    job.state.last_status = Some("error".to_string());
                    job.state.last_error = Some(e);
                }
                Firing::PayloadInvalid(e) => {
                    job.state.last_status = Some("skipped".to_string());
                    job.state.last_error = Some(e);
                }
            }

            match job.schedule {
                CronSchedule::At { .. } => {
                    job.enabled = false;
                    job.state.next_run_at_ms = None;
                }
                _ => job.state.next_run_at_ms = compute_next_run(&job.schedule, now),
            }
        }
        guard.jobs.retain(|job| !finished.contains(&job.id));
    }

    let json = {
        let guard = store.read().await;
        serde_json::to_string_pretty(&*guard)?
    };
    write_store_atomic(store_path, &json).await?;

    Ok(published)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBus;
    use tempfile::tempdir;

    fn ms(s: &str) -> i64 {
        parse_at_datetime_ms(s).unwrap()
    }

    fn service(dir: &Path) -> (CronService, Arc<MessageBus>) {
        let bus = Arc::new(MessageBus::new());
        (CronService::new(dir.join("jobs.json"), bus.clone()), bus)
    }

    #[test]
    fn test_every_recomputes_from_now() {
        let schedule = CronSchedule::Every { every_ms: 60_000 };
        assert_eq!(compute_next_run(&schedule, 1_000), Some(61_000));
        assert_eq!(compute_next_run(&schedule, 7_777_777), Some(7_837_777));
        assert_eq!(compute_next_run(&CronSchedule::Every { every_ms: 0 }, 1), None);
    }

    #[test]
    fn test_at_returns_fixed_timestamp() {
        let schedule = CronSchedule::At { at_ms: 42 };
        assert_eq!(compute_next_run(&schedule, 0), Some(42));
        assert_eq!(compute_next_run(&schedule, 1_000_000), Some(42));
    }

    #[test]
    fn test_cron_next_is_strictly_after_now() {
        let schedule = CronSchedule::Cron {
            expr: "30 9 * * *".to_string(),
        };
        let now = ms("2026-03-02T09:30:00Z");
        assert_eq!(
            compute_next_run(&schedule, now),
            Some(ms("2026-03-03T09:30:00Z"))
        );
        let before = ms("2026-03-02T09:29:59Z");
        assert_eq!(
            compute_next_run(&schedule, before),
            Some(ms("2026-03-02T09:30:00Z"))
        );
    }

    #[test]
    fn test_cron_ranges_steps_and_weekdays() {
        // Weekdays at minute 0 and 30 between 09:00 and 10:59
        let schedule = CronSchedule::Cron {
            expr: "*/30 9-10 * * 1-5".to_string(),
        };
        // Saturday 2026-03-07
        let now = ms("2026-03-07T12:00:00Z");
        assert_eq!(
            compute_next_run(&schedule, now),
            Some(ms("2026-03-09T09:00:00Z"))
        );
        let sunday = CronSchedule::Cron {
            expr: "0 0 * * 7".to_string(),
        };
        assert_eq!(
            compute_next_run(&sunday, now),
            Some(ms("2026-03-08T00:00:00Z"))
        );
    }

    #[test]
    fn test_restricted_day_fields_match_either() {
        // 09:00 on the 1st of the month or on any Monday
        let schedule = CronSchedule::Cron {
            expr: "0 9 1 * 1".to_string(),
        };
        // Monday 2026-03-02, after 09:00
        let monday = ms("2026-03-02T10:00:00Z");
        assert_eq!(
            compute_next_run(&schedule, monday),
            Some(ms("2026-03-09T09:00:00Z"))
        );
        // Tuesday 2026-03-31: the 1st comes before the next Monday
        let tuesday = ms("2026-03-31T10:00:00Z");
        assert_eq!(
            compute_next_run(&schedule, tuesday),
            Some(ms("2026-04-01T09:00:00Z"))
        );
        // With day-of-week unrestricted only the 1st matches
        let monthly = CronSchedule::Cron {
            expr: "0 9 1 * *".to_string(),
        };
        assert_eq!(
            compute_next_run(&monthly, monday),
            Some(ms("2026-04-01T09:00:00Z"))
        );
    }

    #[test]
    fn test_parse_cron_field_forms() {
        assert_eq!(parse_cron_field("1,3,5", 0, 59), Some(vec![1, 3, 5]));
        assert_eq!(parse_cron_field("10-12", 0, 59), Some(vec![10, 11, 12]));
        assert_eq!(parse_cron_field("0-10/5", 0, 59), Some(vec![0, 5, 10]));
        assert_eq!(parse_cron_field("50/5", 0, 59), Some(vec![50, 55]));
        assert_eq!(parse_cron_field("*/0", 0, 59), None);
        assert_eq!(parse_cron_field("61", 0, 59), None);
        assert_eq!(parse_cron_field("9-3", 0, 59), None);
    }

    #[test]
    fn test_invalid_cron_expressions() {
        assert!(!is_valid_cron_expr("* * *"));
        assert!(!is_valid_cron_expr("0 0 31 2 *"));
        assert!(is_valid_cron_expr("0 8 * * *"));
    }

    #[test]
    fn test_parse_at_datetime_ms() {
        assert_eq!(ms("1970-01-01T00:00:01Z"), 1_000);
        assert_eq!(
            parse_at_datetime_ms("1970-01-01T00:01:00").unwrap(),
            60_000
        );
        assert!(parse_at_datetime_ms("tomorrow").is_err());
    }

    #[tokio::test]
    async fn test_add_list_remove_job() {
        let temp = tempdir().unwrap();
        let (service, _bus) = service(temp.path());

        let job = service
            .add_job(
                "test".to_string(),
                CronSchedule::Every { every_ms: 1_000 },
                CronPayload::new("hello", "cli", "direct"),
                false,
            )
            .await
            .unwrap();

        let jobs = service.list_jobs(true).await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, job.id);
        assert!(temp.path().join("jobs.json").exists());

        assert!(service.remove_job(&job.id).await.unwrap());
        assert!(!service.remove_job(&job.id).await.unwrap());
        assert!(service.list_jobs(true).await.is_empty());
    }

    #[tokio::test]
    async fn test_add_rejects_never_firing_schedule() {
        let temp = tempdir().unwrap();
        let (service, _bus) = service(temp.path());
        let err = service
            .add_job(
                "bad".into(),
                CronSchedule::Cron {
                    expr: "not a cron".into(),
                },
                CronPayload::new("x", "cli", "direct"),
                false,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("never fires"));
    }

    #[tokio::test]
    async fn test_at_job_fires_once_then_disables() {
        let temp = tempdir().unwrap();
        let (service, bus) = service(temp.path());
        let job = service
            .add_job(
                "past".into(),
                CronSchedule::At { at_ms: 1_000 },
                CronPayload::new("wake up", "telegram", "42"),
                false,
            )
            .await
            .unwrap();

        let now = now_ms();
        assert_eq!(service.run_due(now).await.unwrap(), 1);
        assert_eq!(service.run_due(now + 60_000).await.unwrap(), 0);

        let msg = bus.consume_inbound().await.unwrap();
        assert_eq!(msg.channel, "telegram");
        assert_eq!(msg.chat_id, "42");
        assert_eq!(msg.sender_id, CRON_SENDER);
        assert_eq!(msg.content, "wake up");
        assert_eq!(msg.metadata.get("cron_job_id"), Some(&job.id));

        let stored = service.get_job(&job.id).await.unwrap();
        assert!(!stored.enabled);
        assert_eq!(stored.state.next_run_at_ms, None);
        assert_eq!(stored.state.last_status.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_delete_after_run_removes_job() {
        let temp = tempdir().unwrap();
        let (service, _bus) = service(temp.path());
        service
            .add_job(
                "oneshot".into(),
                CronSchedule::At { at_ms: 1 },
                CronPayload::new("ping", "cli", "direct"),
                true,
            )
            .await
            .unwrap();

        assert_eq!(service.run_due(now_ms()).await.unwrap(), 1);
        assert!(service.list_jobs(true).await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_after_run_applies_to_recurring_jobs_only_when_fired() {
        let temp = tempdir().unwrap();
        let (service, _bus) = service(temp.path());
        let recurring = service
            .add_job(
                "once-ish".into(),
                CronSchedule::Every { every_ms: 1_000 },
                CronPayload::new("ping", "cli", "direct"),
                true,
            )
            .await
            .unwrap();
        let paused = service
            .add_job(
                "paused".into(),
                CronSchedule::Every { every_ms: 1_000 },
                CronPayload::new("later", "cli", "direct"),
                true,
            )
            .await
            .unwrap();
        let keeper = service
            .add_job(
                "keeper".into(),
                CronSchedule::Every { every_ms: 1_000 },
                CronPayload::new("again", "cli", "direct"),
                false,
            )
            .await
            .unwrap();
        assert!(service.enable_job(&paused.id, false).await.unwrap());

        assert_eq!(service.run_due(now_ms() + 5_000).await.unwrap(), 2);

        let ids: Vec<String> = service
            .list_jobs(true)
            .await
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert!(!ids.contains(&recurring.id));
        assert!(ids.contains(&paused.id));
        assert!(ids.contains(&keeper.id));
    }

    #[tokio::test]
    async fn test_every_job_reschedules_from_tick_time() {
        let temp = tempdir().unwrap();
        let (service, _bus) = service(temp.path());
        let job = service
            .add_job(
                "minutely".into(),
                CronSchedule::Every { every_ms: 60_000 },
                CronPayload::new("tick", "cli", "direct"),
                false,
            )
            .await
            .unwrap();

        let late = job.state.next_run_at_ms.unwrap() + 45_000;
        assert_eq!(service.run_due(late).await.unwrap(), 1);
        let stored = service.get_job(&job.id).await.unwrap();
        assert_eq!(stored.state.next_run_at_ms, Some(late + 60_000));
        assert!(stored.enabled);
    }

    #[tokio::test]
    async fn test_invalid_payload_skips_firing_but_reschedules() {
        let temp = tempdir().unwrap();
        let (service, bus) = service(temp.path());
        let job = service
            .add_job(
                "empty".into(),
                CronSchedule::Every { every_ms: 1_000 },
                CronPayload::new("   ", "cli", "direct"),
                false,
            )
            .await
            .unwrap();

        let now = now_ms() + 5_000;
        assert_eq!(service.run_due(now).await.unwrap(), 0);

        let stored = service.get_job(&job.id).await.unwrap();
        assert_eq!(stored.state.last_status.as_deref(), Some("skipped"));
        assert_eq!(stored.state.next_run_at_ms, Some(now + 1_000));
        assert_eq!(stored.state.last_run_at_ms, None);

        let pending =
            tokio::time::timeout(StdDuration::from_millis(50), bus.consume_inbound()).await;
        assert!(pending.is_err(), "nothing should have been published");
    }

    #[tokio::test]
    async fn test_missed_job_fires_once_after_restart() {
        let temp = tempdir().unwrap();
        let bus = Arc::new(MessageBus::new());
        let store_path = temp.path().join("jobs.json");

        let json = serde_json::json!({
            "version": 1,
            "jobs": [{
                "id": "missed1",
                "name": "missed job",
                "enabled": true,
                "schedule": { "kind": "every", "every_ms": 60000 },
                "payload": { "message": "check", "channel": "cli", "chat_id": "direct" },
                "state": { "next_run_at_ms": 1 },
                "created_at_ms": 1,
                "updated_at_ms": 1,
                "delete_after_run": false
            }]
        });
        tokio::fs::write(&store_path, serde_json::to_string_pretty(&json).unwrap())
            .await
            .unwrap();

        let service = CronService::new(store_path, bus.clone());
        service.load().await.unwrap();

        let now = now_ms();
        assert_eq!(service.run_due(now).await.unwrap(), 1);
        assert_eq!(service.run_due(now + 1).await.unwrap(), 0);
        assert_eq!(bus.consume_inbound().await.unwrap().content, "check");

        let jobs = service.list_jobs(true).await;
        assert_eq!(jobs[0].state.next_run_at_ms, Some(now + 60_000));
    }

    #[tokio::test]
    async fn test_enable_job_toggles_schedule() {
        let temp = tempdir().unwrap();
        let (service, _bus) = service(temp.path());
        let job = service
            .add_job(
                "t".into(),
                CronSchedule::Every { every_ms: 10_000 },
                CronPayload::new("x", "cli", "direct"),
                false,
            )
            .await
            .unwrap();

        assert!(service.enable_job(&job.id, false).await.unwrap());
        assert!(service.list_jobs(false).await.is_empty());
        assert!(service.enable_job(&job.id, true).await.unwrap());
        assert!(service.get_job(&job.id).await.unwrap().state.next_run_at_ms.is_some());
        assert!(!service.enable_job("missing", true).await.unwrap());
    }

    #[tokio::test]
    async fn test_store_survives_reload() {
        let temp = tempdir().unwrap();
        let (service, bus) = service(temp.path());
        service
            .add_job(
                "persisted".into(),
                CronSchedule::Cron {
                    expr: "0 8 * * *".into(),
                },
                CronPayload::new("morning", "cli", "direct"),
                false,
            )
            .await
            .unwrap();

        let reloaded = CronService::new(temp.path().join("jobs.json"), bus);
        reloaded.load().await.unwrap();
        let jobs = reloaded.list_jobs(true).await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "persisted");
        assert!(!temp.path().join("jobs.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_polling_loop_fires_due_job() {
        let temp = tempdir().unwrap();
        let bus = Arc::new(MessageBus::new());
        let service = CronService::new(temp.path().join("jobs.json"), bus.clone())
            .with_poll_interval(StdDuration::from_millis(20));
        service.start().await.unwrap();
        service
            .add_job(
                "soon".into(),
                CronSchedule::At { at_ms: now_ms() },
                CronPayload::new("from loop", "cli", "direct"),
                false,
            )
            .await
            .unwrap();

        let msg = tokio::time::timeout(StdDuration::from_secs(2), bus.consume_inbound())
            .await
            .expect("job should fire within the timeout")
            .expect("bus open");
        assert_eq!(msg.content, "from loop");
        service.stop().await;
        assert!(!service.is_running());
    }
}
