//! Cron command handlers.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::DateTime;

use femtoclaw::bus::MessageBus;
use femtoclaw::config::Config;
use femtoclaw::cron::{is_valid_cron_expr, parse_at_datetime_ms, CronPayload, CronSchedule, CronService};

use super::CronAction;

pub(crate) async fn cmd_cron(action: CronAction) -> Result<()> {
    let config = Config::load().with_context(|| "Failed to load configuration")?;
    let service = CronService::from_config(&config, Arc::new(MessageBus::new()));
    service
        .load()
        .await
        .with_context(|| format!("Failed to load cron store {:?}", service.store_path()))?;

    match action {
        CronAction::List { all } => {
            let jobs = service.list_jobs(all).await;
            if jobs.is_empty() {
                println!("No scheduled jobs.");
                return Ok(());
            }
            for job in jobs {
                let next = job
                    .state
                    .next_run_at_ms
                    .and_then(DateTime::from_timestamp_millis)
                    .map(|dt| dt.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  {:<20} {:<28} next={} target={}:{}{}",
                    job.id,
                    job.name,
                    job.schedule.to_string(),
                    next,
                    job.payload.channel,
                    job.payload.chat_id,
                    if job.enabled { "" } else { " (disabled)" }
                );
            }
        }
        CronAction::Add {
            name,
            message,
            every,
            cron,
            at,
            channel,
            chat_id,
        } => {
            let (schedule, one_shot) = match (every, cron, at) {
                (Some(secs), None, None) => {
                    if secs == 0 {
                        bail!("--every must be at least 1 second");
                    }
                    let every_ms = i64::try_from(secs.saturating_mul(1000))
                        .with_context(|| "--every is too large")?;
                    (CronSchedule::Every { every_ms }, false)
                }
                (None, Some(expr), None) => {
                    if !is_valid_cron_expr(&expr) {
                        bail!("Invalid cron expression '{}'", expr);
                    }
                    (CronSchedule::Cron { expr }, false)
                }
                (None, None, Some(at)) => (
                    CronSchedule::At {
                        at_ms: parse_at_datetime_ms(&at)?,
                    },
                    true,
                ),
                _ => bail!("Specify exactly one of --every, --cron or --at"),
            };

            let job = service
                .add_job(name, schedule, CronPayload::new(&message, &channel, &chat_id), one_shot)
                .await?;
            println!("Added job {} ({})", job.id, job.schedule);
        }
        CronAction::Remove { id } => {
            if service.remove_job(&id).await? {
                println!("Removed job {}", id);
            } else {
                bail!("No job with id '{}'", id);
            }
        }
    }

    Ok(())
}
