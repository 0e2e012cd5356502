//! Cron scheduling tool.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::cron::{
    is_valid_cron_expr, parse_at_datetime_ms, CronPayload, CronSchedule, CronService,
};
use crate::error::{FemtoError, Result};
use crate::utils::string::preview;

use super::{Tool, ToolContext};

/// Tool for creating and managing scheduled jobs.
pub struct CronTool {
    cron: Arc<CronService>,
}

impl CronTool {
    /// Create a new cron tool.
    pub fn new(cron: Arc<CronService>) -> Self {
        Self { cron }
    }
}

#[async_trait]
impl Tool for CronTool {
    fn name(&self) -> &str {
        "cron"
    }

    fn description(&self) -> &str {
        "Schedule reminders and recurring tasks. Actions: add, list, remove."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["add", "list", "remove"],
                    "description": "Action to perform"
                },
                "message": {
                    "type": "string",
                    "description": "Message for add action"
                },
                "name": {
                    "type": "string",
                    "description": "Optional job name"
                },
                "every_seconds": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Run interval in seconds"
                },
                "cron_expr": {
                    "type": "string",
                    "description": "Cron expression (UTC)"
                },
                "at": {
                    "type": "string",
                    "description": "One-shot ISO datetime"
                },
                "job_id": {
                    "type": "string",
                    "description": "Target job id for remove"
                },
                "include_disabled": {
                    "type": "boolean",
                    "description": "Include disabled jobs when listing"
                },
                "channel": {
                    "type": "string",
                    "description": "Optional target channel (defaults to current)"
                },
                "chat_id": {
                    "type": "string",
                    "description": "Optional target chat id (defaults to current)"
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let action = args
            .get("action")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FemtoError::Tool("Missing 'action' argument".into()))?;

        match action {
            "add" => self.execute_add(&args, ctx).await,
            "list" => self.execute_list(&args).await,
            "remove" => self.execute_remove(&args).await,
            other => Err(FemtoError::Tool(format!("Unknown cron action '{}'", other))),
        }
    }
}

impl CronTool {
    async fn execute_add(&self, args: &Value, ctx: &ToolContext) -> Result<String> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| FemtoError::Tool("Missing 'message' for cron add".into()))?;

        let name = args
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| preview(message, 30));

        let every_seconds = args.get("every_seconds").and_then(|v| v.as_i64());
        let cron_expr = args.get("cron_expr").and_then(|v| v.as_str());
        let at = args.get("at").and_then(|v| v.as_str());

        let (schedule, delete_after_run) = match (every_seconds, cron_expr, at) {
            (Some(seconds), None, None) => {
                if seconds <= 0 {
                    return Err(FemtoError::Tool(
                        "'every_seconds' must be greater than zero".to_string(),
                    ));
                }
                let every_ms = seconds.checked_mul(1_000).ok_or_else(|| {
                    FemtoError::Tool("'every_seconds' is too large".to_string())
                })?;
                (CronSchedule::Every { every_ms }, false)
            }
            (None, Some(expr), None) => {
                if !is_valid_cron_expr(expr) {
                    return Err(FemtoError::Tool(format!(
                        "Invalid or non-runnable cron expression '{}'",
                        expr
                    )));
                }
                (
                    CronSchedule::Cron {
                        expr: expr.to_string(),
                    },
                    false,
                )
            }
            (None, None, Some(at)) => (
                CronSchedule::At {
                    at_ms: parse_at_datetime_ms(at)?,
                },
                true,
            ),
            _ => {
                return Err(FemtoError::Tool(
                    "Specify exactly one of: every_seconds, cron_expr, at".to_string(),
                ))
            }
        };

        let channel = args
            .get("channel")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| ctx.channel.clone())
            .ok_or_else(|| FemtoError::Tool("No channel available in tool context".into()))?;

        let chat_id = args
            .get("chat_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| ctx.chat_id.clone())
            .ok_or_else(|| FemtoError::Tool("No chat_id available in tool context".into()))?;

        let job = self
            .cron
            .add_job(
                name,
                schedule,
                CronPayload::new(message, &channel, &chat_id),
                delete_after_run,
            )
            .await?;

        Ok(format!("Created cron job '{}' (id: {})", job.name, job.id))
    }

    async fn execute_list(&self, args: &Value) -> Result<String> {
        let include_disabled = args
            .get("include_disabled")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let jobs = self.cron.list_jobs(include_disabled).await;
        if jobs.is_empty() {
            return Ok("No scheduled jobs".to_string());
        }

        let lines: Vec<String> = jobs
            .iter()
            .map(|job| {
                format!(
                    "- {} [{}] {} -> {}:{}{}",
                    job.name,
                    job.id,
                    job.schedule,
                    job.payload.channel,
                    job.payload.chat_id,
                    if job.enabled { "" } else { " (disabled)" }
                )
            })
            .collect();
        Ok(format!("Scheduled jobs:\n{}", lines.join("\n")))
    }

    async fn execute_remove(&self, args: &Value) -> Result<String> {
        let job_id = args
            .get("job_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FemtoError::Tool("Missing 'job_id' for cron remove".into()))?;

        if self.cron.remove_job(job_id).await? {
            Ok(format!("Removed cron job {}", job_id))
        } else {
            Ok(format!("Cron job {} not found", job_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBus;
    use tempfile::tempdir;

    fn tool(dir: &std::path::Path) -> (CronTool, Arc<CronService>) {
        let service = Arc::new(CronService::new(
            dir.join("jobs.json"),
            Arc::new(MessageBus::new()),
        ));
        (CronTool::new(service.clone()), service)
    }

    #[tokio::test]
    async fn test_add_targets_current_conversation() {
        let temp = tempdir().unwrap();
        let (tool, service) = tool(temp.path());
        let ctx = ToolContext::new().with_channel("telegram", "99");

        let out = tool
            .execute(
                json!({"action": "add", "message": "stretch", "every_seconds": 3600}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(out.starts_with("Created cron job 'stretch'"));

        let jobs = service.list_jobs(true).await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].payload.channel, "telegram");
        assert_eq!(jobs[0].payload.chat_id, "99");
        assert_eq!(jobs[0].schedule, CronSchedule::Every { every_ms: 3_600_000 });
    }

    #[tokio::test]
    async fn test_add_at_is_one_shot() {
        let temp = tempdir().unwrap();
        let (tool, service) = tool(temp.path());
        let ctx = ToolContext::new().with_channel("cli", "direct");

        tool.execute(
            json!({"action": "add", "message": "call mom", "at": "2030-01-01T10:00:00Z"}),
            &ctx,
        )
        .await
        .unwrap();

        let job = &service.list_jobs(true).await[0];
        assert!(job.delete_after_run);
        assert!(matches!(job.schedule, CronSchedule::At { .. }));
    }

    #[tokio::test]
    async fn test_add_requires_exactly_one_schedule() {
        let temp = tempdir().unwrap();
        let (tool, _service) = tool(temp.path());
        let ctx = ToolContext::new().with_channel("cli", "direct");

        let err = tool
            .execute(
                json!({"action": "add", "message": "x", "every_seconds": 5, "cron_expr": "* * * * *"}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exactly one"));

        let err = tool
            .execute(json!({"action": "add", "message": "x"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exactly one"));
    }

    #[tokio::test]
    async fn test_add_rejects_interval_that_overflows() {
        let temp = tempdir().unwrap();
        let (tool, service) = tool(temp.path());
        let ctx = ToolContext::new().with_channel("cli", "direct");
        let err = tool
            .execute(
                json!({"action": "add", "message": "x", "every_seconds": i64::MAX}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("too large"));
        assert!(service.list_jobs(true).await.is_empty());
    }

    #[tokio::test]
    async fn test_add_rejects_bad_cron_expr() {
        let temp = tempdir().unwrap();
        let (tool, _service) = tool(temp.path());
        let ctx = ToolContext::new().with_channel("cli", "direct");
        let err = tool
            .execute(
                json!({"action": "add", "message": "x", "cron_expr": "99 * * * *"}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid or non-runnable"));
    }

    #[tokio::test]
    async fn test_list_and_remove() {
        let temp = tempdir().unwrap();
        let (tool, service) = tool(temp.path());
        let ctx = ToolContext::new().with_channel("cli", "direct");

        assert_eq!(
            tool.execute(json!({"action": "list"}), &ctx).await.unwrap(),
            "No scheduled jobs"
        );

        tool.execute(
            json!({"action": "add", "message": "water plants", "name": "plants", "cron_expr": "0 8 * * *"}),
            &ctx,
        )
        .await
        .unwrap();
        let listing = tool.execute(json!({"action": "list"}), &ctx).await.unwrap();
        assert!(listing.contains("plants"));
        assert!(listing.contains("cron(0 8 * * *)"));

        let id = service.list_jobs(true).await[0].id.clone();
        let out = tool
            .execute(json!({"action": "remove", "job_id": id}), &ctx)
            .await
            .unwrap();
        assert!(out.starts_with("Removed cron job"));
        let out = tool
            .execute(json!({"action": "remove", "job_id": "nope"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out, "Cron job nope not found");
    }
}
