use std::collections::HashSet;
use std::sync::Arc;

use futures_util::{stream, StreamExt};
use serde::Serialize;

use crate::{RunOutcome, SelectError, SelectResult, SelectTask};

/// Most per-task detail lines kept in a summary
pub const SUMMARY_DETAIL_LIMIT: usize = 20;

/// Run `tasks` with at most `limit` in flight, returning outcomes in input
/// order.
///
/// Tasks writing to the same scratch path would clobber each other, so such
/// a batch is rejected before anything runs.
pub async fn run_all(tasks: Vec<Arc<SelectTask>>, limit: usize) -> SelectResult<Vec<RunOutcome>> {
    let mut paths = HashSet::new();
    for task in &tasks {
        let path = &task.params().scratch_path;
        if !paths.insert(path.clone()) {
            return Err(SelectError::invalid(format!(
                "scratch path {} is shared by more than one task",
                path.display()
            )));
        }
    }

    let outcomes: Vec<RunOutcome> = stream::iter(tasks)
        .map(|task| async move { task.run_task().await })
        .buffered(limit.max(1))
        .collect()
        .await;

    Ok(outcomes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStatus {
    Success,
    Fail,
}

/// Human-readable roll-up of a batch of outcomes
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeSummary {
    pub status: SummaryStatus,
    pub success: usize,
    pub total: usize,
    pub messages: Vec<String>,
}

impl OutcomeSummary {
    /// Summarize `outcomes`. Failures are always listed first-come up to the
    /// detail limit; successes are omitted when the list would be truncated
    /// and at least one failure exists.
    ///
    /// Fails if an outcome's parameters or receipt cannot be rendered as JSON.
    pub fn from_outcomes(name: &str, outcomes: &[RunOutcome]) -> SelectResult<Self> {
        let truncated = outcomes.len() > SUMMARY_DETAIL_LIMIT;
        let has_error = outcomes.iter().any(|o| o.error.is_some());

        let mut details = Vec::new();
        let mut success = 0;

        for outcome in outcomes {
            let params = serde_json::to_string(&outcome.params)?;
            match (&outcome.result, &outcome.error) {
                (_, Some(error)) => {
                    if details.len() < SUMMARY_DETAIL_LIMIT {
                        details.push(format!(
                            "TaskStatus: fail\nParams: {}\nAttempts: {}\nError: {}",
                            params, outcome.attempts, error
                        ));
                    }
                }
                (result, None) => {
                    if details.len() < SUMMARY_DETAIL_LIMIT && !(truncated && has_error) {
                        let result = serde_json::to_string(result)?;
                        details.push(format!("TaskStatus: success\nParams: {}\nResult: {}", params, result));
                    }
                    success += 1;
                }
            }
        }

        let total = outcomes.len();
        let status = if success < total {
            SummaryStatus::Fail
        } else {
            SummaryStatus::Success
        };
        let headline = format!(
            "Result: {} {}\nsuccess: {}\ntotal: {}",
            name,
            if status == SummaryStatus::Success { "success" } else { "fail" },
            success,
            total
        );

        let mut messages = Vec::with_capacity(details.len() + 1);
        messages.push(headline);
        messages.extend(details);

        Ok(Self {
            status,
            success,
            total,
            messages,
        })
    }
}
