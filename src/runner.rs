//! Single-worker bridge between request handlers and the tool collection
//!
//! Handlers submit jobs over a channel and await a oneshot reply. One worker
//! owns the collection and runs jobs strictly one after another, so input
//! injection against the desktop never interleaves.

use crate::tools::{ToolCollection, ToolResult};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

const QUEUE_CAPACITY: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("tool runner is not running")]
    Closed,
}

struct Job {
    name: String,
    input: Value,
    reply: oneshot::Sender<ToolResult>,
}

pub struct ToolRunner;

impl ToolRunner {
    /// Spawn the worker on the current runtime. It exits once every handle is dropped.
    pub fn spawn(tools: ToolCollection) -> RunnerHandle {
        let (tx, mut rx) = mpsc::channel::<Job>(QUEUE_CAPACITY);

        tokio::spawn(async move {
            tracing::debug!(?tools, "Tool runner started");
            while let Some(job) = rx.recv().await {
                let result = tools.run(&job.name, job.input).await;
                if job.reply.send(result).is_err() {
                    tracing::warn!(tool = %job.name, "Caller went away before the result was ready");
                }
            }
            tracing::debug!("Tool runner stopped");
        });

        RunnerHandle { tx }
    }
}

#[derive(Debug, Clone)]
pub struct RunnerHandle {
    tx: mpsc::Sender<Job>,
}

impl RunnerHandle {
    pub async fn run(&self, name: &str, input: Value) -> Result<ToolResult, RunnerError> {
        let (reply, rx) = oneshot::channel();
        let job = Job {
            name: name.to_string(),
            input,
            reply,
        };

        self.tx.send(job).await.map_err(|_| RunnerError::Closed)?;
        rx.await.map_err(|_| RunnerError::Closed)
    }

    /// Handle whose worker is already gone
    #[cfg(test)]
    pub(crate) fn closed() -> Self {
        let (tx, _) = mpsc::channel(1);
        Self { tx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::echo_collection;
    use crate::tools::{Tool, ToolError};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_through_worker() {
        let runner = ToolRunner::spawn(echo_collection());
        let result = runner.run("computer", json!({ "action": "left_click" })).await.unwrap();
        assert_eq!(result.output.as_deref(), Some("left_click"));

        let result = runner.run("missing", json!({})).await.unwrap();
        assert_eq!(result.error.as_deref(), Some("Tool missing is invalid"));
    }

    #[tokio::test]
    async fn test_closed_runner_is_error() {
        let runner = RunnerHandle::closed();
        let err = runner.run("computer", json!({ "action": "left_click" })).await.unwrap_err();
        assert!(matches!(err, RunnerError::Closed));
        assert_eq!(err.to_string(), "tool runner is not running");
    }

    /// Records the highest number of calls in flight at once
    struct SlowTool {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn to_params(&self) -> Value {
            json!({ "name": "slow" })
        }

        async fn call(&self, _input: Value) -> Result<ToolResult, ToolError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(ToolResult::default())
        }
    }

    #[tokio::test]
    async fn test_jobs_never_overlap() {
        let peak = Arc::new(AtomicUsize::new(0));
        let tool = SlowTool {
            active: Arc::new(AtomicUsize::new(0)),
            peak: peak.clone(),
        };
        let runner = ToolRunner::spawn(ToolCollection::new(vec![Box::new(tool)]));

        let calls: Vec<_> = (0..4)
            .map(|_| {
                let runner = runner.clone();
                tokio::spawn(async move { runner.run("slow", json!({})).await })
            })
            .collect();
        for call in calls {
            call.await.unwrap().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
