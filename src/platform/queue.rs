use async_trait::async_trait;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{IntegrationError, Result};

/// Payload of a project import job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProjectJob {
    pub group_id: u64,
    pub project_id: u64,
    pub name: String,
    pub description: Option<String>,
    pub web_url: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum QueuedJob {
    ImportProject(ImportProjectJob),
    Backfill,
}

impl QueuedJob {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ImportProject(_) => "import-project",
            Self::Backfill => "backfill",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStats {
    pub success: u32,
    pub in_progress: u32,
    pub failed: u32,
}

impl std::ops::AddAssign for JobStats {
    fn add_assign(&mut self, other: Self) {
        self.success += other.success;
        self.in_progress += other.in_progress;
        self.failed += other.failed;
    }
}

/// Fire-and-forget job submission with best-effort status.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Returns the id of the queued job.
    async fn push(&self, job: QueuedJob, delay: Option<Duration>) -> Result<String>;

    /// Unknown ids report empty stats.
    async fn get_stats(&self, job_id: &str) -> Result<JobStats>;

    /// Drop the stats of jobs nobody will ask about again.
    async fn forget(&self, job_ids: &[String]) -> Result<()>;
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: QueuedJob) -> Result<()>;
}

type StatsTable = Arc<Mutex<HashMap<String, JobStats>>>;

struct Envelope {
    id: String,
    job: QueuedJob,
}

/// In-process queue. Jobs are held in a channel and executed by
/// [`JobReceiver::run`]; nothing survives a restart.
pub struct LocalQueue {
    sender: mpsc::UnboundedSender<Envelope>,
    stats: StatsTable,
    next_id: AtomicU64,
}

/// Consuming half of a [`LocalQueue`].
pub struct JobReceiver {
    receiver: mpsc::UnboundedReceiver<Envelope>,
    stats: StatsTable,
}

fn record(stats: &StatsTable, id: &str, value: JobStats) {
    if let Ok(mut table) = stats.lock() {
        table.insert(id.to_string(), value);
    }
}

impl LocalQueue {
    pub fn new() -> (Self, JobReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let stats = StatsTable::default();
        (
            Self {
                sender,
                stats: Arc::clone(&stats),
                next_id: AtomicU64::new(1),
            },
            JobReceiver { receiver, stats },
        )
    }
}

#[async_trait]
impl JobQueue for LocalQueue {
    async fn push(&self, job: QueuedJob, delay: Option<Duration>) -> Result<String> {
        let id = format!("job-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        record(
            &self.stats,
            &id,
            JobStats {
                in_progress: 1,
                ..JobStats::default()
            },
        );

        debug!("Queued {} job {id} (delay {:?})", job.kind(), delay);
        let envelope = Envelope { id: id.clone(), job };

        match delay.filter(|d| !d.is_zero()) {
            Some(delay) => {
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if sender.send(envelope).is_err() {
                        error!("Job queue closed before delayed job could be delivered");
                    }
                });
            }
            None => self
                .sender
                .send(envelope)
                .map_err(|_| IntegrationError::Queue("Job queue is closed".to_string()))?,
        }

        Ok(id)
    }

    async fn get_stats(&self, job_id: &str) -> Result<JobStats> {
        let table = self
            .stats
            .lock()
            .map_err(|e| IntegrationError::Queue(e.to_string()))?;
        Ok(table.get(job_id).copied().unwrap_or_default())
    }

    async fn forget(&self, job_ids: &[String]) -> Result<()> {
        let mut table = self
            .stats
            .lock()
            .map_err(|e| IntegrationError::Queue(e.to_string()))?;
        for id in job_ids {
            table.remove(id);
        }
        Ok(())
    }
}

impl JobReceiver {
    /// Run jobs until every sender is dropped. Each job runs on its own task.
    pub async fn run(mut self, handler: Arc<dyn JobHandler>) {
        info!("Job worker started");
        while let Some(Envelope { id, job }) = self.receiver.recv().await {
            let handler = Arc::clone(&handler);
            let stats = Arc::clone(&self.stats);
            tokio::spawn(async move {
                let kind = job.kind();
                let outcome = match handler.handle(job).await {
                    Ok(()) => {
                        debug!("Job {id} ({kind}) finished");
                        JobStats {
                            success: 1,
                            ..JobStats::default()
                        }
                    }
                    Err(e) => {
                        error!("Job {id} ({kind}) failed: {e}");
                        JobStats {
                            failed: 1,
                            ..JobStats::default()
                        }
                    }
                };
                record(&stats, &id, outcome);
            });
        }
        info!("Job worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingImports;

    #[async_trait]
    impl JobHandler for FailingImports {
        async fn handle(&self, job: QueuedJob) -> Result<()> {
            match job {
                QueuedJob::ImportProject(_) => Err(IntegrationError::Compass("boom".to_string())),
                QueuedJob::Backfill => Ok(()),
            }
        }
    }

    fn import_job(project_id: u64) -> QueuedJob {
        QueuedJob::ImportProject(ImportProjectJob {
            group_id: 1,
            project_id,
            name: "billing".to_string(),
            description: None,
            web_url: "https://gitlab.com/platform/billing".to_string(),
            labels: Vec::new(),
        })
    }

    async fn wait_until_settled(queue: &LocalQueue, id: &str) -> JobStats {
        for _ in 0..100 {
            let stats = queue.get_stats(id).await.unwrap();
            if stats.in_progress == 0 {
                return stats;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {id} never settled");
    }

    #[tokio::test]
    async fn stats_follow_job_outcome() {
        let (queue, receiver) = LocalQueue::new();
        tokio::spawn(receiver.run(Arc::new(FailingImports)));

        let backfill = queue.push(QueuedJob::Backfill, None).await.unwrap();
        let import = queue.push(import_job(5), None).await.unwrap();
        assert_ne!(backfill, import);

        assert_eq!(wait_until_settled(&queue, &backfill).await.success, 1);
        assert_eq!(wait_until_settled(&queue, &import).await.failed, 1);
    }

    #[tokio::test]
    async fn queued_job_is_in_progress_until_run() {
        let (queue, _receiver) = LocalQueue::new();
        let id = queue.push(QueuedJob::Backfill, None).await.unwrap();
        let stats = queue.get_stats(&id).await.unwrap();
        assert_eq!(stats.in_progress, 1);
        assert_eq!(queue.get_stats("job-unknown").await.unwrap(), JobStats::default());
    }

    #[tokio::test]
    async fn forgotten_jobs_leave_the_stats_table() {
        let (queue, _receiver) = LocalQueue::new();
        let first = queue.push(QueuedJob::Backfill, None).await.unwrap();
        let second = queue.push(QueuedJob::Backfill, None).await.unwrap();

        queue.forget(std::slice::from_ref(&first)).await.unwrap();
        assert_eq!(queue.stats.lock().unwrap().len(), 1);
        assert_eq!(queue.get_stats(&first).await.unwrap(), JobStats::default());
        assert_eq!(queue.get_stats(&second).await.unwrap().in_progress, 1);
    }

    #[test]
    fn job_payload_is_tagged() {
        let value = serde_json::to_value(import_job(9)).unwrap();
        assert_eq!(value["kind"], "import-project");
        assert_eq!(value["projectId"], 9);

        let mut total = JobStats::default();
        total += JobStats { success: 2, in_progress: 1, failed: 0 };
        total += JobStats { success: 1, in_progress: 0, failed: 3 };
        assert_eq!(total, JobStats { success: 3, in_progress: 1, failed: 3 });
    }
}
