//! Strictly sequential background job runner.
//!
//! Persistence work (scratch-file appends, metadata writes) is queued here so it
//! never runs concurrently with itself: one runner task executes jobs in FIFO
//! order, one at a time. A failing job is logged and the runner moves on.
//!
//! `stop` closes the queue and gives the runner a bounded drain window. Jobs
//! still unexecuted when the window closes are surfaced by label and counted in
//! the returned error, so data loss is never silent.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{DaqError, DaqResult};

struct Job {
    label: String,
    work: BoxFuture<'static, anyhow::Result<()>>,
}

/// Handle to the runner task.
pub struct TaskScheduler {
    job_tx: Option<mpsc::Sender<Job>>,
    pending: Arc<Mutex<VecDeque<String>>>,
    task: Option<JoinHandle<()>>,
    stop_timeout: Duration,
}

impl TaskScheduler {
    /// Spawns the runner with a bounded queue. `schedule` applies backpressure
    /// to its caller once `queue_capacity` jobs are waiting.
    pub fn new(queue_capacity: usize, stop_timeout: Duration) -> Self {
        let (job_tx, mut job_rx) = mpsc::channel::<Job>(queue_capacity);
        let pending = Arc::new(Mutex::new(VecDeque::new()));

        let pending_in_task = pending.clone();
        let task = tokio::spawn(async move {
            info!("Task scheduler started");
            while let Some(job) = job_rx.recv().await {
                debug!("Running job '{}'", job.label);
                if let Err(e) = job.work.await {
                    error!("Job '{}' failed: {}", job.label, e);
                }
                if let Ok(mut pending) = pending_in_task.lock() {
                    pending.pop_front();
                }
            }
            info!("Task scheduler drained");
        });

        Self {
            job_tx: Some(job_tx),
            pending,
            task: Some(task),
            stop_timeout,
        }
    }

    /// Whether the queue still accepts jobs.
    pub fn is_running(&self) -> bool {
        self.job_tx.is_some()
    }

    /// Number of jobs queued or currently executing.
    pub fn pending_jobs(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }

    /// Enqueues one labelled job. Jobs run in submission order, one at a time.
    pub async fn schedule<F>(&self, label: &str, work: F) -> DaqResult<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let Some(job_tx) = self.job_tx.as_ref() else {
            return Err(DaqError::ManagerNotRunning);
        };
        let job = Job {
            label: label.to_string(),
            work: Box::pin(work),
        };
        if let Ok(mut pending) = self.pending.lock() {
            pending.push_back(job.label.clone());
        }
        if job_tx.send(job).await.is_err() {
            if let Ok(mut pending) = self.pending.lock() {
                pending.pop_back();
            }
            return Err(DaqError::ManagerNotRunning);
        }
        Ok(())
    }

    /// Closes the queue, waits up to the drain timeout for queued jobs to
    /// finish, and reports whatever had to be abandoned.
    ///
    /// Safe to call more than once; `schedule` fails with `ManagerNotRunning`
    /// from the first call on.
    pub async fn stop(&mut self) -> DaqResult<()> {
        drop(self.job_tx.take());
        let Some(mut task) = self.task.take() else {
            return Ok(());
        };
        match tokio::time::timeout(self.stop_timeout, &mut task).await {
            Ok(Ok(())) => {
                info!("Task scheduler stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Task scheduler panicked during shutdown: {}", e);
                self.report_abandoned()
            }
            Err(_) => {
                warn!(
                    "Task scheduler did not drain within {:?}, aborting",
                    self.stop_timeout
                );
                task.abort();
                self.report_abandoned()
            }
        }
    }

    fn report_abandoned(&self) -> DaqResult<()> {
        let abandoned: Vec<String> = self
            .pending
            .lock()
            .map(|pending| pending.iter().cloned().collect())
            .unwrap_or_default();
        if abandoned.is_empty() {
            return Ok(());
        }
        for label in &abandoned {
            warn!("Abandoning queued job '{}'", label);
        }
        Err(DaqError::JobsAbandoned {
            count: abandoned.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[tokio::test]
    async fn test_jobs_run_in_submission_order() {
        let mut scheduler = TaskScheduler::new(8, Duration::from_secs(2));
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            scheduler
                .schedule(&format!("job {}", i), async move {
                    order.lock().unwrap().push(i);
                    Ok(())
                })
                .await
                .unwrap();
        }
        scheduler.stop().await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(scheduler.pending_jobs(), 0);
    }

    #[tokio::test]
    async fn test_failing_job_does_not_kill_the_runner() {
        let mut scheduler = TaskScheduler::new(8, Duration::from_secs(2));
        let ran = Arc::new(Mutex::new(false));

        scheduler
            .schedule("doomed", async { Err(anyhow!("disk on fire")) })
            .await
            .unwrap();
        let ran_in_job = ran.clone();
        scheduler
            .schedule("survivor", async move {
                *ran_in_job.lock().unwrap() = true;
                Ok(())
            })
            .await
            .unwrap();
        scheduler.stop().await.unwrap();

        assert!(*ran.lock().unwrap());
    }

    #[tokio::test]
    async fn test_schedule_after_stop_is_rejected() {
        let mut scheduler = TaskScheduler::new(8, Duration::from_secs(2));
        scheduler.stop().await.unwrap();

        let result = scheduler.schedule("late", async { Ok(()) }).await;
        assert!(matches!(result, Err(DaqError::ManagerNotRunning)));

        // A second stop is harmless.
        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_undrained_jobs_are_surfaced() {
        let mut scheduler = TaskScheduler::new(8, Duration::from_millis(50));

        scheduler
            .schedule("stuck", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await
            .unwrap();
        scheduler
            .schedule("starved", async { Ok(()) })
            .await
            .unwrap();

        let result = scheduler.stop().await;
        assert!(matches!(result, Err(DaqError::JobsAbandoned { count: 2 })));
    }
}
