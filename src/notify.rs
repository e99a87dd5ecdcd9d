//! Owner notification queue
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::certificate::certificate_path;
use super::error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailJob {
    pub violation_id: String,
    pub truck_identity: String,
    pub recipient: String,
}

#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, job: &MailJob) -> anyhow::Result<()>;
}

/// Records the mail instead of delivering it.
#[derive(Debug, Clone)]
pub struct LogMailer {
    certificate_dir: PathBuf,
}

impl LogMailer {
    pub fn new(certificate_dir: impl Into<PathBuf>) -> Self {
        Self {
            certificate_dir: certificate_dir.into(),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, job: &MailJob) -> anyhow::Result<()> {
        let attachment = certificate_path(&self.certificate_dir, &job.violation_id);
        info!(
            recipient = %job.recipient,
            truck = %job.truck_identity,
            attachment = %attachment.display(),
            "violation notice mailed"
        );
        Ok(())
    }
}

/// Sending half of the queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::Sender<MailJob>,
}

impl Notifier {
    /// A queue of `capacity` jobs. The receiver belongs to whoever drains it.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<MailJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Waits for room when the queue is full.
    pub async fn enqueue(&self, job: MailJob) -> Result<(), ApiError> {
        self.tx
            .send(job)
            .await
            .map_err(|_| ApiError::internal("notification queue closed", "worker stopped"))
    }

    /// Drops the job when the queue is full. Returns whether it was queued.
    pub fn try_enqueue(&self, job: MailJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                warn!(violation_id = %job.violation_id, "notification queue full, job dropped");
                false
            }
            Err(TrySendError::Closed(job)) => {
                warn!(violation_id = %job.violation_id, "notification queue closed, job dropped");
                false
            }
        }
    }
}

/// A queue of `capacity` jobs drained by one worker task. The worker ends
/// once every `Notifier` clone is dropped.
pub fn spawn_worker(capacity: usize, mailer: Arc<dyn Mailer>) -> (Notifier, JoinHandle<()>) {
    let (notifier, mut rx) = Notifier::channel(capacity);
    let handle = tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            if let Err(err) = mailer.send(&job).await {
                error!(violation_id = %job.violation_id, error = %err, "failed to send violation notice");
            }
        }
        info!("notification worker stopped");
    });
    (notifier, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<MailJob>>,
    }

    #[async_trait]
    impl Mailer for Recorder {
        async fn send(&self, job: &MailJob) -> anyhow::Result<()> {
            self.sent.lock().await.push(job.clone());
            Ok(())
        }
    }

    fn job(n: usize) -> MailJob {
        MailJob {
            violation_id: format!("viol{n}"),
            truck_identity: "TR-01".into(),
            recipient: "owner@example.com".into(),
        }
    }

    #[tokio::test]
    async fn worker_drains_queue_in_order() {
        let recorder = Arc::new(Recorder::default());
        let (notifier, handle) = spawn_worker(4, recorder.clone());
        for n in 0..3 {
            notifier.enqueue(job(n)).await.unwrap();
        }
        drop(notifier);
        handle.await.unwrap();

        let sent = recorder.sent.lock().await;
        assert_eq!(*sent, vec![job(0), job(1), job(2)]);
    }

    #[tokio::test]
    async fn try_enqueue_drops_when_full() {
        // no worker: nothing drains the channel
        let (notifier, _rx) = Notifier::channel(1);
        assert!(notifier.try_enqueue(job(0)));
        assert!(!notifier.try_enqueue(job(1)));
    }
}
