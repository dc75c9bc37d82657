//! Email masking and delayed restoration.
//!
//! A renewal order gets its customer's email swapped for a throwaway
//! placeholder so the platform's order notification goes nowhere, then the
//! original address is written back after a fixed delay.
//!
//! ## Limitations
//!
//! Pending restores live only in memory. A graceful shutdown fires them
//! early, but a crash or kill between the two calls leaves the placeholder
//! on the customer record, and a failed restore is logged without retry.
//! The `restore_failed` log line carries the customer id and original email
//! so the record can be fixed by hand.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn, Level};

use crate::error::WebhookError;
use crate::order::{ResourceId, SuppressionTarget};
use crate::shopify::CustomerApi;

const PLACEHOLDER_PREFIX: &str = "suppressed-";
const PLACEHOLDER_DOMAIN: &str = "noemail.fake";

/// Placeholder address for a given unix time in milliseconds.
///
/// Shopify enforces unique customer emails, so the timestamp keeps
/// concurrent placeholders apart.
pub fn placeholder_email(now_millis: u128) -> String {
    format!("{}{}@{}", PLACEHOLDER_PREFIX, now_millis, PLACEHOLDER_DOMAIN)
}

pub fn placeholder_email_now() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    placeholder_email(millis)
}

/// One mask-then-restore cycle for a single customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressionTask {
    pub order_id: Option<ResourceId>,
    pub customer_id: ResourceId,
    pub original_email: String,
    pub delay: Duration,
}

impl SuppressionTask {
    pub fn new(target: SuppressionTarget, delay: Duration) -> Self {
        Self {
            order_id: target.order_id,
            customer_id: target.customer_id,
            original_email: target.original_email,
            delay,
        }
    }

    fn order_ref(&self) -> String {
        self.order_id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Runs mask-then-restore cycles and keeps track of the ones still running.
///
/// Every cycle, including its masking call, lives in one `JoinSet`, so
/// [`RestoreScheduler::shutdown`] sees work that has not reached its restore
/// yet. Cloning yields another handle to the same set of tasks.
#[derive(Clone)]
pub struct RestoreScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<JoinSet<()>>,
}

impl RestoreScheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(SchedulerInner {
                shutdown_tx,
                tasks: Mutex::new(JoinSet::new()),
            }),
        }
    }

    /// Whether new cycles can still be submitted.
    pub fn is_accepting(&self) -> bool {
        !*self.inner.shutdown_tx.borrow()
    }

    /// Number of cycles that have not completed yet.
    pub async fn pending(&self) -> usize {
        let mut tasks = self.inner.tasks.lock().await;
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    /// Start the mask-then-restore cycle for `task` in the background.
    ///
    /// Fails once shutdown has begun; the check and the spawn happen under
    /// the same lock `shutdown` takes, so no cycle can slip past the drain.
    pub async fn submit(
        &self,
        api: Arc<dyn CustomerApi>,
        task: SuppressionTask,
    ) -> Result<(), WebhookError> {
        // Fail fast while a drain holds the lock, then check again under it.
        if !self.is_accepting() {
            return Err(shutting_down());
        }
        let mut tasks = self.inner.tasks.lock().await;
        if !self.is_accepting() {
            return Err(shutting_down());
        }

        // Reap finished cycles so the set does not grow unbounded.
        while tasks.try_join_next().is_some() {}

        let shutdown_rx = self.inner.shutdown_tx.subscribe();
        tasks.spawn(run_suppression(api, task, shutdown_rx));

        debug!(pending = tasks.len(), "suppression_submitted");

        Ok(())
    }

    /// Stop accepting work and finish every running cycle now.
    ///
    /// Cycles still waiting on their delay restore immediately; cycles whose
    /// masking call is in flight restore as soon as it returns. Returns once
    /// all of them have finished.
    pub async fn shutdown(&self) {
        self.inner.shutdown_tx.send_replace(true);

        let mut tasks = self.inner.tasks.lock().await;
        let pending = tasks.len();
        info!(pending = pending, "restore_scheduler_draining");

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "suppression_task_panicked");
            }
        }

        info!("restore_scheduler_drained");
    }
}

fn shutting_down() -> WebhookError {
    WebhookError::Unavailable("restore scheduler is shutting down".to_string())
}

/// Write the original email back. Failures are terminal and only logged.
async fn restore_email(api: &dyn CustomerApi, task: &SuppressionTask) {
    match api
        .update_email(&task.customer_id, &task.original_email)
        .await
    {
        Ok(()) => {
            info!(
                order_id = %task.order_ref(),
                customer_id = %task.customer_id,
                "email_restored"
            );
        }
        Err(e) => {
            error!(
                order_id = %task.order_ref(),
                customer_id = %task.customer_id,
                original_email = %task.original_email,
                error = %e,
                "restore_failed"
            );
        }
    }
}

/// Mask the customer's email, wait out the delay, then restore it.
///
/// If masking fails nothing is restored and the record is left as it was.
/// A shutdown signal cuts the delay short.
async fn run_suppression(
    api: Arc<dyn CustomerApi>,
    task: SuppressionTask,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    // Give the webhook response a head start on the masking call.
    tokio::task::yield_now().await;

    let order_id = task.order_ref();

    if tracing::enabled!(Level::DEBUG) {
        match api.fetch_customer(&task.customer_id).await {
            Ok(customer) => {
                debug!(customer_id = %task.customer_id, customer = %customer, "customer_fetched")
            }
            Err(e) => {
                debug!(customer_id = %task.customer_id, error = %e, "customer_fetch_failed")
            }
        }
    }

    let placeholder = placeholder_email_now();
    if let Err(e) = api.update_email(&task.customer_id, &placeholder).await {
        error!(
            order_id = %order_id,
            customer_id = %task.customer_id,
            error = %e,
            "suppress_failed"
        );
        return;
    }

    info!(
        order_id = %order_id,
        customer_id = %task.customer_id,
        placeholder = %placeholder,
        restore_delay_ms = task.delay.as_millis() as u64,
        "email_suppressed"
    );

    let stopping = async move {
        let _ = shutdown_rx.wait_for(|stopping| *stopping).await;
    };

    tokio::select! {
        _ = tokio::time::sleep(task.delay) => {}
        _ = stopping => {
            warn!(order_id = %order_id, customer_id = %task.customer_id, "restore_expedited_for_shutdown");
        }
    }

    restore_email(api.as_ref(), &task).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Semaphore;
    use tokio::time::Instant;

    use crate::error::RemoteCallError;

    #[derive(Default)]
    struct RecordingApi {
        updates: StdMutex<Vec<(String, Instant)>>,
        suppress_gate: Option<Semaphore>,
        fail_suppress: bool,
        fail_restore: bool,
    }

    impl RecordingApi {
        fn emails(&self) -> Vec<String> {
            self.updates
                .lock()
                .unwrap()
                .iter()
                .map(|(email, _)| email.clone())
                .collect()
        }
    }

    #[async_trait]
    impl CustomerApi for RecordingApi {
        async fn fetch_customer(
            &self,
            _customer_id: &ResourceId,
        ) -> Result<serde_json::Value, RemoteCallError> {
            Ok(serde_json::json!({}))
        }

        async fn update_email(
            &self,
            _customer_id: &ResourceId,
            email: &str,
        ) -> Result<(), RemoteCallError> {
            let is_placeholder = email.starts_with(PLACEHOLDER_PREFIX);
            if is_placeholder {
                if let Some(gate) = &self.suppress_gate {
                    gate.acquire().await.unwrap().forget();
                }
            }

            self.updates
                .lock()
                .unwrap()
                .push((email.to_string(), Instant::now()));

            if (is_placeholder && self.fail_suppress) || (!is_placeholder && self.fail_restore) {
                return Err(RemoteCallError::Status {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    fn task(delay: Duration) -> SuppressionTask {
        SuppressionTask {
            order_id: Some(ResourceId::Number(1)),
            customer_id: ResourceId::Number(55),
            original_email: "a@x.com".to_string(),
            delay,
        }
    }

    /// Let spawned cycles run up to their next timer.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[test]
    fn test_placeholder_email_format() {
        assert_eq!(
            placeholder_email(1_700_000_000_123),
            "suppressed-1700000000123@noemail.fake"
        );

        let now = placeholder_email_now();
        let digits = now
            .strip_prefix("suppressed-")
            .and_then(|rest| rest.strip_suffix("@noemail.fake"))
            .unwrap();
        assert!(!digits.is_empty());
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_waits_for_delay() {
        let api = Arc::new(RecordingApi::default());
        let scheduler = RestoreScheduler::new();
        let started = Instant::now();

        scheduler
            .submit(api.clone(), task(Duration::from_secs(8)))
            .await
            .unwrap();
        settle().await;

        let emails = api.emails();
        assert_eq!(emails.len(), 1);
        assert!(emails[0].starts_with("suppressed-"));
        assert_ne!(emails[0], "a@x.com");
        assert_eq!(scheduler.pending().await, 1);

        tokio::time::sleep(Duration::from_millis(7_900)).await;
        assert_eq!(api.emails().len(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let updates = api.updates.lock().unwrap().clone();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].0, "a@x.com");
        assert!(updates[1].1 - started >= Duration::from_secs(8));

        assert_eq!(scheduler.pending().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_suppress_schedules_nothing() {
        let api = Arc::new(RecordingApi {
            fail_suppress: true,
            ..Default::default()
        });
        let scheduler = RestoreScheduler::new();

        scheduler
            .submit(api.clone(), task(Duration::from_secs(8)))
            .await
            .unwrap();
        settle().await;
        assert_eq!(scheduler.pending().await, 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.emails().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_restore_is_not_retried() {
        let api = Arc::new(RecordingApi {
            fail_restore: true,
            ..Default::default()
        });
        let scheduler = RestoreScheduler::new();

        scheduler
            .submit(api.clone(), task(Duration::from_secs(8)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(api.emails().len(), 2);
        assert_eq!(scheduler.pending().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_fires_pending_restores() {
        let api = Arc::new(RecordingApi::default());
        let scheduler = RestoreScheduler::new();
        let started = Instant::now();

        scheduler
            .submit(api.clone(), task(Duration::from_secs(8)))
            .await
            .unwrap();
        settle().await;
        scheduler.shutdown().await;

        let updates = api.updates.lock().unwrap().clone();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].0, "a@x.com");
        assert!(updates[1].1 - started < Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_in_flight_suppress() {
        let api = Arc::new(RecordingApi {
            suppress_gate: Some(Semaphore::new(0)),
            ..Default::default()
        });
        let scheduler = RestoreScheduler::new();
        let started = Instant::now();

        scheduler
            .submit(api.clone(), task(Duration::from_secs(8)))
            .await
            .unwrap();
        settle().await;
        assert!(api.emails().is_empty());

        let drain = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.shutdown().await }
        });
        settle().await;
        assert!(!drain.is_finished());
        assert!(!scheduler.is_accepting());

        // Arriving mid-drain is refused without waiting on the drain.
        let late: Arc<dyn CustomerApi> = Arc::new(RecordingApi::default());
        assert!(matches!(
            scheduler.submit(late, task(Duration::from_secs(8))).await,
            Err(WebhookError::Unavailable(_))
        ));

        api.suppress_gate.as_ref().unwrap().add_permits(1);
        drain.await.unwrap();

        let updates = api.updates.lock().unwrap().clone();
        assert_eq!(updates.len(), 2);
        assert!(updates[0].0.starts_with("suppressed-"));
        assert_eq!(updates[1].0, "a@x.com");
        assert!(updates[1].1 - started < Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_rejected_after_shutdown() {
        let api = Arc::new(RecordingApi::default());
        let scheduler = RestoreScheduler::new();
        scheduler.shutdown().await;

        assert!(!scheduler.is_accepting());
        assert!(matches!(
            scheduler
                .submit(api.clone(), task(Duration::from_secs(8)))
                .await,
            Err(WebhookError::Unavailable(_))
        ));

        settle().await;
        assert!(api.emails().is_empty());
    }
}
