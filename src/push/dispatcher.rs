use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::domain::Subscription;
use crate::push::transport::{PushTransport, TransportError};
use crate::store::SubscriptionStore;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub worker_count: usize,
    pub queue_size: usize,
    pub max_retries: u32,
    pub retry_base_backoff_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_count: 10,
            queue_size: 1024,
            max_retries: 3,
            retry_base_backoff_ms: 400,
        }
    }
}

/// A unit of work consumed by workers. The subscription is a snapshot taken
/// at enqueue time; store mutations do not affect in-flight retries.
struct Task {
    subscription: Subscription,
    payload: Arc<Vec<u8>>,
}

/// Shared, read-only context for all workers.
struct WorkerContext {
    /// `None` when the VAPID configuration is incomplete; tasks are then
    /// logged and dropped instead of transmitted.
    transport: Option<Arc<dyn PushTransport>>,
    store: Arc<dyn SubscriptionStore>,
    max_retries: u32,
    retry_base_backoff_ms: u64,
}

/// Bounded worker pool draining a bounded queue of push transmissions.
///
/// Delivery is best-effort and fully decoupled from the enqueuing request:
/// outcomes never propagate back, and a 410 Gone response prunes the dead
/// subscription from the store.
pub struct PushDispatcher {
    queue_tx: std::sync::Mutex<Option<mpsc::Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PushDispatcher {
    pub fn start(
        config: DispatcherConfig,
        transport: Option<Arc<dyn PushTransport>>,
        store: Arc<dyn SubscriptionStore>,
    ) -> Self {
        let worker_count = config.worker_count.max(1);
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_size.max(1));
        let shared_rx = Arc::new(Mutex::new(queue_rx));

        let ctx = Arc::new(WorkerContext {
            transport,
            store,
            max_retries: config.max_retries,
            retry_base_backoff_ms: config.retry_base_backoff_ms,
        });

        let mut workers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            workers.push(tokio::spawn(worker_loop(shared_rx.clone(), ctx.clone())));
        }

        Self {
            queue_tx: std::sync::Mutex::new(Some(queue_tx)),
            workers: Mutex::new(workers),
        }
    }

    /// Queues one transmission. Blocks only while the queue is full; a
    /// stopped dispatcher drops the task silently.
    pub async fn enqueue(&self, subscription: Subscription, payload: Arc<Vec<u8>>) {
        let queue_tx = self.queue_tx.lock().expect("dispatch queue lock").clone();
        if let Some(queue_tx) = queue_tx {
            let _ = queue_tx
                .send(Task {
                    subscription,
                    payload,
                })
                .await;
        }
    }

    /// Queues one transmission per subscription, sharing the payload bytes.
    pub async fn enqueue_many(&self, subscriptions: Vec<Subscription>, payload: Arc<Vec<u8>>) {
        for subscription in subscriptions {
            self.enqueue(subscription, Arc::clone(&payload)).await;
        }
    }

    /// Closes the queue and waits for in-flight workers to drain it.
    pub async fn stop(&self) {
        self.queue_tx.lock().expect("dispatch queue lock").take();

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(rx: Arc<Mutex<mpsc::Receiver<Task>>>, ctx: Arc<WorkerContext>) {
    loop {
        let task = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };

        let Some(task) = task else { break };

        send_with_retry(&ctx, task).await;
    }
}

async fn send_with_retry(ctx: &WorkerContext, task: Task) {
    let endpoint = redact_endpoint(&task.subscription.endpoint);

    let Some(transport) = &ctx.transport else {
        warn!(%endpoint, "push send skipped: missing VAPID configuration");
        return;
    };

    for attempt in 0..=ctx.max_retries {
        match transport.transmit(&task.subscription, &task.payload).await {
            Err(TransportError::Message(err)) => {
                warn!(%endpoint, %err, "push message build failed");
                return;
            }
            Err(TransportError::Network(err)) => {
                if attempt < ctx.max_retries {
                    sleep(backoff(ctx.retry_base_backoff_ms, attempt)).await;
                    continue;
                }
                warn!(%endpoint, %err, "push send error");
                return;
            }
            Ok(status) if status.is_success() => return,
            Ok(status) if status == http::StatusCode::GONE => {
                // The endpoint is permanently invalid; this worker task is
                // the authoritative signal to drop the subscription.
                info!(%endpoint, "pruning gone subscription");
                if let Err(err) = ctx
                    .store
                    .delete_by_endpoint(&task.subscription.endpoint)
                    .await
                {
                    error!(%endpoint, %err, "failed deleting gone subscription");
                }
                return;
            }
            Ok(status) if status.is_server_error() && attempt < ctx.max_retries => {
                sleep(backoff(ctx.retry_base_backoff_ms, attempt)).await;
            }
            Ok(status) => {
                warn!(%endpoint, status = status.as_u16(), "push send failed");
                return;
            }
        }
    }
}

fn backoff(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.max(1) << attempt)
}

/// Endpoint URLs embed per-subscription capability tokens; only the
/// scheme and host ever reach the logs.
fn redact_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with("https://") || endpoint.starts_with("http://") {
        let parts: Vec<&str> = endpoint.split('/').collect();
        if parts.len() >= 3 {
            return format!("{}//{}", parts[0], parts[2]);
        }
    }
    "unknown".to_string()
}
