//! Single-worker generation queue.
//!
//! Requests are pushed onto an unbounded channel from any thread and drained by
//! one tokio task, strictly one at a time and in submission order. The worker
//! publishes what it is doing through a `watch` channel so callers can observe
//! (and cancel) the current request without touching worker-owned state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use tokio::select;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::GenerationError;
use crate::events::{GenerationRequest, RequestId};
use crate::service::{EndpointKind, ImageService};

/// Anything that accepts generation requests without blocking.
pub trait RequestSink {
    fn submit(&self, request: GenerationRequest) -> Result<RequestId, GenerationError>;
}

/// The request currently being executed by the worker.
#[derive(Debug, Clone)]
pub struct InFlight {
    pub id: RequestId,
    pub endpoint: EndpointKind,
    cancel: CancellationToken,
}

#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub current: Option<InFlight>,
    /// Results handed to `on_complete`. The callback may still reject the
    /// bytes (an undecodable image, say); that is its concern, not the worker's.
    pub delivered: u64,
    pub failed: u64,
}

impl WorkerStatus {
    pub fn finished(&self) -> u64 {
        self.delivered + self.failed
    }
}

struct Queued {
    id: RequestId,
    request: GenerationRequest,
}

/// Handle to the generation worker. Cheap to share behind an `Arc`; every
/// method is callable from any thread.
pub struct Generator {
    tx: mpsc::UnboundedSender<Queued>,
    next_id: AtomicU64,
    pending: Arc<AtomicUsize>,
    status: watch::Receiver<WorkerStatus>,
}

impl Generator {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn<S: ImageService>(
        service: S,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(WorkerStatus::default());
        let pending = Arc::new(AtomicUsize::new(0));
        let handle = tokio::spawn(run(service, rx, status_tx, pending.clone(), shutdown));
        let generator = Self {
            tx,
            next_id: AtomicU64::new(1),
            pending,
            status: status_rx,
        };
        (generator, handle)
    }

    /// Requests waiting behind the current one.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<RequestId> {
        self.status.borrow().current.as_ref().map(|c| c.id)
    }

    pub fn status(&self) -> WorkerStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerStatus> {
        self.status.clone()
    }

    /// Abort the in-flight request, if any. Its completion callback does not run
    /// (the failure callback sees `Cancelled`) and the worker moves on to the
    /// next queued item.
    pub fn cancel_current(&self) -> bool {
        self.cancel_current_strict().is_ok()
    }

    pub fn cancel_current_strict(&self) -> Result<RequestId, GenerationError> {
        let status = self.status.borrow();
        match status.current.as_ref() {
            Some(inflight) => {
                debug!(request = %inflight.id, "cancelling in-flight generation");
                inflight.cancel.cancel();
                Ok(inflight.id)
            }
            None => Err(GenerationError::CancellationUnsupported),
        }
    }

    /// Resolve once at least `count` requests have finished, successfully or not.
    pub async fn wait_finished(&self, count: u64) -> Result<(), GenerationError> {
        let mut rx = self.status.clone();
        rx.wait_for(|s| s.finished() >= count)
            .await
            .map(|_| ())
            .map_err(|_| GenerationError::WorkerStopped)
    }
}

impl RequestSink for Generator {
    fn submit(&self, request: GenerationRequest) -> Result<RequestId, GenerationError> {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::SeqCst));
        debug!(request = %id, seeded = request.has_seed_image(), "queueing generation");
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.tx.send(Queued { id, request }).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            GenerationError::WorkerStopped
        })?;
        Ok(id)
    }
}

impl<T: RequestSink + ?Sized> RequestSink for Arc<T> {
    fn submit(&self, request: GenerationRequest) -> Result<RequestId, GenerationError> {
        (**self).submit(request)
    }
}

/// Worker loop: one request at a time until shutdown or until every handle is gone.
async fn run<S: ImageService>(
    service: S,
    mut rx: mpsc::UnboundedReceiver<Queued>,
    status: watch::Sender<WorkerStatus>,
    pending: Arc<AtomicUsize>,
    shutdown: CancellationToken,
) {
    loop {
        let Queued { id, request } = select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = rx.recv() => match next {
                Some(queued) => queued,
                None => break,
            },
        };
        pending.fetch_sub(1, Ordering::SeqCst);

        let (payload, callbacks) = request.into_parts();
        let endpoint = EndpointKind::for_payload(&payload);
        let cancel = shutdown.child_token();
        status.send_modify(|s| {
            s.current = Some(InFlight {
                id,
                endpoint,
                cancel: cancel.clone(),
            })
        });
        info!(request = %id, endpoint = endpoint.as_str(), "generation started");

        let started = Instant::now();
        let result = select! {
            biased;
            _ = cancel.cancelled() => Err(GenerationError::Cancelled),
            res = service.send(endpoint, &payload) => res.and_then(|r| r.first_image()),
        };
        let elapsed = humantime::format_duration(started.elapsed());

        let succeeded = match result {
            Ok(image) => {
                info!(request = %id, bytes = image.bytes.len(), %elapsed, "generation delivered");
                deliver(id, move || callbacks.complete(image)).await;
                true
            }
            Err(err) => {
                if matches!(err, GenerationError::Cancelled) {
                    info!(request = %id, %elapsed, "generation cancelled");
                } else {
                    warn!(request = %id, error = %err, %elapsed, "generation failed");
                }
                deliver(id, move || callbacks.fail(&err)).await;
                false
            }
        };

        status.send_modify(|s| {
            s.current = None;
            if succeeded {
                s.delivered += 1;
            } else {
                s.failed += 1;
            }
        });
    }
    debug!("generation worker stopped");
}

/// Run a request callback off the async executor. A panicking callback is
/// logged and does not take the worker down.
async fn deliver(id: RequestId, f: impl FnOnce() + Send + 'static) {
    if let Err(err) = tokio::task::spawn_blocking(f).await {
        warn!(request = %id, error = %err, "generation callback panicked");
    }
}
