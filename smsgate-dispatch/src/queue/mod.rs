//! The throttled, retrying dispatch queue
//!
//! ```text
//! enqueue ──> [ bounded buffer ] ──> throttle loop ──> worker ──> Transport
//!                    ^                                   │
//!                    └──────── retryable recipients ─────┘
//! ```
//!
//! Messages are cut into work items of one second's worth of transport calls
//! and pushed onto a bounded buffer. A single loop owns every pacing
//! decision: it pops work items in FIFO order, charges their call units
//! against the current one-second window and hands each to its own worker
//! task. Workers cut their item into transport-sized batches, resolve every
//! recipient outcome and push retryable recipients back onto the same buffer
//! as a fresh message with the next attempt number.

mod throttle;
mod worker;

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
};

use parking_lot::Mutex;
use smsgate_common::{Signal, internal};
use smsgate_tracing::traced;
use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore, broadcast, mpsc},
    task::{JoinHandle, JoinSet},
};

use crate::{
    config::{DispatchConfig, Limits},
    error::DispatchError,
    event::{DispatchEvent, DispatchObserver, FailureReason},
    partition::partition,
    transport::Transport,
    types::Message,
};

use self::throttle::Throttle;

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    transport_calls: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    requeued: AtomicU64,
    in_flight: AtomicUsize,
}

/// Point-in-time view of the queue, for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Work items waiting in the buffer
    pub buffered: usize,
    /// Workers currently running
    pub in_flight: usize,
    /// Work items handed to workers so far
    pub dispatched: u64,
    /// Transport calls made so far, immediate call retries included
    pub transport_calls: u64,
    /// Recipients reported delivered
    pub delivered: u64,
    /// Recipients reported failed
    pub failed: u64,
    /// Retry messages pushed back onto the buffer
    pub requeued: u64,
}

struct Shared {
    limits: Limits,
    sender: mpsc::Sender<Message>,
    receiver: Mutex<Option<mpsc::Receiver<Message>>>,
    transport: Arc<dyn Transport>,
    observer: Arc<dyn DispatchObserver>,
    closed: AtomicBool,
    counters: Counters,
}

/// Handle to the dispatch queue.
///
/// Cheap to clone; every clone feeds the same buffer. Only one throttling
/// loop ever runs per queue, see [`DispatchQueue::serve`].
#[derive(Clone)]
pub struct DispatchQueue {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("limits", &self.shared.limits)
            .field("transport", &self.shared.transport)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl DispatchQueue {
    /// Create a queue that sends through `transport` and reports to `observer`.
    ///
    /// Nothing is sent until [`serve`](Self::serve) or [`start`](Self::start)
    /// runs the throttling loop, but messages can be enqueued up to the
    /// buffer's capacity beforehand.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidConfig`] if `config` fails validation.
    pub fn new(
        config: &DispatchConfig,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn DispatchObserver>,
    ) -> Result<Self, DispatchError> {
        let limits = config.limits()?;
        let (sender, receiver) = mpsc::channel(limits.capacity);

        internal!(
            level = DEBUG,
            capacity = limits.capacity,
            calls_per_second = limits.calls_per_second,
            per_call = limits.per_call.get(),
            max_retries = limits.max_retries,
            "Dispatch queue created"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                limits,
                sender,
                receiver: Mutex::new(Some(receiver)),
                transport,
                observer,
                closed: AtomicBool::new(false),
                counters: Counters::default(),
            }),
        })
    }

    /// Queue `message` for delivery.
    ///
    /// The message is cut into work items of at most one second's worth of
    /// transport calls. When the buffer is full this waits for room rather
    /// than dropping anything. Every recipient later receives exactly one
    /// [`DispatchEvent`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::QueueClosed`] once the queue has shut down.
    #[traced(instrument(level = tracing::Level::DEBUG, skip_all, fields(message_id = %message.id(), recipients = message.recipients().len())), timing(precision = "us"))]
    pub async fn enqueue(&self, message: Message) -> Result<(), DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::QueueClosed);
        }

        self.push(message).await;
        Ok(())
    }

    /// Run the throttling loop until [`Signal::Shutdown`] arrives.
    ///
    /// Only the first call runs the loop; any later call logs and returns
    /// immediately. On shutdown the loop stops popping work, reports every
    /// recipient still buffered as [`FailureReason::ShuttingDown`], and gives
    /// in-flight workers up to `shutdown_timeout_secs` to finish before
    /// aborting them.
    pub async fn serve(&self, shutdown: broadcast::Receiver<Signal>) {
        if let Some(receiver) = self.take_receiver() {
            self.run(receiver, shutdown).await;
        }
    }

    /// Spawn [`serve`](Self::serve) onto the current runtime.
    ///
    /// Returns `None` if the loop has already been started.
    pub fn start(&self, shutdown: broadcast::Receiver<Signal>) -> Option<JoinHandle<()>> {
        let receiver = self.take_receiver()?;
        let queue = self.clone();

        Some(tokio::spawn(async move { queue.run(receiver, shutdown).await }))
    }

    /// Whether the queue has stopped accepting work.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> QueueStats {
        let counters = &self.shared.counters;
        let sender = &self.shared.sender;

        QueueStats {
            buffered: sender.max_capacity() - sender.capacity(),
            in_flight: counters.in_flight.load(Ordering::Relaxed),
            dispatched: counters.dispatched.load(Ordering::Relaxed),
            transport_calls: counters.transport_calls.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            requeued: counters.requeued.load(Ordering::Relaxed),
        }
    }

    fn take_receiver(&self) -> Option<mpsc::Receiver<Message>> {
        let receiver = self.shared.receiver.lock().take();
        if receiver.is_none() {
            tracing::warn!("Dispatch queue is already running");
        }
        receiver
    }

    /// Cut `message` into work items and push them, waiting for room.
    ///
    /// Work items that can no longer be pushed because the queue closed are
    /// reported as failed.
    async fn push(&self, message: Message) {
        let per_item = self.shared.limits.per_item;

        for group in partition(message.recipients(), per_item) {
            let Some(item) = message.narrowed(group.to_vec()) else {
                continue;
            };

            if let Err(mpsc::error::SendError(item)) = self.shared.sender.send(item).await {
                internal!(
                    level = DEBUG,
                    message_id = %item.id(),
                    recipients = item.recipients().len(),
                    "Queue closed while pushing"
                );
                self.fail_all(&item, &FailureReason::ShuttingDown);
            }
        }
    }

    #[traced(instrument(level = tracing::Level::TRACE, skip_all), timing(precision = "s"))]
    async fn run(&self, mut receiver: mpsc::Receiver<Message>, shutdown: broadcast::Receiver<Signal>) {
        let limits = self.shared.limits;
        internal!(
            level = INFO,
            calls_per_second = limits.calls_per_second,
            "Dispatch queue starting"
        );

        let mut throttle = Throttle::new(limits.calls_per_second);
        let permits = limits.max_in_flight.map(|n| Arc::new(Semaphore::new(n)));
        let mut workers: JoinSet<()> = JoinSet::new();

        let shutdown = wait_for_shutdown(shutdown);
        tokio::pin!(shutdown);

        loop {
            let item = tokio::select! {
                biased;
                () = &mut shutdown => break,
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Dispatch worker did not complete");
                    }
                    continue;
                }
                item = receiver.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            // Workers hand their slot back before pushing retries, so waiting
            // here never waits on the buffer.
            let permit = match &permits {
                Some(permits) => tokio::select! {
                    biased;
                    () = &mut shutdown => {
                        self.fail_all(&item, &FailureReason::ShuttingDown);
                        break;
                    }
                    permit = Arc::clone(permits).acquire_owned() => permit.ok(),
                },
                None => None,
            };

            let units = item.call_units(limits.per_call);
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    self.fail_all(&item, &FailureReason::ShuttingDown);
                    break;
                }
                () = throttle.admit(units) => {}
            }

            self.dispatch(&mut workers, item, units, permit);
        }

        self.drain(receiver, workers).await;
    }

    fn dispatch(
        &self,
        workers: &mut JoinSet<()>,
        item: Message,
        units: usize,
        permit: Option<OwnedSemaphorePermit>,
    ) {
        internal!(
            level = DEBUG,
            message_id = %item.id(),
            attempt = item.attempt(),
            recipients = item.recipients().len(),
            units,
            "Dispatching work item"
        );

        let counters = &self.shared.counters;
        counters.dispatched.fetch_add(1, Ordering::Relaxed);
        counters.in_flight.fetch_add(1, Ordering::Relaxed);

        // Held by the task so they are released even if it is aborted unpolled.
        let in_flight = InFlight(Arc::clone(&self.shared));
        let queue = self.clone();
        workers.spawn(async move {
            let _in_flight = in_flight;
            queue.work(item, permit).await;
        });
    }

    async fn drain(&self, mut receiver: mpsc::Receiver<Message>, mut workers: JoinSet<()>) {
        internal!(level = INFO, "Dispatch queue received shutdown signal");

        self.shared.closed.store(true, Ordering::Release);
        receiver.close();

        let mut abandoned = 0usize;
        while let Ok(item) = receiver.try_recv() {
            abandoned += item.recipients().len();
            self.fail_all(&item, &FailureReason::ShuttingDown);
        }
        if abandoned > 0 {
            tracing::warn!(recipients = abandoned, "Abandoned buffered recipients on shutdown");
        }

        let timeout = self.shared.limits.shutdown_timeout;
        let finished = tokio::time::timeout(timeout, async {
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Dispatch worker did not complete");
                }
            }
        })
        .await;

        if finished.is_err() {
            tracing::warn!(
                remaining = workers.len(),
                timeout_secs = timeout.as_secs(),
                "Shutdown timeout exceeded, aborting in-flight workers"
            );
            workers.shutdown().await;
        } else {
            internal!(level = INFO, "All in-flight workers completed");
        }

        internal!(level = INFO, "Dispatch queue shutdown complete");
    }

    fn notify(&self, event: DispatchEvent) {
        let counter = if event.is_delivered() {
            &self.shared.counters.delivered
        } else {
            &self.shared.counters.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);

        self.shared.observer.notify(event);
    }

    fn fail_all(&self, item: &Message, reason: &FailureReason) {
        for recipient in item.recipients() {
            self.notify(DispatchEvent::Failed {
                message_id: item.id().clone(),
                payload: Arc::clone(item.payload()),
                recipient: recipient.clone(),
                reason: reason.clone(),
            });
        }
    }
}

/// Decrements the in-flight count when a worker ends, aborted or not.
struct InFlight(Arc<Shared>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.counters.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Resolves on the first shutdown signal, or when every sender is gone.
async fn wait_for_shutdown(mut shutdown: broadcast::Receiver<Signal>) {
    loop {
        match shutdown.recv().await {
            Ok(Signal::Shutdown) => return,
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => {
                tracing::error!("Dispatch queue shutdown channel closed");
                return;
            }
        }
    }
}
