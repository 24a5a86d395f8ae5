//! Partitioned fixed-window rate limiter.
//!
//! Each client key owns an independent partition: a permit counter that resets at fixed window
//! boundaries and a bounded FIFO of requests waiting for the next window. Partitions are created
//! lazily and dropped by [`Throttle::sweep_idle`] once they have been quiet for a full window.

use crate::config::ThrottlingConfig;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse as _, Response};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Partition key used when the peer address is not available.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Plain-text 429 body.
pub const REJECTION_BODY: &str = "Too many requests. Please try again later.";

#[derive(Debug)]
struct Partition {
    window_start: Instant,
    used: u32,
    queue: VecDeque<oneshot::Sender<()>>,
}

impl Partition {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            used: 0,
            queue: VecDeque::new(),
        }
    }

    /// Start a new window if the current one has ended, handing its permits to queued waiters
    /// oldest-first. Waiters that have gone away do not consume a permit.
    fn roll(&mut self, now: Instant, permit_limit: u32, window: Duration) {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < window {
            return;
        }
        #[allow(clippy::cast_possible_truncation)]
        let into_window = Duration::from_nanos((elapsed.as_nanos() % window.as_nanos()) as u64);
        self.window_start = now - into_window;
        self.used = 0;

        while self.used < permit_limit {
            let Some(waiter) = self.queue.pop_front() else {
                break;
            };
            if waiter.send(()).is_ok() {
                self.used += 1;
            }
        }
    }

    fn window_end(&self, window: Duration) -> Instant {
        self.window_start + window
    }
}

pub enum Decision {
    Admit,
    Enqueue(QueueTicket),
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected,
}

/// A queued request. Dropping the ticket abandons the queue slot.
pub struct QueueTicket {
    rx: oneshot::Receiver<()>,
    partition: Arc<Mutex<Partition>>,
    permit_limit: u32,
    window: Duration,
}

impl QueueTicket {
    /// Wait until a later window grants this ticket a permit.
    pub async fn wait(mut self) -> Admission {
        loop {
            let deadline = self.partition.lock().window_end(self.window);
            tokio::select! {
                biased;
                granted = &mut self.rx => {
                    return if granted.is_ok() { Admission::Admitted } else { Admission::Rejected };
                }
                () = tokio::time::sleep_until(deadline) => {
                    self.partition
                        .lock()
                        .roll(Instant::now(), self.permit_limit, self.window);
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct Throttle {
    permit_limit: u32,
    window: Duration,
    queue_limit: usize,
    partitions: Mutex<HashMap<String, Arc<Mutex<Partition>>>>,
}

impl Throttle {
    #[must_use]
    pub fn new(permit_limit: u32, window: Duration, queue_limit: usize) -> Self {
        Self {
            permit_limit,
            window,
            queue_limit,
            partitions: Mutex::new(HashMap::new()),
        }
    }

    /// `None` when throttling is disabled.
    #[must_use]
    pub fn from_config(config: &ThrottlingConfig) -> Option<Self> {
        config.enabled.then(|| {
            Self::new(
                config.permit_limit,
                config.window(),
                config.queue_limit as usize,
            )
        })
    }

    fn partition(&self, key: &str) -> Arc<Mutex<Partition>> {
        let mut partitions = self.partitions.lock();
        if let Some(p) = partitions.get(key) {
            return Arc::clone(p);
        }
        let p = Arc::new(Mutex::new(Partition::new(Instant::now())));
        partitions.insert(key.to_string(), Arc::clone(&p));
        p
    }

    /// Non-suspending admission decision for one request from `key`.
    pub fn try_admit(&self, key: &str) -> Decision {
        let partition = self.partition(key);
        let mut p = partition.lock();
        p.roll(Instant::now(), self.permit_limit, self.window);
        p.queue.retain(|waiter| !waiter.is_closed());

        if p.queue.is_empty() && p.used < self.permit_limit {
            p.used += 1;
            return Decision::Admit;
        }
        if p.queue.len() < self.queue_limit {
            let (tx, rx) = oneshot::channel();
            p.queue.push_back(tx);
            drop(p);
            return Decision::Enqueue(QueueTicket {
                rx,
                partition,
                permit_limit: self.permit_limit,
                window: self.window,
            });
        }
        Decision::Reject
    }

    /// Admit, wait in the queue, or reject.
    pub async fn admit(&self, key: &str) -> Admission {
        match self.try_admit(key) {
            Decision::Admit => Admission::Admitted,
            Decision::Reject => Admission::Rejected,
            Decision::Enqueue(ticket) => {
                tracing::debug!(client = %key, "request queued by throttle");
                ticket.wait().await
            }
        }
    }

    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.partitions.lock().len()
    }

    /// Drop partitions with no waiters whose last window ended at least one window ago.
    pub fn sweep_idle(&self) -> usize {
        let now = Instant::now();
        let mut partitions = self.partitions.lock();
        let before = partitions.len();
        partitions.retain(|_, p| {
            if Arc::strong_count(p) > 1 {
                return true;
            }
            let p = p.lock();
            !p.queue.is_empty()
                || now.saturating_duration_since(p.window_start) < self.window.saturating_mul(2)
        });
        before - partitions.len()
    }

    /// Periodically sweep idle partitions until `cancel` fires.
    pub async fn run_sweeper(self: Arc<Self>, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(self.window);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = tick.tick() => {
                    let removed = self.sweep_idle();
                    if removed > 0 {
                        tracing::debug!(removed, "swept idle throttle partitions");
                    }
                }
            }
        }
    }
}

/// Throttle partition key for a request: the peer IP, or [`UNKNOWN_CLIENT`].
#[must_use]
pub fn client_key(req: &Request) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| UNKNOWN_CLIENT.to_string(), |ci| ci.0.ip().to_string())
}

/// axum middleware wrapping [`Throttle::admit`].
pub async fn throttle_requests(
    State(throttle): State<Arc<Throttle>>,
    req: Request,
    next: Next,
) -> Response {
    let key = client_key(&req);
    match throttle.admit(&key).await {
        Admission::Admitted => next.run(req).await,
        Admission::Rejected => {
            tracing::warn!(client = %key, "rate limit exceeded");
            (StatusCode::TOO_MANY_REQUESTS, REJECTION_BODY).into_response()
        }
    }
}
