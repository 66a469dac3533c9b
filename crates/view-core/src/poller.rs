use std::time::Duration;

use anyhow::Result;
use common::StatusDocument;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{StatusView, now_millis};

pub const POLL_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Where status documents come from.
pub trait StatusSource: Send + Sync + 'static {
    fn fetch_status(&self) -> impl Future<Output = Result<StatusDocument>> + Send;
}

/// Receives every successfully built view and swaps it into place.
pub trait ViewSink: Send + Sync + 'static {
    fn apply(&self, view: &StatusView);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Rendered { peers: usize, evictions: usize },
    Skipped { reason: String },
}

/// Fetches one document and hands the resulting view to `sink`.
///
/// On any failure the sink is left untouched so the previous view stays
/// visible.
pub async fn run_cycle<S, K>(source: &S, sink: &K, request_timeout: Duration) -> CycleOutcome
where
    S: StatusSource,
    K: ViewSink,
{
    let document = match tokio::time::timeout(request_timeout, source.fetch_status()).await {
        Ok(Ok(document)) => document,
        Ok(Err(err)) => {
            return CycleOutcome::Skipped {
                reason: format!("{err:#}"),
            };
        }
        Err(_) => {
            return CycleOutcome::Skipped {
                reason: format!(
                    "status request timed out after {}ms",
                    request_timeout.as_millis()
                ),
            };
        }
    };

    let view = match StatusView::build(&document, now_millis()) {
        Ok(view) => view,
        Err(err) => {
            return CycleOutcome::Skipped {
                reason: err.to_string(),
            };
        }
    };

    sink.apply(&view);
    CycleOutcome::Rendered {
        peers: view.peer_rows.len(),
        evictions: view.evict_rows.len(),
    }
}

pub struct StatusPoller<S, K> {
    source: S,
    sink: K,
    interval: Duration,
    request_timeout: Duration,
}

impl<S, K> StatusPoller<S, K>
where
    S: StatusSource,
    K: ViewSink,
{
    pub fn new(source: S, sink: K) -> Self {
        Self {
            source,
            sink,
            interval: POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Runs the first cycle immediately, then one per interval, until the
    /// returned handle is stopped or dropped.
    pub fn start(self) -> PollerHandle {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(self.run(shutdown.clone()));
        PollerHandle {
            shutdown,
            task: Some(task),
        }
    }

    async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "status poller started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.cancelled() => break,
            }

            let outcome = tokio::select! {
                outcome = run_cycle(&self.source, &self.sink, self.request_timeout) => outcome,
                _ = shutdown.cancelled() => break,
            };

            match outcome {
                CycleOutcome::Rendered { peers, evictions } => {
                    debug!(peers, evictions, "status view rendered");
                }
                CycleOutcome::Skipped { reason } => {
                    warn!(%reason, "status refresh skipped, keeping previous view");
                }
            }
        }

        info!("status poller stopped");
    }
}

pub struct PollerHandle {
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Stops polling and waits for an in-flight cycle to be abandoned.
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
            && err.is_panic()
        {
            warn!(error = %err, "status poller task panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
