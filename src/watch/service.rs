//! Fetch cycles, the staleness gate and the scheduling loop.

use crate::config::{AppConfig, MonitorConfig};
use crate::error::{Result, WatchError};
use crate::watch::data::Snapshot;
use crate::watch::monitor::Monitor;
use crate::watch::source::Source;
use crate::watch::traits::GaugeSink;
use chrono::Utc;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Outcome of offering a snapshot to the [`StalenessGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The snapshot is the most recent one and becomes the applied one.
    Apply,
    /// A snapshot of the same age or younger was already applied.
    Discard {
        candidate_staleness: Duration,
        applied_staleness: Duration,
    },
}

/// Tracks the start time of the last applied cycle.
///
/// Start times are stored as nanoseconds past the gate's epoch plus one, so
/// that zero means nothing has been applied yet.
#[derive(Debug)]
pub struct StalenessGate {
    epoch: Instant,
    last_applied: AtomicU64,
}

impl Default for StalenessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl StalenessGate {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_applied: AtomicU64::new(0),
        }
    }

    /// Compare-and-swap `started` in as the last applied start time.
    ///
    /// Succeeds only when `started` is strictly more recent than the current
    /// value, which is the same as being strictly less stale right now.
    pub fn admit(&self, started: Instant) -> Admission {
        let candidate = self.ticks(started);
        match self.last_applied.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            (candidate > current).then_some(candidate)
        }) {
            Ok(_) => Admission::Apply,
            Err(current) => {
                let now = Instant::now();
                Admission::Discard {
                    candidate_staleness: now.saturating_duration_since(started),
                    applied_staleness: now.saturating_duration_since(self.instant(current)),
                }
            }
        }
    }

    /// Start time of the last applied cycle.
    pub fn last_applied(&self) -> Option<Instant> {
        match self.last_applied.load(Ordering::Acquire) {
            0 => None,
            ticks => Some(self.instant(ticks)),
        }
    }

    fn ticks(&self, at: Instant) -> u64 {
        let nanos = at.saturating_duration_since(self.epoch).as_nanos();
        u64::try_from(nanos).unwrap_or(u64::MAX - 1).saturating_add(1)
    }

    fn instant(&self, ticks: u64) -> Instant {
        self.epoch + Duration::from_nanos(ticks.saturating_sub(1))
    }
}

/// Fans pulls out across sources and joins them into snapshots.
#[derive(Debug, Default)]
pub struct Aggregator {
    sources: Vec<Arc<Source>>,
    gate: StalenessGate,
}

impl Aggregator {
    pub fn new(sources: Vec<Source>) -> Self {
        Self {
            sources: sources.into_iter().map(Arc::new).collect(),
            gate: StalenessGate::new(),
        }
    }

    pub fn sources(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter().map(Arc::as_ref)
    }

    pub fn gate(&self) -> &StalenessGate {
        &self.gate
    }

    /// Pull every source concurrently and join the fragments.
    ///
    /// Failed sources are logged and left out of the snapshot.
    pub async fn fetch(&self) -> Snapshot {
        let started = Instant::now();
        let captured_at = Utc::now();

        let mut pulls = JoinSet::new();
        for source in &self.sources {
            let source = Arc::clone(source);
            pulls.spawn(async move {
                let records = source.pull().await;
                (source.id().to_string(), records)
            });
        }

        let mut fragments = BTreeMap::new();
        while let Some(joined) = pulls.join_next().await {
            match joined {
                Ok((id, Ok(records))) => {
                    fragments.insert(id, records);
                }
                Ok((id, Err(err @ WatchError::SourceBusy(_)))) => {
                    warn!(source = %id, error = %err, "Source skipped for this cycle");
                }
                Ok((id, Err(err))) => {
                    warn!(source = %id, error = %err, "Source refresh failure");
                }
                Err(err) => {
                    error!(error = %err, "Source pull task failed");
                }
            }
        }

        Snapshot::new(started, captured_at, fragments)
    }

    /// Decide whether `snapshot` supersedes the applied one.
    pub fn admit(&self, snapshot: &Snapshot) -> Admission {
        let admission = self.gate.admit(snapshot.started());
        if let Admission::Discard {
            candidate_staleness,
            applied_staleness,
        } = admission
        {
            debug!(
                latest = ?applied_staleness,
                received = ?candidate_staleness,
                "Stale source data received: ignore"
            );
        }
        admission
    }
}

/// Owns the refresh timer and dispatches applied snapshots to monitors.
#[derive(Debug)]
pub struct WatchService {
    aggregator: Arc<Aggregator>,
    monitors: Arc<[Monitor]>,
    drain_on_shutdown: bool,
    applied: watch::Sender<Option<Arc<Snapshot>>>,
}

impl WatchService {
    pub fn new(sources: Vec<Source>, monitors: Vec<Monitor>) -> Self {
        let (applied, _) = watch::channel(None);
        Self {
            aggregator: Arc::new(Aggregator::new(sources)),
            monitors: monitors.into(),
            drain_on_shutdown: true,
            applied,
        }
    }

    /// Build shell backed sources and monitors from configuration.
    ///
    /// `gauge` creates the sink every monitor writes to.
    pub fn from_config<F>(config: &AppConfig, mut gauge: F) -> Self
    where
        F: FnMut(&MonitorConfig) -> Arc<dyn GaugeSink>,
    {
        let sources = config.sources.iter().map(Source::from_config).collect();
        let monitors = config
            .monitors
            .iter()
            .map(|m| Monitor::from_config(m, gauge(m)))
            .collect();
        Self::new(sources, monitors)
    }

    /// Wait for in-flight dispatch work when the loop stops (default `true`).
    pub fn with_drain_on_shutdown(mut self, drain: bool) -> Self {
        self.drain_on_shutdown = drain;
        self
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn monitors(&self) -> &[Monitor] {
        &self.monitors
    }

    /// Receiver of every applied snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.applied.subscribe()
    }

    /// Run one cycle to completion, dispatch included.
    pub async fn refresh_once(&self) -> (Arc<Snapshot>, Admission) {
        let snapshot = Arc::new(self.aggregator.fetch().await);
        let admission = self.aggregator.admit(&snapshot);
        if admission == Admission::Apply {
            self.applied.send_replace(Some(Arc::clone(&snapshot)));
            dispatch(&self.monitors, &snapshot);
        }
        (snapshot, admission)
    }

    /// Run the scheduling loop until `shutdown` resolves.
    ///
    /// Every `refresh` a new cycle starts. A tick that comes due while the
    /// previous cycle is still fetching waits for that fetch to join, so no
    /// source ever has two pulls outstanding. Dispatch of an applied cycle
    /// may still overlap the next fetch. Cycles report back through a
    /// channel and only those passing the staleness gate reach the monitors.
    pub async fn run<F>(&self, refresh: Duration, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if refresh.is_zero() {
            return Err(WatchError::config_error("refresh period must be greater than zero"));
        }

        let mut ticker = time::interval(refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let (cycle_tx, mut cycle_rx) = mpsc::unbounded_channel::<Snapshot>();
        let mut dispatches = JoinSet::new();
        let mut fetching = false;
        tokio::pin!(shutdown);

        info!(
            sources = self.aggregator.sources.len(),
            monitors = self.monitors.len(),
            ?refresh,
            "Watch service started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Watch service stopping");
                    break;
                }
                _ = ticker.tick(), if !fetching => {
                    fetching = true;
                    let aggregator = Arc::clone(&self.aggregator);
                    let cycle_tx = cycle_tx.clone();
                    // Fetches are not cancelled by shutdown; they finish or time out on their own.
                    tokio::spawn(async move {
                        let snapshot = aggregator.fetch().await;
                        let _ = cycle_tx.send(snapshot);
                    });
                }
                Some(snapshot) = cycle_rx.recv() => {
                    fetching = false;
                    if self.aggregator.admit(&snapshot) == Admission::Apply {
                        let snapshot = Arc::new(snapshot);
                        self.applied.send_replace(Some(Arc::clone(&snapshot)));
                        let monitors = Arc::clone(&self.monitors);
                        dispatches.spawn(async move { dispatch(&monitors, &snapshot) });
                    }
                }
                Some(joined) = dispatches.join_next(), if !dispatches.is_empty() => {
                    if let Err(err) = joined {
                        error!(error = %err, "Monitor dispatch failed");
                    }
                }
            }
        }

        if self.drain_on_shutdown {
            while let Some(joined) = dispatches.join_next().await {
                if let Err(err) = joined {
                    error!(error = %err, "Monitor dispatch failed");
                }
            }
        } else {
            dispatches.abort_all();
        }
        Ok(())
    }
}

fn dispatch(monitors: &[Monitor], snapshot: &Snapshot) {
    let updated = monitors.iter().filter(|m| m.observe(snapshot)).count();
    debug!(
        captured_at = %snapshot.captured_at(),
        updated,
        skipped = monitors.len() - updated,
        "Snapshot dispatched"
    );
}
