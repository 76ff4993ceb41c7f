use std::time::{Duration, Instant};

use anyhow::Result;
use reqwest::Url;
use tracing::{error, info, warn};

use super::{
    CycleError, Runnable,
    diff::{Change, compare},
    extract::{Snapshot, extract},
    fetch::Fetch,
    notify::{Notify, format_decrease, format_message},
    state::{StateError, StateStore},
};

/// How the first baseline is chosen when the store has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initialization {
    Fixed(u64),
    /// Take the first live count and announce the current listing.
    Adaptive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initialized {
    Restored(u64),
    Fixed(u64),
    Observed(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Unchanged {
        count: u64,
    },
    Increased {
        previous: u64,
        count: u64,
        listed: usize,
        sent: bool,
    },
    Decreased {
        previous: u64,
        count: u64,
        sent: bool,
    },
}

/// Fetch, extract, compare, notify, persist.
pub struct Monitor<F, N, S> {
    fetcher: F,
    notifier: N,
    store: S,
    keyword: String,
    search_base: Url,
    notify_on_decrease: bool,
}

impl<F: Fetch, N: Notify, S: StateStore> Monitor<F, N, S> {
    pub fn new(fetcher: F, notifier: N, store: S, keyword: String, search_base: Url) -> Self {
        Monitor {
            fetcher,
            notifier,
            store,
            keyword,
            search_base,
            notify_on_decrease: false,
        }
    }

    /// Also send a short count-change message when the count goes down.
    /// Off by default: a decrease is only logged.
    pub fn with_decrease_notice(mut self, enabled: bool) -> Self {
        self.notify_on_decrease = enabled;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn snapshot(&self) -> Result<Snapshot, CycleError> {
        let markup = self.fetcher.fetch().await?;
        let snapshot = extract(&markup)?;
        info!(
            count = snapshot.total_count,
            records = snapshot.records.len(),
            "search page read"
        );
        Ok(snapshot)
    }

    /// Establishes the baseline unless the store already has one.
    ///
    /// With [`Initialization::Adaptive`] a failed first fetch is returned to
    /// the caller; there is no baseline to fall back on.
    pub async fn initialize(&mut self, init: Initialization) -> Result<Initialized, CycleError> {
        if let Some(count) = self.store.get_baseline()? {
            info!(baseline = count, "baseline restored");
            return Ok(Initialized::Restored(count));
        }

        match init {
            Initialization::Fixed(count) => {
                self.store.set_baseline(count)?;
                info!(baseline = count, "baseline fixed from configuration");
                Ok(Initialized::Fixed(count))
            }
            Initialization::Adaptive => {
                let snapshot = self.snapshot().await?;
                self.store.set_baseline(snapshot.total_count)?;
                info!(baseline = snapshot.total_count, "baseline taken from live count");

                let records = &snapshot.records;
                let message = format_message(&self.keyword, &self.search_base, records, records);
                self.deliver(&message).await;
                Ok(Initialized::Observed(snapshot.total_count))
            }
        }
    }

    /// Runs one cycle against the stored baseline.
    ///
    /// Any change advances the baseline, whether or not the message went out.
    pub async fn cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        let previous = self.store.get_baseline()?.ok_or(StateError::Missing)?;
        let snapshot = self.snapshot().await?;
        let count = snapshot.total_count;

        match compare(count, previous) {
            Change::Unchanged => {
                info!(count, "count unchanged");
                Ok(CycleOutcome::Unchanged { count })
            }
            change @ Change::Increased { delta } => {
                let new = change.new_records(&snapshot.records);
                info!(previous, count, delta, listed = new.len(), "new rating records");
                let message =
                    format_message(&self.keyword, &self.search_base, &snapshot.records, new);
                let sent = self.deliver(&message).await;
                self.store.set_baseline(count)?;
                Ok(CycleOutcome::Increased {
                    previous,
                    count,
                    listed: new.len(),
                    sent,
                })
            }
            Change::Decreased { delta } => {
                warn!(previous, count, delta, "count decreased");
                let sent = if self.notify_on_decrease {
                    self.deliver(&format_decrease(&self.keyword, previous, count))
                        .await
                } else {
                    false
                };
                self.store.set_baseline(count)?;
                Ok(CycleOutcome::Decreased {
                    previous,
                    count,
                    sent,
                })
            }
        }
    }

    async fn deliver(&self, message: &str) -> bool {
        match self.notifier.send(message).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "notification failed");
                false
            }
        }
    }
}

impl<F: Fetch, N: Notify, S: StateStore> Runnable for Monitor<F, N, S> {
    async fn run(&mut self) -> Result<()> {
        self.cycle().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetState {
    Polling,
    Waiting { last_idle_log: Instant },
}

/// Polls until the count first reaches `target`, notifies once, then idles
/// without polling again.
pub struct TargetMonitor<F, N, S> {
    monitor: Monitor<F, N, S>,
    target: u64,
    idle_log_interval: Duration,
    state: TargetState,
}

impl<F: Fetch, N: Notify, S: StateStore> TargetMonitor<F, N, S> {
    pub fn new(monitor: Monitor<F, N, S>, target: u64, idle_log_interval: Duration) -> Self {
        TargetMonitor {
            monitor,
            target,
            idle_log_interval,
            state: TargetState::Polling,
        }
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.state, TargetState::Waiting { .. })
    }

    pub async fn step(&mut self) -> Result<(), CycleError> {
        match self.state {
            TargetState::Waiting { last_idle_log } => {
                if last_idle_log.elapsed() >= self.idle_log_interval {
                    info!(target_count = self.target, "target reached, waiting");
                    self.state = TargetState::Waiting {
                        last_idle_log: Instant::now(),
                    };
                }
                Ok(())
            }
            TargetState::Polling => {
                let snapshot = self.monitor.snapshot().await?;
                let count = snapshot.total_count;
                if count < self.target {
                    info!(count, target_count = self.target, "target not reached");
                    return Ok(());
                }

                info!(count, target_count = self.target, "target reached");
                let new = compare(count, self.target).new_records(&snapshot.records);
                let message = format_message(
                    &self.monitor.keyword,
                    &self.monitor.search_base,
                    &snapshot.records,
                    new,
                );
                self.monitor.deliver(&message).await;

                info!("monitoring finished, switching to wait mode");
                self.state = TargetState::Waiting {
                    last_idle_log: Instant::now(),
                };
                Ok(())
            }
        }
    }
}

impl<F: Fetch, N: Notify, S: StateStore> Runnable for TargetMonitor<F, N, S> {
    async fn run(&mut self) -> Result<()> {
        self.step().await?;
        Ok(())
    }
}
