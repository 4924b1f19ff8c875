//! Drives every reader from one trigger source.

use crate::reader::{Reader, TickOutcome};
use futures_util::{Stream, StreamExt, stream};
use std::{pin::pin, time::Duration};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Ticks a fixed set of readers, at most `concurrency` at a time.
///
/// Each trigger runs every reader exactly once. The next trigger isn't consumed until
/// the previous round has finished, so a reader never overlaps with itself, and a
/// slow or failing reader only delays the round it is in.
pub struct Scheduler {
    readers: Vec<Reader>,
    concurrency: usize,
}

impl Scheduler {
    /// Tick `readers` one at a time, in order
    pub fn new(readers: Vec<Reader>) -> Self {
        Self {
            readers,
            concurrency: 1,
        }
    }

    /// Allow up to `concurrency` readers in flight within a round (at least 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// The readers, in tick order
    pub fn readers(&self) -> &[Reader] {
        &self.readers
    }

    /// Tick every reader once. Outcomes are in reader order.
    pub async fn tick_all(&self) -> Vec<TickOutcome> {
        stream::iter(self.readers.iter().map(Reader::tick))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    /// Run a round for every item `triggers` yields, until it ends or `token` is cancelled.
    /// A round already in progress finishes before cancellation is noticed.
    pub async fn run(&self, triggers: impl Stream<Item = ()>, token: CancellationToken) {
        let mut triggers = pin!(triggers);
        info!(
            "Scheduler started with {} readers, concurrency {}",
            self.readers.len(),
            self.concurrency
        );
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Scheduler: stop requested");
                    return;
                }
                trigger = triggers.next() => {
                    if trigger.is_none() {
                        info!("Scheduler: trigger source closed");
                        return;
                    }
                    let outcomes = self.tick_all().await;
                    log_round(&outcomes);
                }
            }
        }
    }

    /// Run a round every `period`, starting immediately
    pub async fn run_every(&self, period: Duration, token: CancellationToken) {
        self.run(interval_triggers(period), token).await
    }
}

/// Shortest period [interval_triggers] will tick at
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// A trigger stream firing every `period`. Missed ticks are delayed rather than bunched.
/// Periods below [MIN_PERIOD] are raised to it.
pub fn interval_triggers(period: Duration) -> impl Stream<Item = ()> {
    if period < MIN_PERIOD {
        warn!("Trigger period {period:?} is too short, using {MIN_PERIOD:?}");
    }
    let mut interval = tokio::time::interval(period.max(MIN_PERIOD));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    stream::unfold(interval, |mut interval| async move {
        interval.tick().await;
        Some(((), interval))
    })
}

fn log_round(outcomes: &[TickOutcome]) {
    let delivered = outcomes
        .iter()
        .filter(|o| matches!(o, TickOutcome::Delivered))
        .count();
    let failed = outcomes
        .iter()
        .filter(|o| matches!(o, TickOutcome::QueryFailed(_) | TickOutcome::DeliveryFailed(_)))
        .count();
    if failed > 0 {
        warn!(
            "Round finished: {delivered} delivered, {failed} failed, {} readers",
            outcomes.len()
        );
    } else {
        debug!(
            "Round finished: {delivered} delivered, {} readers",
            outcomes.len()
        );
    }
}
