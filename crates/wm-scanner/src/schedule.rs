//! Periodic background rescans.
//!
//! [`RescanScheduler`] walks every configured server's paths on a fixed
//! interval. Each round goes through
//! [`ScanOrchestrator::spawn_background_scan`], so paths still being
//! scanned from the previous round are skipped rather than doubled up.
//!
//! On cancellation no new round starts and the scheduler waits for the
//! scans already in flight, so each of them logs its outcome and saves its
//! result.

use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wm_core::{Config, ScanSettings, ScanTrigger, ScheduleConfig, ServerConfig};

use crate::client::{Credentials, DavConnector};
use crate::orchestrator::{BackgroundScan, BackgroundTally, ScanOrchestrator};

/// Rescans configured servers on a fixed interval.
#[derive(Debug)]
pub struct RescanScheduler<C> {
    service: ScanOrchestrator<C>,
    servers: Vec<ServerConfig>,
    schedule: ScheduleConfig,
    settings: ScanSettings,
}

impl<C: DavConnector> RescanScheduler<C> {
    /// Creates a scheduler for the servers, schedule, and budgets in
    /// `config`.
    #[must_use]
    pub fn new(service: ScanOrchestrator<C>, config: &Config) -> Self {
        Self {
            service,
            servers: config.servers.clone(),
            schedule: config.schedule,
            settings: config.scan,
        }
    }

    /// Starts one round: a background scan per server. Returns the handles
    /// so callers may await the tallies.
    pub fn tick(&self) -> Vec<BackgroundScan> {
        self.servers
            .iter()
            .filter(|server| !server.paths.is_empty())
            .map(|server| {
                let credentials = Credentials::new(
                    server.url.as_str(),
                    server.username.as_str(),
                    server.password.as_str(),
                );
                let scan = self.service.spawn_background_scan(
                    &credentials,
                    server.paths.as_slice(),
                    self.settings,
                    self.schedule.force_rescan,
                    ScanTrigger::Scheduled,
                );
                info!(
                    server = %server.url,
                    username = %server.username,
                    scheduled = scan.scheduled.len(),
                    skipped = scan.skipped.len(),
                    "Scheduled rescan"
                );
                scan
            })
            .collect()
    }

    /// Runs a round immediately and then every `interval` until `cancel`
    /// fires, then waits for the scans still in flight.
    pub async fn run(self, cancel: CancellationToken) {
        let period = self.schedule.interval().max(std::time::Duration::from_secs(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight = JoinSet::new();

        debug!(interval_secs = period.as_secs(), "Starting rescan scheduler");
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Rescan scheduler cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    for scan in self.tick() {
                        in_flight.spawn(scan.handle);
                    }
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    report_round(joined);
                }
            }
        }

        if !in_flight.is_empty() {
            info!(rounds = in_flight.len(), "Waiting for in-flight rescans");
        }
        while let Some(joined) = in_flight.join_next().await {
            report_round(joined);
        }
    }

    /// Spawns [`run`](Self::run) onto the runtime.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

fn report_round(joined: Result<Result<BackgroundTally, JoinError>, JoinError>) {
    match joined.and_then(|tally| tally) {
        Ok(tally) => debug!(
            succeeded = tally.succeeded,
            failed = tally.failed,
            skipped = tally.skipped,
            "Rescan round finished"
        ),
        Err(err) => warn!(error = %err, "Rescan round aborted"),
    }
}
