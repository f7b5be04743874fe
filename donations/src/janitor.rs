//! Background sweep that keeps tenant queues moving.
//!
//! A poller that stops calling clear would otherwise hold the active slot
//! forever. The janitor expires active donations past the timeout, promotes
//! the next queued one, and prunes dedupe ledgers and rate-limit windows.

use crate::metrics_defs::{JANITOR_SWEEP_DURATION, QUEUED_DONATIONS};
use crate::rate_limit::RateLimiter;
use crate::store::{DonationStore, SweepReport};
use shared::{gauge, histogram};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JanitorSettings {
    pub interval: Duration,
    pub active_timeout: Duration,
}

impl Default for JanitorSettings {
    fn default() -> Self {
        JanitorSettings {
            interval: Duration::from_secs(10),
            active_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
pub enum Command {
    // Run a sweep outside of the normal interval and report the result.
    Sweep(oneshot::Sender<SweepReport>),
    // Stop the worker after the current sweep.
    Shutdown,
}

struct Worker {
    store: Arc<DonationStore>,
    limiter: Arc<RateLimiter>,
    settings: JanitorSettings,
    running: Arc<AtomicBool>,
    sweeps: Arc<AtomicU64>,
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<Command>) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the first sweep happens one
        // interval after start.
        ticker.tick().await;
        self.running.store(true, Ordering::Relaxed);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                cmd = rx.recv() => match cmd {
                    Some(Command::Sweep(reply)) => {
                        let _ = reply.send(self.sweep());
                    }
                    Some(Command::Shutdown) | None => break,
                },
            }
        }

        self.running.store(false, Ordering::Relaxed);
        tracing::info!("Janitor stopped");
    }

    fn sweep(&self) -> SweepReport {
        let started = std::time::Instant::now();
        let now = Instant::now();

        let report = self.store.sweep(now, self.settings.active_timeout);
        let windows_pruned = self.limiter.prune(now);
        self.sweeps.fetch_add(1, Ordering::Relaxed);

        gauge!(QUEUED_DONATIONS).set(report.queued as f64);
        histogram!(JANITOR_SWEEP_DURATION).record(started.elapsed().as_secs_f64());

        if report.expired > 0 {
            tracing::info!(
                expired = report.expired,
                promoted = report.promoted,
                tenants = report.tenants_scanned,
                "Janitor sweep cleared stuck donations"
            );
        } else {
            tracing::debug!(
                tenants = report.tenants_scanned,
                ledgers_released = report.ledgers_released,
                orphans_dropped = report.orphans_dropped,
                windows_pruned,
                "Janitor sweep finished"
            );
        }
        report
    }
}

/// Handle to the running janitor task.
pub struct Janitor {
    tx: mpsc::Sender<Command>,
    running: Arc<AtomicBool>,
    sweeps: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl Janitor {
    /// Spawns the sweep loop on the current runtime.
    pub fn spawn(
        store: Arc<DonationStore>,
        limiter: Arc<RateLimiter>,
        settings: JanitorSettings,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<Command>(8);
        let running = Arc::new(AtomicBool::new(false));
        let sweeps = Arc::new(AtomicU64::new(0));

        let worker = Worker {
            store,
            limiter,
            settings,
            running: running.clone(),
            sweeps: sweeps.clone(),
        };
        let handle = tokio::spawn(worker.run(rx));

        Janitor {
            tx,
            running,
            sweeps,
            handle,
        }
    }

    /// Used by the readiness probe.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn sweeps_completed(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    /// Sweeps immediately. `None` if the worker has stopped.
    pub async fn sweep_now(&self) -> Option<SweepReport> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(Command::Sweep(reply_tx)).await.ok()?;
        reply_rx.await.ok()
    }

    pub async fn shutdown(self) {
        let _ = self.tx.send(Command::Shutdown).await;
        if let Err(e) = self.handle.await {
            tracing::error!("Janitor task panicked: {e}");
        }
    }
}
