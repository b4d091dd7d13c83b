//! Background update loop.
//!
//! The scheduler wakes every poll interval. A full check cycle runs at most
//! once per check interval, the first one immediately. On the develop channel
//! each wake-up also looks for a new build dropped into the data directory.
//! A failed cycle is logged and broadcast by the service; the loop carries on.

use crate::config::ScheduleSettings;
use crate::core::UpdateError;
use crate::upgrade::UpdateChannel;
use crate::upgrade::service::{UpdateOutcome, UpdateService};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// "At most once per interval" gate. The first call always passes.
#[derive(Debug, Clone)]
pub struct IntervalLimiter {
    interval: Duration,
    last: Option<Instant>,
}

impl IntervalLimiter {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Whether a run may start at `now`; records the run if so.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Forget the last run so the next call passes.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: SystemTime,
}

/// Notices a new develop build at a fixed path.
///
/// A file present at startup is the baseline and never applied. A changed,
/// non-empty file is reported once it looks the same on two consecutive
/// polls, so a build still being copied in is not picked up half-written.
#[derive(Debug)]
struct DropInWatcher {
    path: PathBuf,
    baseline: Option<FileStamp>,
    pending: Option<FileStamp>,
}

impl DropInWatcher {
    async fn new(path: PathBuf) -> Self {
        let baseline = stamp(&path).await;
        debug!(path = %path.display(), present = baseline.is_some(), "Watching for develop builds");
        Self {
            path,
            baseline,
            pending: None,
        }
    }

    async fn poll(&mut self) -> bool {
        let Some(current) = stamp(&self.path).await else {
            self.pending = None;
            return false;
        };
        if Some(current) == self.baseline {
            self.pending = None;
            return false;
        }
        if Some(current) == self.pending {
            self.baseline = Some(current);
            self.pending = None;
            return true;
        }
        self.pending = Some(current);
        false
    }
}

async fn stamp(path: &std::path::Path) -> Option<FileStamp> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    if !meta.is_file() || meta.len() == 0 {
        return None;
    }
    Some(FileStamp {
        len: meta.len(),
        modified: meta.modified().ok()?,
    })
}

/// Running scheduler task.
#[derive(Debug)]
pub struct SchedulerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Cancel the loop and wait for it to exit.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Update scheduler task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

pub struct UpdateScheduler;

impl UpdateScheduler {
    /// Spawn the loop. It stops when `token` or the handle is cancelled.
    pub fn start(
        service: Arc<UpdateService>,
        schedule: &ScheduleSettings,
        token: &CancellationToken,
    ) -> SchedulerHandle {
        Self::start_with_intervals(
            service,
            schedule.check_interval(),
            schedule.poll_interval(),
            token,
        )
    }

    pub fn start_with_intervals(
        service: Arc<UpdateService>,
        check_interval: Duration,
        poll_interval: Duration,
        token: &CancellationToken,
    ) -> SchedulerHandle {
        let token = token.child_token();
        let task = tokio::spawn(run(service, check_interval, poll_interval, token.clone()));
        SchedulerHandle { token, task }
    }
}

async fn run(
    service: Arc<UpdateService>,
    check_interval: Duration,
    poll_interval: Duration,
    token: CancellationToken,
) {
    info!(
        channel = %service.channel(),
        auto_update = service.auto_update(),
        check_interval_secs = check_interval.as_secs(),
        "Update scheduler started"
    );

    let mut limiter = IntervalLimiter::new(check_interval);
    let mut watcher = if service.channel() == UpdateChannel::Develop {
        Some(DropInWatcher::new(service.drop_in_path()).await)
    } else {
        None
    };
    let mut ticker = tokio::time::interval(poll_interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if limiter.ready(Instant::now()) {
            match service.run_cycle(&token).await {
                Ok(UpdateOutcome::UpToDate(reason)) => debug!(%reason, "Cycle finished"),
                Ok(UpdateOutcome::Available(asset)) => {
                    info!(tag = %asset.last_release, "Update available, auto-update is off");
                }
                Ok(UpdateOutcome::Installed(asset)) => {
                    info!(tag = %asset.last_release, "Update installed");
                }
                Err(UpdateError::Busy) => {
                    debug!("Another update attempt is running, retrying on the next poll");
                    limiter.reset();
                }
                Err(UpdateError::Cancelled) => break,
                Err(e) => error!(kind = e.kind(), error = %e, "Update cycle failed"),
            }
        }

        if let Some(watcher) = watcher.as_mut()
            && watcher.poll().await
        {
            info!(path = %watcher.path.display(), "New develop build detected");
            match service.apply_local(&watcher.path, &token).await {
                Ok(()) => {}
                Err(UpdateError::Busy) => {
                    // retry on the next poll
                    watcher.baseline = None;
                }
                Err(e) => error!(kind = e.kind(), error = %e, "Develop update failed"),
            }
        }
    }

    info!("Update scheduler stopped");
}
