//! Background scheduling.
//!
//! [`PeriodicTask`] is a generic ticker + callback + graceful-shutdown hook;
//! the license revalidation job below is one user, and the same abstraction
//! drives any sibling expiry scanner. A run that panics or fails is logged
//! and never terminates the task loop, let alone the host process.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::{LicenseStatus, Verdict};
use crate::service::LicenseService;

/// When a task fires.
#[derive(Debug, Clone, Copy)]
pub enum Schedule {
    /// Once per day at a fixed local wall-clock time.
    Daily { hour: u32, minute: u32 },
    /// Fixed interval between runs.
    Every(Duration),
}

impl Schedule {
    /// Delay until the next tick, from now.
    fn next_delay(&self) -> Duration {
        match self {
            Schedule::Every(interval) => *interval,
            Schedule::Daily { hour, minute } => {
                let now = Local::now();
                let today = now
                    .date_naive()
                    .and_hms_opt(*hour, *minute, 0)
                    .and_then(|dt| dt.and_local_timezone(Local).earliest());

                let Some(today) = today else {
                    // Nonexistent local time (DST gap); try again in an hour.
                    return Duration::from_secs(3600);
                };

                let target = if today > now {
                    today
                } else {
                    today + chrono::Duration::days(1)
                };

                (target - now).to_std().unwrap_or(Duration::from_secs(60))
            }
        }
    }
}

/// A named background loop: tick on a schedule, run the callback, stop when
/// the shutdown channel fires.
pub struct PeriodicTask;

impl PeriodicTask {
    /// Spawn the loop. With `run_on_start`, the callback also runs once
    /// immediately, so a fresh deploy does not wait for the first tick.
    pub fn spawn<F, Fut>(
        name: &'static str,
        schedule: Schedule,
        run_on_start: bool,
        mut shutdown: watch::Receiver<bool>,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            tracing::info!("{} task started", name);

            if run_on_start {
                run_guarded(name, &callback).await;
            }

            loop {
                let delay = schedule.next_delay();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        run_guarded(name, &callback).await;
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("{} task stopping", name);
                        break;
                    }
                }
            }
        })
    }
}

async fn run_guarded<F, Fut>(name: &'static str, callback: &F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    if AssertUnwindSafe(callback())
        .catch_unwind()
        .await
        .is_err()
    {
        tracing::error!("{} task run panicked", name);
    }
}

/// Delivery channel for expiry warnings. The actual mechanism (admin
/// notification, email, webhook) is an external collaborator; the default
/// just logs.
pub trait ExpiryNotifier: Send + Sync {
    fn expiry_warning(&self, verdict: &Verdict, days_left: i64);
}

pub struct LogNotifier;

impl ExpiryNotifier for LogNotifier {
    fn expiry_warning(&self, verdict: &Verdict, days_left: i64) {
        tracing::warn!(
            company = verdict.company.as_deref().unwrap_or("unknown"),
            days_left,
            "License expires soon"
        );
    }
}

/// Emits at most one expiry warning per local day *per deadline*: a startup
/// check and the daily tick landing on the same day do not double-notify, but
/// a license replaced mid-day with a different near-expiry deadline still
/// warns for the new one.
pub struct ExpiryWarner {
    notifier: Arc<dyn ExpiryNotifier>,
    warn_days: i64,
    last_warned: Mutex<Option<(NaiveDate, Option<i64>)>>,
}

impl ExpiryWarner {
    pub fn new(notifier: Arc<dyn ExpiryNotifier>, warn_days: i64) -> Self {
        Self {
            notifier,
            warn_days,
            last_warned: Mutex::new(None),
        }
    }

    pub fn maybe_warn(&self, verdict: &Verdict, days_left: i64) {
        if days_left <= 0 || days_left > self.warn_days {
            return;
        }

        let key = (Local::now().date_naive(), verdict.valid_until);
        let Ok(mut last) = self.last_warned.lock() else {
            return;
        };
        if *last == Some(key) {
            return;
        }
        *last = Some(key);

        self.notifier.expiry_warning(verdict, days_left);
    }
}

/// One scheduled run: revalidate (the orchestrator decides whether a remote
/// call is needed) and emit an expiry warning when inside the warn window.
pub async fn run_license_check(service: &LicenseService, warner: &ExpiryWarner) {
    let verdict = service.check_license().await;

    if verdict.status == LicenseStatus::Missing {
        tracing::debug!("Scheduled license check: no license installed");
        return;
    }

    tracing::debug!(status = %verdict.status, "Scheduled license check completed");

    if let Some(days_left) = LicenseService::days_until_expiry(&verdict) {
        warner.maybe_warn(&verdict, days_left);
    }
}

/// Wire the daily license job onto a [`PeriodicTask`].
pub fn spawn_license_task(
    service: Arc<LicenseService>,
    warner: Arc<ExpiryWarner>,
    check_hour: u32,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    PeriodicTask::spawn(
        "license-check",
        Schedule::Daily {
            hour: check_hour,
            minute: 0,
        },
        true,
        shutdown,
        move || {
            let service = service.clone();
            let warner = warner.clone();
            async move {
                run_license_check(&service, &warner).await;
            }
        },
    )
}
