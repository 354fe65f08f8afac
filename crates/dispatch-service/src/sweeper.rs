//! Periodic reconciliation of bookings
//!
//! Two independent jobs:
//! - [`ForceCompletionJob`]: completes ASSIGNED trips whose expected duration
//!   has elapsed and frees their drivers
//! - [`PendingAssignmentJob`]: retries the assignment engine for every
//!   booking still waiting for a driver
//!
//! Each job walks a snapshot of the store once per tick. A failure on one
//! booking is logged and counted; the rest of the pass continues.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use cabdesk_common::{Booking, BookingStatus, Result};

use crate::assignment::{AssignOutcome, AssignmentEngine};
use crate::clock::Clock;
use crate::completion::free_driver;
use crate::storage::{BookingStore, CasOutcome, DriverRegistry, Stores};

/// Outcome counts of one force-completion pass
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionReport {
    pub scanned: usize,
    pub completed: usize,
    pub not_due: usize,
    pub failed: usize,
}

/// Outcome counts of one pending-assignment pass
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentReport {
    pub scanned: usize,
    pub assigned: usize,
    pub pending: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// A job the sweeper runs on a fixed interval
#[async_trait]
pub trait SweepJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Run one pass
    async fn tick(&self) -> Result<()>;
}

/// Pass A: force-complete overdue trips
pub struct ForceCompletionJob {
    drivers: Arc<dyn DriverRegistry>,
    bookings: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl ForceCompletionJob {
    pub fn new(stores: &Stores, clock: Arc<dyn Clock>) -> Self {
        Self {
            drivers: Arc::clone(&stores.drivers),
            bookings: Arc::clone(&stores.bookings),
            clock,
        }
    }

    pub async fn run_once(&self) -> Result<CompletionReport> {
        let assigned = self.bookings.find_by_status(BookingStatus::Assigned).await?;
        let now = self.clock.now();
        let mut report = CompletionReport {
            scanned: assigned.len(),
            ..Default::default()
        };

        for booking in assigned {
            if !booking.is_due(now) {
                report.not_due += 1;
                continue;
            }

            match self.complete_overdue(booking).await {
                Ok(true) => report.completed += 1,
                Ok(false) => {}
                Err(e) => {
                    error!("Force-completion failed: {:#}", e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Returns `Ok(true)` if this pass completed the booking
    async fn complete_overdue(&self, booking: Booking) -> Result<bool> {
        let id = booking.id;
        let Some(driver_email) = booking.driver_email.clone() else {
            warn!("Booking {} is ASSIGNED without a driver, skipping", id);
            return Ok(false);
        };

        let now = self.clock.now();
        let elapsed = booking.elapsed_minutes(now);
        let mut completed = booking;
        completed.complete(now)?;

        match self
            .bookings
            .compare_and_save(&completed, BookingStatus::Assigned)
            .await?
        {
            CasOutcome::Applied => {
                info!(
                    "Force-completed booking {} after {} min (driver {})",
                    id, elapsed, driver_email
                );
                free_driver(self.drivers.as_ref(), &driver_email).await?;
                Ok(true)
            }
            outcome => {
                debug!("Booking {} moved before force-completion ({:?})", id, outcome);
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl SweepJob for ForceCompletionJob {
    fn name(&self) -> &'static str {
        "force-completion"
    }

    async fn tick(&self) -> Result<()> {
        let report = self.run_once().await?;
        if report.completed > 0 || report.failed > 0 {
            info!(
                "Force-completion pass: {} completed, {} not due, {} failed",
                report.completed, report.not_due, report.failed
            );
        } else {
            debug!("Force-completion pass: {:?}", report);
        }
        Ok(())
    }
}

/// Pass B: retry assignment for waiting bookings
pub struct PendingAssignmentJob {
    engine: Arc<AssignmentEngine>,
    bookings: Arc<dyn BookingStore>,
}

impl PendingAssignmentJob {
    pub fn new(stores: &Stores, engine: Arc<AssignmentEngine>) -> Self {
        Self {
            engine,
            bookings: Arc::clone(&stores.bookings),
        }
    }

    pub async fn run_once(&self) -> Result<AssignmentReport> {
        let mut waiting = self.bookings.find_by_status(BookingStatus::Booked).await?;
        waiting.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut report = AssignmentReport {
            scanned: waiting.len(),
            ..Default::default()
        };

        for booking in &waiting {
            match self.engine.try_assign(booking).await {
                Ok(AssignOutcome::Assigned { .. }) => report.assigned += 1,
                Ok(AssignOutcome::Pending) => report.pending += 1,
                Ok(AssignOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    error!("Assignment failed for booking {}: {:#}", booking.id, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

#[async_trait]
impl SweepJob for PendingAssignmentJob {
    fn name(&self) -> &'static str {
        "pending-assignment"
    }

    async fn tick(&self) -> Result<()> {
        let report = self.run_once().await?;
        if report.assigned > 0 || report.failed > 0 {
            info!(
                "Pending-assignment pass: {} assigned, {} still waiting, {} failed",
                report.assigned, report.pending, report.failed
            );
        } else {
            debug!("Pending-assignment pass: {:?}", report);
        }
        Ok(())
    }
}

/// How often each job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSchedule {
    pub completion_interval: Duration,
    pub assignment_interval: Duration,
}

impl SweepSchedule {
    /// Both jobs on one cadence
    pub fn uniform(interval: Duration) -> Self {
        Self {
            completion_interval: interval,
            assignment_interval: interval,
        }
    }
}

impl Default for SweepSchedule {
    fn default() -> Self {
        Self::uniform(Duration::from_secs(30))
    }
}

/// Owns both sweep jobs and their schedule
pub struct Sweeper {
    completion: Arc<ForceCompletionJob>,
    assignment: Arc<PendingAssignmentJob>,
    schedule: SweepSchedule,
}

impl Sweeper {
    pub fn new(
        completion: Arc<ForceCompletionJob>,
        assignment: Arc<PendingAssignmentJob>,
        schedule: SweepSchedule,
    ) -> Self {
        Self {
            completion,
            assignment,
            schedule,
        }
    }

    /// Run force-completion then pending assignment once
    pub async fn run_cycle(&self) -> Result<(CompletionReport, AssignmentReport)> {
        let completion = self.completion.run_once().await?;
        let assignment = self.assignment.run_once().await?;
        Ok((completion, assignment))
    }

    /// Start both jobs on their own intervals.
    ///
    /// The loops exit once `shutdown` turns true or its sender is dropped. A
    /// pass that has already started runs to the end.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(
            "Starting sweeper (completion every {:?}, assignment every {:?})",
            self.schedule.completion_interval, self.schedule.assignment_interval
        );

        vec![
            spawn_job(
                self.completion.clone(),
                self.schedule.completion_interval,
                shutdown.clone(),
            ),
            spawn_job(
                self.assignment.clone(),
                self.schedule.assignment_interval,
                shutdown,
            ),
        ]
    }
}

fn spawn_job(
    job: Arc<dyn SweepJob>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = job.tick().await {
                        // Continue despite errors - the next tick retries
                        error!("Sweep job {} failed: {:#}", job.name(), e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Sweep job {} stopping", job.name());
                        break;
                    }
                }
            }
        }
    })
}
