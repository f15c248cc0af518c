//! # Async Driver
//!
//! Runs a [`Session`] on a tokio interval until told to stop.
//!
//! Missed ticks are skipped, not burst: a stalled runtime resumes at the
//! normal rate and the session simply sees a later `now`. The session still
//! owns all state; the driver only supplies the clock.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::geometry::GeometryQuery;
use crate::movement::PhysicsModel;
use crate::replication::ReplicationChannel;
use crate::server::Session;

/// What a driver run did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DriverReport {
    /// Ticks simulated
    pub ticks: u64,
    /// Commands applied across all ticks
    pub applied: u64,
    /// Shots accepted across all ticks
    pub shots: u64,
}

/// Ticks `session` at its configured rate until `shutdown` flips to `true`
/// or its sender is dropped.
pub async fn run<R, G, P>(
    session: &mut Session<R, G, P>,
    mut shutdown: watch::Receiver<bool>,
) -> DriverReport
where
    R: ReplicationChannel,
    G: GeometryQuery,
    P: PhysicsModel,
{
    let tick_rate = session.config().simulation.tick_rate.max(1);
    let tick_duration = Duration::from_micros(1_000_000 / u64::from(tick_rate));
    let mut ticker = interval(tick_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut report = DriverReport::default();
    tracing::info!(tick_rate, "session driver started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let summary = session.tick();
                report.ticks += 1;
                report.applied += u64::from(summary.applied);
                report.shots += u64::from(summary.shots);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!(
        ticks = report.ticks,
        applied = report.applied,
        shots = report.shots,
        "session driver stopped"
    );
    report
}
