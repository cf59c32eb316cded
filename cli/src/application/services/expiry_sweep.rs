//! Application service: the daily subscription sweep.
//!
//! Safe to run any number of times per day: a second pass over the same
//! date finds nothing left to change.

use anyhow::Result;
use microsaas_common::{InstanceState, SubscriptionState};
use serde::Serialize;

use crate::application::ports::{Clock, InstanceControl, PlatformStateStore};
use crate::domain::subscription::{SweepVerdict, sweep_verdict};

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SweepReport {
    /// References moved to `expired` by this pass.
    pub expired: Vec<String>,
    /// References moved to `expiring_soon` by this pass.
    pub expiring_soon: Vec<String>,
    /// Instances stopped because their subscription is expired.
    pub stopped: Vec<String>,
    /// Instances that should have stopped but did not, with the reason.
    pub failures: Vec<(String, String)>,
}

/// Run one sweep on `clock.today()`.
///
/// Subscriptions past their end date expire first; only then are active
/// ones inside the window flagged, so one pass never applies both.
///
/// # Errors
///
/// A state store failure. Instance stop failures are reported, not raised.
pub async fn sweep(
    store: &impl PlatformStateStore,
    clock: &impl Clock,
    instances: &impl InstanceControl,
    window_days: u32,
) -> Result<SweepReport> {
    let today = clock.today();
    let lock = store.lock().await?;
    let mut state = store.load_async().await?;
    let mut report = SweepReport::default();

    for sub in state.subscriptions.values_mut() {
        if sweep_verdict(sub, today, window_days) == Some(SweepVerdict::Expire) {
            sub.state = SubscriptionState::Expired;
            report.expired.push(sub.reference.clone());
        }
    }
    for sub in state.subscriptions.values_mut() {
        if sweep_verdict(sub, today, window_days) == Some(SweepVerdict::FlagExpiringSoon) {
            sub.state = SubscriptionState::ExpiringSoon;
            report.expiring_soon.push(sub.reference.clone());
        }
    }

    // Every expired subscription, not only this pass's, so a stop that
    // failed yesterday is retried. An instance another subscription still
    // holds keeps running.
    let mut to_stop: Vec<String> = state
        .subscriptions
        .values()
        .filter(|s| s.state == SubscriptionState::Expired)
        .filter_map(|s| s.instance.clone())
        .filter(|name| state.holder_of(name).is_none())
        .collect();
    to_stop.sort();
    to_stop.dedup();

    if !report.expired.is_empty() || !report.expiring_soon.is_empty() {
        store.save_async(&state).await?;
    }
    // Stopping goes through the supervisor, which locks on its own.
    drop(lock);
    tracing::info!(
        %today,
        expired = report.expired.len(),
        expiring_soon = report.expiring_soon.len(),
        "subscription sweep"
    );

    for name in to_stop {
        match instances.instance_state(&name).await {
            Ok(Some(InstanceState::Running)) => {}
            Ok(_) => continue,
            Err(err) => {
                report.failures.push((name, format!("{err:#}")));
                continue;
            }
        }
        match instances.stop_instance(&name).await {
            Ok(_) => report.stopped.push(name),
            Err(err) => {
                tracing::warn!(instance = %name, error = %err, "could not stop expired instance");
                report.failures.push((name, format!("{err:#}")));
            }
        }
    }
    Ok(report)
}
