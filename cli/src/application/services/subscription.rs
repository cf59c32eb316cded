//! Application service: subscription transitions.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! Bound instances are driven exclusively through `InstanceControl`; this
//! module never writes instance state.

use anyhow::{Context, Result};
use microsaas_common::{InstanceState, SubscriptionState};

use crate::application::ports::{Clock, InstanceControl, PlatformStateStore};
use crate::domain::subscription::Subscription;

/// A subscription after a transition, with what happened to its instance.
#[derive(Debug, Clone)]
pub struct Transition {
    pub subscription: Subscription,
    /// Instance state after the side effect, when one ran.
    pub instance: Option<(String, InstanceState)>,
}

/// `draft → active`, then start the bound instance unless it is running.
///
/// # Errors
///
/// Unknown reference, invalid transition, or the instance failing to start.
pub async fn activate(
    store: &impl PlatformStateStore,
    clock: &impl Clock,
    instances: &impl InstanceControl,
    reference: &str,
) -> Result<Transition> {
    let subscription = update(store, reference, |sub| {
        sub.activate(clock.today()).map(|_| ())
    })
    .await?;
    let instance = drive_instance(instances, &subscription, |s| s != InstanceState::Running, true)
        .await?;
    Ok(Transition {
        subscription,
        instance,
    })
}

/// `draft|active|expiring_soon → cancelled`, then stop a running instance.
///
/// # Errors
///
/// Unknown reference, invalid transition, or the instance failing to stop.
pub async fn cancel(
    store: &impl PlatformStateStore,
    instances: &impl InstanceControl,
    reference: &str,
) -> Result<Transition> {
    let subscription = update(store, reference, |sub| sub.cancel().map(|_| ())).await?;
    let instance = drive_instance(instances, &subscription, |s| s == InstanceState::Running, false)
        .await?;
    Ok(Transition {
        subscription,
        instance,
    })
}

/// Extend by one plan period and return to `active`; a stopped bound
/// instance is started again.
///
/// # Errors
///
/// `NoDurationConfigured`, invalid transition, unknown reference, or the
/// instance failing to start.
pub async fn renew(
    store: &impl PlatformStateStore,
    clock: &impl Clock,
    instances: &impl InstanceControl,
    reference: &str,
) -> Result<Transition> {
    let subscription = update(store, reference, |sub| {
        sub.renew(clock.today(), None, clock.now()).map(|_| ())
    })
    .await?;
    let instance = restart_if_stopped(instances, &subscription).await?;
    Ok(Transition {
        subscription,
        instance,
    })
}

/// Start the bound instance of a freshly renewed subscription if it is stopped.
pub(crate) async fn restart_if_stopped(
    instances: &impl InstanceControl,
    subscription: &Subscription,
) -> Result<Option<(String, InstanceState)>> {
    drive_instance(instances, subscription, |s| s == InstanceState::Stopped, true).await
}

/// Hook run by the supervisor after an instance reaches `running`: any
/// `draft` subscription bound to it becomes `active`. Returns the
/// activated references.
///
/// # Errors
///
/// A state store failure.
pub async fn activate_draft_for_instance(
    store: &impl PlatformStateStore,
    clock: &impl Clock,
    instance: &str,
) -> Result<Vec<String>> {
    let _lock = store.lock().await?;
    let mut state = store.load_async().await?;
    let today = clock.today();
    let mut activated = Vec::new();
    for reference in state.subscriptions_bound_to(instance) {
        let sub = state.subscription_mut(&reference)?;
        if sub.state == SubscriptionState::Draft {
            sub.activate(today)?;
            activated.push(reference);
        }
    }
    if !activated.is_empty() {
        store.save_async(&state).await?;
    }
    Ok(activated)
}

/// Hook run by the supervisor after an instance stops. Informational only:
/// subscription state is left as is.
///
/// # Errors
///
/// A state store failure.
pub async fn pause_notice_for_instance(
    store: &impl PlatformStateStore,
    instance: &str,
) -> Result<Vec<String>> {
    let state = store.load_async().await?;
    let bound = state.subscriptions_bound_to(instance);
    for reference in &bound {
        tracing::info!(%instance, subscription = %reference, "service paused for subscription");
    }
    Ok(bound)
}

async fn update<F>(store: &impl PlatformStateStore, reference: &str, apply: F) -> Result<Subscription>
where
    F: FnOnce(&mut Subscription) -> Result<(), crate::domain::error::SubscriptionError>,
{
    let _lock = store.lock().await?;
    let mut state = store.load_async().await?;
    let sub = state.subscription_mut(reference)?;
    let before = sub.state;
    apply(sub)?;
    let snapshot = sub.clone();
    store.save_async(&state).await?;
    tracing::info!(
        subscription = %reference,
        from = %before,
        to = %snapshot.state,
        "subscription transition"
    );
    Ok(snapshot)
}

async fn drive_instance(
    instances: &impl InstanceControl,
    subscription: &Subscription,
    when: impl Fn(InstanceState) -> bool,
    start: bool,
) -> Result<Option<(String, InstanceState)>> {
    let Some(name) = subscription.instance.as_deref() else {
        return Ok(None);
    };
    let Some(current) = instances.instance_state(name).await? else {
        tracing::warn!(subscription = %subscription.reference, instance = %name, "bound instance no longer exists");
        return Ok(None);
    };
    if !when(current) {
        return Ok(None);
    }
    let settled = if start {
        instances.start_instance(name).await
    } else {
        instances.stop_instance(name).await
    }
    .with_context(|| {
        format!(
            "subscription {} is {}, but instance '{name}' could not be {}",
            subscription.reference,
            subscription.state,
            if start { "started" } else { "stopped" }
        )
    })?;
    Ok(Some((name.to_string(), settled)))
}
