//! Subscription transitions, the expiry sweep, and their effect on instances.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{Days, Months, NaiveDate};
use microsaas_cli::application::services::billing_intake::create_subscription;
use microsaas_cli::application::services::expiry_sweep::sweep;
use microsaas_cli::application::services::instance_supervisor::NewInstance;
use microsaas_cli::application::services::subscription::{activate, cancel, renew};
use microsaas_cli::domain::error::SubscriptionError;
use microsaas_cli::domain::subscription::{Plan, Subscription};
use microsaas_common::{InstanceState, SubscriptionState};

use crate::helpers::{Reply, World, monthly_plan, paid_invoice};

const REF: &str = "SUB/2026/0001";
const WINDOW: u32 = 7;

fn today(world: &World) -> NaiveDate {
    use microsaas_cli::application::ports::Clock;
    world.clock.today()
}

/// Insert a subscription in `state` whose end date is `end`.
fn subscription_ending(
    world: &World,
    state: SubscriptionState,
    end: NaiveDate,
    instance: Option<&str>,
) {
    world.store.edit(|platform| {
        let mut sub = Subscription::new(REF.into(), "acme-co".into(), monthly_plan());
        sub.state = state;
        sub.start_date = Some(end - Months::new(1));
        sub.end_date_override = Some(end);
        sub.instance = instance.map(str::to_string);
        platform.subscriptions.insert(REF.into(), sub);
    });
}

async fn running_instance(world: &World) {
    let sup = world.supervisor();
    sup.create(NewInstance {
        name: "acme".into(),
        ..NewInstance::default()
    })
    .await
    .unwrap();
    sup.start("acme").await.unwrap();
}

fn sub_state(world: &World) -> SubscriptionState {
    world.state().subscription(REF).unwrap().state
}

fn instance_state(world: &World) -> InstanceState {
    world.state().instance("acme").unwrap().state
}

// ── activate / cancel ────────────────────────────────────────────────────────

#[tokio::test]
async fn activate_starts_the_bound_instance() {
    let world = World::new();
    world
        .supervisor()
        .create(NewInstance {
            name: "acme".into(),
            ..NewInstance::default()
        })
        .await
        .unwrap();
    world.store.edit(|platform| {
        let mut sub = Subscription::new(REF.into(), "acme-co".into(), monthly_plan());
        sub.instance = Some("acme".into());
        platform.subscriptions.insert(REF.into(), sub);
    });

    let sup = world.supervisor();
    let transition = activate(&world.store, &world.clock, &sup, REF).await.unwrap();

    assert_eq!(transition.subscription.state, SubscriptionState::Active);
    assert_eq!(transition.subscription.start_date, Some(today(&world)));
    assert_eq!(
        transition.instance,
        Some(("acme".to_string(), InstanceState::Running))
    );
    assert_eq!(instance_state(&world), InstanceState::Running);
}

#[tokio::test]
async fn activate_without_instance_only_changes_state() {
    let world = World::new();
    world.store.edit(|platform| {
        let sub = Subscription::new(REF.into(), "acme-co".into(), monthly_plan());
        platform.subscriptions.insert(REF.into(), sub);
    });

    let sup = world.supervisor();
    let transition = activate(&world.store, &world.clock, &sup, REF).await.unwrap();

    assert_eq!(transition.instance, None);
    assert!(world.runtime.calls().is_empty());
}

#[tokio::test]
async fn activate_during_expiry_window_restarts_stopped_instance() {
    let world = World::new();
    running_instance(&world).await;
    world.supervisor().stop("acme").await.unwrap();
    let end = today(&world) + Days::new(4);
    subscription_ending(&world, SubscriptionState::ExpiringSoon, end, Some("acme"));

    let sup = world.supervisor();
    let transition = activate(&world.store, &world.clock, &sup, REF).await.unwrap();

    assert_eq!(transition.subscription.state, SubscriptionState::Active);
    assert_eq!(transition.subscription.end_date(), Some(end));
    assert_eq!(instance_state(&world), InstanceState::Running);
}

#[tokio::test]
async fn cancel_stops_a_running_instance() {
    let world = World::new();
    running_instance(&world).await;
    subscription_ending(
        &world,
        SubscriptionState::Active,
        today(&world) + Days::new(20),
        Some("acme"),
    );

    let sup = world.supervisor();
    let transition = cancel(&world.store, &sup, REF).await.unwrap();

    assert_eq!(transition.subscription.state, SubscriptionState::Cancelled);
    assert_eq!(instance_state(&world), InstanceState::Stopped);
}

#[tokio::test]
async fn cancel_of_expired_subscription_is_rejected() {
    let world = World::new();
    subscription_ending(
        &world,
        SubscriptionState::Expired,
        today(&world) - Days::new(3),
        None,
    );

    let sup = world.supervisor();
    let err = cancel(&world.store, &sup, REF).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<SubscriptionError>(),
        Some(SubscriptionError::InvalidTransition {
            from: SubscriptionState::Expired,
            ..
        })
    ));
}

// ── sweep ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sweep_expires_overdue_subscription_and_stops_its_instance() {
    let world = World::new();
    running_instance(&world).await;
    subscription_ending(
        &world,
        SubscriptionState::Active,
        today(&world) - Days::new(1),
        Some("acme"),
    );

    let sup = world.supervisor();
    let report = sweep(&world.store, &world.clock, &sup, WINDOW).await.unwrap();

    assert_eq!(report.expired, vec![REF.to_string()]);
    assert_eq!(report.stopped, vec!["acme".to_string()]);
    assert_eq!(sub_state(&world), SubscriptionState::Expired);
    assert_eq!(instance_state(&world), InstanceState::Stopped);
}

#[tokio::test]
async fn sweep_leaves_instance_running_for_its_new_subscription() {
    let world = World::new();
    running_instance(&world).await;
    subscription_ending(
        &world,
        SubscriptionState::Expired,
        today(&world) - Days::new(10),
        None,
    );
    world.store.edit(|platform| {
        platform.subscriptions.get_mut(REF).unwrap().instance = Some("acme".into());
        platform.sequence = 1;
    });

    let document = paid_invoice("inv-9", "Acme-Co", monthly_plan());
    let fresh = create_subscription(&world.store, &world.clock, document, Some("acme".into()))
        .await
        .unwrap();
    let sup = world.supervisor();
    activate(&world.store, &world.clock, &sup, &fresh.reference)
        .await
        .unwrap();

    let report = sweep(&world.store, &world.clock, &sup, WINDOW).await.unwrap();

    assert!(report.stopped.is_empty());
    assert_eq!(instance_state(&world), InstanceState::Running);
    let state = world.state();
    assert_eq!(state.subscription(REF).unwrap().instance, None);
    assert_eq!(
        state.subscription(&fresh.reference).unwrap().instance.as_deref(),
        Some("acme")
    );
}

#[tokio::test]
async fn sweep_spares_instance_an_active_subscription_holds() {
    let world = World::new();
    running_instance(&world).await;
    subscription_ending(
        &world,
        SubscriptionState::Expired,
        today(&world) - Days::new(10),
        Some("acme"),
    );
    let started = today(&world);
    world.store.edit(|platform| {
        let mut other = Subscription::new("SUB/2026/0002".into(), "acme-co".into(), monthly_plan());
        other.state = SubscriptionState::Active;
        other.start_date = Some(started);
        other.instance = Some("acme".into());
        platform.subscriptions.insert(other.reference.clone(), other);
    });

    let sup = world.supervisor();
    let report = sweep(&world.store, &world.clock, &sup, WINDOW).await.unwrap();

    assert!(report.stopped.is_empty(), "instance held by an active subscription was stopped");
    assert_eq!(instance_state(&world), InstanceState::Running);
}

#[tokio::test]
async fn sweep_flags_subscription_ending_within_window() {
    let world = World::new();
    subscription_ending(
        &world,
        SubscriptionState::Active,
        today(&world) + Days::new(3),
        None,
    );

    let sup = world.supervisor();
    let report = sweep(&world.store, &world.clock, &sup, WINDOW).await.unwrap();

    assert_eq!(report.expiring_soon, vec![REF.to_string()]);
    assert_eq!(sub_state(&world), SubscriptionState::ExpiringSoon);
}

#[tokio::test]
async fn sweep_window_bounds_are_inclusive() {
    for (offset, expected) in [
        (0, SubscriptionState::ExpiringSoon),
        (7, SubscriptionState::ExpiringSoon),
        (8, SubscriptionState::Active),
    ] {
        let world = World::new();
        subscription_ending(
            &world,
            SubscriptionState::Active,
            today(&world) + Days::new(offset),
            None,
        );

        let sup = world.supervisor();
        sweep(&world.store, &world.clock, &sup, WINDOW).await.unwrap();

        assert_eq!(sub_state(&world), expected, "end date today+{offset}");
    }
}

#[tokio::test]
async fn expiring_soon_subscription_expires_once_past_end() {
    let world = World::new();
    subscription_ending(
        &world,
        SubscriptionState::ExpiringSoon,
        today(&world) - Days::new(1),
        None,
    );

    let sup = world.supervisor();
    let report = sweep(&world.store, &world.clock, &sup, WINDOW).await.unwrap();

    assert_eq!(report.expired, vec![REF.to_string()]);
    assert!(report.expiring_soon.is_empty());
}

#[tokio::test]
async fn sweep_twice_on_the_same_day_changes_nothing_more() {
    let world = World::new();
    running_instance(&world).await;
    subscription_ending(
        &world,
        SubscriptionState::Active,
        today(&world) - Days::new(2),
        Some("acme"),
    );

    let sup = world.supervisor();
    sweep(&world.store, &world.clock, &sup, WINDOW).await.unwrap();
    let after_first = world.state();
    let saves = world.store.saves();

    let second = sweep(&world.store, &world.clock, &sup, WINDOW).await.unwrap();

    assert!(second.expired.is_empty());
    assert!(second.expiring_soon.is_empty());
    assert!(second.stopped.is_empty());
    assert_eq!(world.store.saves(), saves);
    assert_eq!(world.state(), after_first);
}

#[tokio::test]
async fn failed_stop_is_reported_and_retried_next_sweep() {
    let world = World::new();
    running_instance(&world).await;
    subscription_ending(
        &world,
        SubscriptionState::Active,
        today(&world) - Days::new(1),
        Some("acme"),
    );
    world.runtime.on_down(Reply::Exit(1, "daemon not responding".into()));

    let sup = world.supervisor();
    let first = sweep(&world.store, &world.clock, &sup, WINDOW).await.unwrap();
    assert_eq!(first.failures.len(), 1);
    assert_eq!(sub_state(&world), SubscriptionState::Expired);
    assert_eq!(instance_state(&world), InstanceState::Running);

    world.runtime.on_down(Reply::Ok);
    let second = sweep(&world.store, &world.clock, &sup, WINDOW).await.unwrap();

    assert_eq!(second.stopped, vec!["acme".to_string()]);
    assert_eq!(instance_state(&world), InstanceState::Stopped);
}

// ── renew ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn renew_of_long_expired_subscription_counts_from_today() {
    let world = World::new();
    running_instance(&world).await;
    world.supervisor().stop("acme").await.unwrap();
    let today = today(&world);
    subscription_ending(
        &world,
        SubscriptionState::Expired,
        today - Days::new(10),
        Some("acme"),
    );

    let sup = world.supervisor();
    let transition = renew(&world.store, &world.clock, &sup, REF).await.unwrap();

    assert_eq!(
        transition.subscription.end_date(),
        Some(today + Months::new(1))
    );
    assert_eq!(transition.subscription.state, SubscriptionState::Active);
    assert_eq!(transition.subscription.renewals.len(), 1);
    assert_eq!(
        transition.subscription.renewals[0].previous_end,
        Some(today - Days::new(10))
    );
    assert_eq!(instance_state(&world), InstanceState::Running);
}

#[tokio::test]
async fn renew_keeps_unused_days() {
    let world = World::new();
    let end = today(&world) + Days::new(5);
    subscription_ending(&world, SubscriptionState::ExpiringSoon, end, None);

    let sup = world.supervisor();
    let transition = renew(&world.store, &world.clock, &sup, REF).await.unwrap();

    assert_eq!(transition.subscription.end_date(), Some(end + Months::new(1)));
}

#[tokio::test]
async fn renew_leaves_running_instance_alone() {
    let world = World::new();
    running_instance(&world).await;
    subscription_ending(
        &world,
        SubscriptionState::Active,
        today(&world) + Days::new(2),
        Some("acme"),
    );
    let calls_before = world.runtime.calls().len();

    let sup = world.supervisor();
    let transition = renew(&world.store, &world.clock, &sup, REF).await.unwrap();

    assert_eq!(transition.instance, None);
    assert_eq!(world.runtime.calls().len(), calls_before);
}

#[tokio::test]
async fn renew_without_plan_duration_fails() {
    let world = World::new();
    world.store.edit(|platform| {
        let mut sub = Subscription::new(
            REF.into(),
            "acme-co".into(),
            Plan {
                id: "p-open".into(),
                name: "Open ended".into(),
                duration: None,
            },
        );
        sub.state = SubscriptionState::Active;
        platform.subscriptions.insert(REF.into(), sub);
    });

    let sup = world.supervisor();
    let err = renew(&world.store, &world.clock, &sup, REF).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<SubscriptionError>(),
        Some(SubscriptionError::NoDurationConfigured { .. })
    ));
    assert!(world.state().subscription(REF).unwrap().renewals.is_empty());
}

#[tokio::test]
async fn renew_of_draft_is_rejected() {
    let world = World::new();
    world.store.edit(|platform| {
        let sub = Subscription::new(REF.into(), "acme-co".into(), monthly_plan());
        platform.subscriptions.insert(REF.into(), sub);
    });

    let sup = world.supervisor();
    let err = renew(&world.store, &world.clock, &sup, REF).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<SubscriptionError>(),
        Some(SubscriptionError::InvalidTransition { .. })
    ));
}
