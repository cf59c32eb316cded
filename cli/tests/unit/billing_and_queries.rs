//! Billing document intake, portal queries, and the template catalog.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::Months;
use microsaas_cli::application::services::billing_intake::{
    create_subscription, instance_from_document, renew_subscription,
};
use microsaas_cli::application::services::instance_supervisor::NewInstance;
use microsaas_cli::application::services::queries::{
    all_subscriptions, customer_page, customer_subscription, instance_summaries,
};
use microsaas_cli::application::services::templates::{list_templates, save_template, show_template};
use microsaas_cli::domain::error::{InstanceError, SubscriptionError, ValidationError};
use microsaas_cli::domain::instance::PublicEndpoint;
use microsaas_cli::domain::subscription::{Plan, Subscription};
use microsaas_cli::domain::template::DEFAULT_TEMPLATE_NAME;
use microsaas_common::{DurationClass, InstanceState, SubscriptionState};

use crate::helpers::{World, date, monthly_plan, paid_invoice};

fn endpoint() -> PublicEndpoint {
    PublicEndpoint::BaseUrl("http://localhost:8069".into())
}

fn validation(err: &anyhow::Error) -> &ValidationError {
    err.downcast_ref::<ValidationError>()
        .expect("expected a ValidationError")
}

// ── create_subscription ──────────────────────────────────────────────────────

#[tokio::test]
async fn paid_invoice_creates_draft_subscription() {
    let world = World::new();
    let doc = paid_invoice("inv-1", "Acme", monthly_plan());

    let sub = create_subscription(&world.store, &world.clock, doc, None)
        .await
        .unwrap();

    assert_eq!(sub.reference, "SUB/2026/0001");
    assert_eq!(sub.state, SubscriptionState::Draft);
    assert_eq!(sub.customer, "acme");
    assert_eq!(sub.document.as_deref(), Some("inv-1"));
    assert_eq!(sub.instance, None);
    let state = world.state();
    assert!(state.documents.contains_key("inv-1"));
    assert_eq!(state.subscriptions.len(), 1);
}

#[tokio::test]
async fn rejected_documents_leave_state_untouched() {
    let world = World::new();
    let mut unpaid = paid_invoice("inv-1", "Acme", monthly_plan());
    unpaid.paid = false;
    let mut vendor_bill = paid_invoice("inv-2", "Acme", monthly_plan());
    vendor_bill.move_type = "in_invoice".into();
    let mut anonymous = paid_invoice("inv-3", "Acme", monthly_plan());
    anonymous.customer = None;
    let mut two_plans = paid_invoice("inv-4", "Acme", monthly_plan());
    two_plans.lines.push(two_plans.lines[0].clone());
    let open_ended = paid_invoice(
        "inv-5",
        "Acme",
        Plan {
            id: "plan-open".into(),
            name: "Open".into(),
            duration: None,
        },
    );

    for doc in [unpaid, vendor_bill, anonymous, two_plans, open_ended] {
        let err = create_subscription(&world.store, &world.clock, doc, None)
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<ValidationError>().is_some(), "{err:#}");
    }

    assert_eq!(world.store.saves(), 0);
    assert!(world.state().subscriptions.is_empty());
}

#[tokio::test]
async fn document_converts_only_once() {
    let world = World::new();
    let doc = paid_invoice("inv-1", "Acme", monthly_plan());
    create_subscription(&world.store, &world.clock, doc.clone(), None)
        .await
        .unwrap();

    let err = create_subscription(&world.store, &world.clock, doc, None)
        .await
        .unwrap_err();

    assert!(matches!(
        validation(&err),
        ValidationError::AlreadyConverted { reference, .. } if reference == "SUB/2026/0001"
    ));
    assert_eq!(world.state().subscriptions.len(), 1);
}

#[tokio::test]
async fn subscription_binds_to_instance_created_from_same_document() {
    let world = World::new();
    world
        .supervisor()
        .create(NewInstance {
            name: "acme".into(),
            customer: Some("acme".into()),
            document: Some("inv-1".into()),
            ..NewInstance::default()
        })
        .await
        .unwrap();

    let sub = create_subscription(
        &world.store,
        &world.clock,
        paid_invoice("inv-1", "Acme", monthly_plan()),
        None,
    )
    .await
    .unwrap();

    assert_eq!(sub.instance.as_deref(), Some("acme"));
}

#[tokio::test]
async fn explicit_instance_must_exist() {
    let world = World::new();

    let err = create_subscription(
        &world.store,
        &world.clock,
        paid_invoice("inv-1", "Acme", monthly_plan()),
        Some("ghost".into()),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<InstanceError>(),
        Some(InstanceError::NotFound(_))
    ));
}

#[tokio::test]
async fn instance_serves_one_unfinished_subscription_at_a_time() {
    let world = World::new();
    world
        .supervisor()
        .create(NewInstance {
            name: "acme".into(),
            ..NewInstance::default()
        })
        .await
        .unwrap();
    let first = create_subscription(
        &world.store,
        &world.clock,
        paid_invoice("inv-1", "Acme", monthly_plan()),
        Some("acme".into()),
    )
    .await
    .unwrap();
    let before = world.state();

    let err = create_subscription(
        &world.store,
        &world.clock,
        paid_invoice("inv-2", "Acme", monthly_plan()),
        Some("acme".into()),
    )
    .await
    .unwrap_err();

    assert_eq!(
        validation(&err),
        &ValidationError::InstanceAlreadyBound {
            instance: "acme".into(),
            reference: first.reference.clone(),
        }
    );
    assert_eq!(world.state(), before);
}

#[tokio::test]
async fn references_follow_a_sequence() {
    let world = World::new();
    for id in ["inv-1", "inv-2", "inv-3"] {
        create_subscription(
            &world.store,
            &world.clock,
            paid_invoice(id, "Acme", monthly_plan()),
            None,
        )
        .await
        .unwrap();
    }

    let refs: Vec<String> = world.state().subscriptions.keys().cloned().collect();
    assert_eq!(refs, ["SUB/2026/0001", "SUB/2026/0002", "SUB/2026/0003"]);
}

// ── renew_subscription ───────────────────────────────────────────────────────

async fn active_subscription(world: &World) -> String {
    let sub = create_subscription(
        &world.store,
        &world.clock,
        paid_invoice("inv-1", "Acme", monthly_plan()),
        None,
    )
    .await
    .unwrap();
    world.store.edit(|platform| {
        let s = platform.subscriptions.get_mut(&sub.reference).unwrap();
        s.state = SubscriptionState::Active;
        s.start_date = Some(date(2026, 2, 10));
    });
    sub.reference
}

#[tokio::test]
async fn renewal_invoice_extends_matching_subscription() {
    let world = World::new();
    let reference = active_subscription(&world).await;

    let sup = world.supervisor();
    let transition = renew_subscription(
        &world.store,
        &world.clock,
        &sup,
        paid_invoice("inv-2", "Acme", monthly_plan()),
    )
    .await
    .unwrap();

    assert_eq!(transition.subscription.reference, reference);
    let previous_end = date(2026, 2, 10) + Months::new(1);
    assert_eq!(
        transition.subscription.end_date(),
        Some(previous_end + Months::new(1))
    );
    let record = &transition.subscription.renewals[0];
    assert_eq!(record.document.as_deref(), Some("inv-2"));
    assert!(world.state().documents["inv-2"].renewal_used);
}

#[tokio::test]
async fn renewal_document_cannot_be_reused() {
    let world = World::new();
    active_subscription(&world).await;
    let sup = world.supervisor();
    let doc = paid_invoice("inv-2", "Acme", monthly_plan());
    renew_subscription(&world.store, &world.clock, &sup, doc.clone())
        .await
        .unwrap();

    // Resubmitting without the flag must not clear it.
    let err = renew_subscription(&world.store, &world.clock, &sup, doc)
        .await
        .unwrap_err();

    assert!(matches!(
        validation(&err),
        ValidationError::AlreadyUsedForRenewal(_)
    ));
    let sub = world.state().subscriptions.into_values().next().unwrap();
    assert_eq!(sub.renewals.len(), 1);
}

#[tokio::test]
async fn renewal_without_renewable_subscription_fails() {
    let world = World::new();
    let reference = active_subscription(&world).await;
    world.store.edit(|platform| {
        platform.subscriptions.get_mut(&reference).unwrap().state = SubscriptionState::Cancelled;
    });

    let sup = world.supervisor();
    let err = renew_subscription(
        &world.store,
        &world.clock,
        &sup,
        paid_invoice("inv-2", "Acme", monthly_plan()),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        validation(&err),
        ValidationError::NoRenewableSubscription { .. }
    ));
    assert!(!world.state().documents.contains_key("inv-2"));
}

#[tokio::test]
async fn renewal_for_other_plan_does_not_match() {
    let world = World::new();
    active_subscription(&world).await;
    let annual = Plan {
        id: "plan-annual".into(),
        name: "Hosting Annual".into(),
        duration: Some(DurationClass::Annual),
    };

    let sup = world.supervisor();
    let err = renew_subscription(
        &world.store,
        &world.clock,
        &sup,
        paid_invoice("inv-2", "Acme", annual),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        validation(&err),
        ValidationError::NoRenewableSubscription { .. }
    ));
}

// ── instance_from_document ───────────────────────────────────────────────────

#[tokio::test]
async fn document_suggests_instance_request() {
    let world = World::new();

    let request = instance_from_document(
        &world.store,
        paid_invoice("inv-1", "Acme", monthly_plan()),
    )
    .await
    .unwrap();

    assert_eq!(request.name, "Instance - Acme - INV/2026/inv-1");
    assert_eq!(request.customer, "acme");
    assert_eq!(request.document, "inv-1");
}

#[tokio::test]
async fn document_creates_at_most_one_instance() {
    let world = World::new();
    world
        .supervisor()
        .create(NewInstance {
            name: "acme".into(),
            document: Some("inv-1".into()),
            ..NewInstance::default()
        })
        .await
        .unwrap();

    let err = instance_from_document(
        &world.store,
        paid_invoice("inv-1", "Acme", monthly_plan()),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<InstanceError>(),
        Some(InstanceError::AlreadyExists(name)) if name == "acme"
    ));
}

// ── queries ──────────────────────────────────────────────────────────────────

fn seed_customer(world: &World) {
    world.store.edit(|platform| {
        for (n, (customer, start, state)) in [
            ("acme", date(2026, 1, 1), SubscriptionState::Active),
            ("acme", date(2026, 2, 1), SubscriptionState::Expired),
            ("acme", date(2025, 12, 1), SubscriptionState::Cancelled),
            ("acme", date(2026, 2, 15), SubscriptionState::ExpiringSoon),
            ("globex", date(2026, 2, 20), SubscriptionState::Active),
        ]
        .into_iter()
        .enumerate()
        {
            let reference = format!("SUB/2026/{:04}", n + 1);
            let mut sub = Subscription::new(reference.clone(), customer.into(), monthly_plan());
            sub.state = state;
            sub.start_date = Some(start);
            platform.subscriptions.insert(reference, sub);
        }
    });
}

#[test]
fn customer_page_lists_newest_first_without_cancelled() {
    let world = World::new();
    seed_customer(&world);
    let state = world.state();

    let page = customer_page(&state, "acme", 1, 10, &endpoint(), date(2026, 3, 1));

    assert_eq!(page.total, 3);
    let refs: Vec<&str> = page.items.iter().map(|s| s.reference.as_str()).collect();
    assert_eq!(refs, ["SUB/2026/0004", "SUB/2026/0002", "SUB/2026/0001"]);
}

#[test]
fn customer_page_paginates() {
    let world = World::new();
    seed_customer(&world);
    let state = world.state();
    let today = date(2026, 3, 1);

    let second = customer_page(&state, "acme", 2, 2, &endpoint(), today);
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].reference, "SUB/2026/0001");

    let beyond = customer_page(&state, "acme", 5, 2, &endpoint(), today);
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total, 3);

    let clamped = customer_page(&state, "acme", 0, 0, &endpoint(), today);
    assert_eq!((clamped.page, clamped.page_size), (1, 1));
}

#[test]
fn customer_cannot_see_other_customers_subscription() {
    let world = World::new();
    seed_customer(&world);
    let state = world.state();
    let today = date(2026, 3, 1);

    assert!(customer_subscription(&state, "acme", "SUB/2026/0001", &endpoint(), today).is_ok());
    assert!(matches!(
        customer_subscription(&state, "acme", "SUB/2026/0005", &endpoint(), today),
        Err(SubscriptionError::NotFound(_))
    ));
}

#[test]
fn status_reports_days_remaining() {
    let world = World::new();
    seed_customer(&world);
    let state = world.state();
    let today = date(2026, 3, 1);

    let status = customer_subscription(&state, "acme", "SUB/2026/0004", &endpoint(), today).unwrap();

    let end = date(2026, 3, 15);
    assert_eq!(status.end_date, Some(end));
    assert_eq!(status.days_remaining, Some((end - today).num_days()));
    assert_eq!(all_subscriptions(&state, &endpoint(), today).len(), 5);
}

#[tokio::test]
async fn instance_url_is_shown_only_while_running() {
    let world = World::new();
    let sup = world.supervisor();
    let instance = sup
        .create(NewInstance {
            name: "acme".into(),
            ..NewInstance::default()
        })
        .await
        .unwrap();
    world.store.edit(|platform| {
        let mut sub = Subscription::new("SUB/2026/0001".into(), "acme".into(), monthly_plan());
        sub.instance = Some("acme".into());
        platform.subscriptions.insert(sub.reference.clone(), sub);
    });
    let today = date(2026, 3, 1);

    let draft = customer_subscription(&world.state(), "acme", "SUB/2026/0001", &endpoint(), today)
        .unwrap();
    assert_eq!(draft.instance.as_ref().unwrap().url, None);

    sup.start("acme").await.unwrap();
    let running = customer_subscription(&world.state(), "acme", "SUB/2026/0001", &endpoint(), today)
        .unwrap();
    let shown = running.instance.unwrap();
    assert_eq!(shown.state, InstanceState::Running);
    assert_eq!(
        shown.url,
        Some(format!("http://localhost:{}", instance.http_port))
    );

    let rows = instance_summaries(&world.state(), &endpoint());
    assert_eq!(rows[0].url, format!("http://localhost:{}", instance.http_port));
}

// ── templates ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn builtin_template_is_listed_until_shadowed() {
    let world = World::new();

    let names: Vec<String> = list_templates(&world.store)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, [DEFAULT_TEMPLATE_NAME]);

    save_template(&world.store, DEFAULT_TEMPLATE_NAME, "image: {{IMAGE}}", "")
        .await
        .unwrap();
    let listed = list_templates(&world.store).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].compose_body, "image: {{IMAGE}}");
}

#[tokio::test]
async fn saving_template_derives_variables_and_keeps_known_values() {
    let world = World::new();
    save_template(&world.store, "slim", "image: {{IMAGE}}", "port = {{HTTP-PORT}}")
        .await
        .unwrap();
    world.store.edit(|platform| {
        let tpl = platform.templates.get_mut("slim").unwrap();
        let var = tpl.variables.iter_mut().find(|v| v.name == "IMAGE").unwrap();
        var.value = Some("odoo:17".into());
    });

    let updated = save_template(&world.store, "slim", "image: {{IMAGE}}\nenv: {{MODE}}", "")
        .await
        .unwrap();

    let names: Vec<&str> = updated.variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, ["IMAGE", "MODE"]);
    assert_eq!(updated.variables[0].value.as_deref(), Some("odoo:17"));
}

#[tokio::test]
async fn instances_keep_their_copy_of_template_variables() {
    let world = World::new();
    save_template(&world.store, "slim", "image: {{IMAGE}}", "")
        .await
        .unwrap();
    world
        .supervisor()
        .create(NewInstance {
            name: "acme".into(),
            template: Some("slim".into()),
            ..NewInstance::default()
        })
        .await
        .unwrap();

    save_template(&world.store, "slim", "image: {{OTHER}}", "")
        .await
        .unwrap();

    let instance = world.state().instances["acme"].clone();
    assert_eq!(instance.compose_template, "image: {{IMAGE}}");
    assert!(instance.variables.iter().any(|v| v.name == "IMAGE"));
    assert!(!instance.variables.iter().any(|v| v.name == "OTHER"));
}

#[tokio::test]
async fn unknown_template_is_reported() {
    let world = World::new();

    let err = show_template(&world.store, "nope").await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<InstanceError>(),
        Some(InstanceError::TemplateNotFound(_))
    ));
    assert_eq!(
        show_template(&world.store, DEFAULT_TEMPLATE_NAME)
            .await
            .unwrap()
            .name,
        DEFAULT_TEMPLATE_NAME
    );
}

