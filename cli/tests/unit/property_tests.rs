//! Property-based tests for port allocation, the ledger, and renewal dates.
//!
//! Uses `proptest` to verify invariants across many random inputs.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Days, NaiveDate, TimeZone, Utc};
use microsaas_cli::application::services::port_allocator::{PortRange, allocate_pair, scan};
use microsaas_cli::domain::port_ledger::PortLedger;
use microsaas_cli::domain::subscription::{Plan, Subscription, renewal_base};
use microsaas_cli::domain::template::render;
use microsaas_common::{DurationClass, PortKind, SubscriptionState};
use proptest::prelude::*;

use crate::helpers::FakeProbe;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
        .block_on(future)
}

// ============================================================================
// allocate_pair() / scan()
// ============================================================================

proptest! {
    /// A successful pair is ordered, in range, never excluded, never busy.
    #[test]
    fn prop_pair_respects_exclusions_and_probe(
        excluded in prop::collection::btree_set(9000u16..9040, 0..20),
        busy in prop::collection::vec(9000u16..9040, 0..20),
    ) {
        let range = PortRange::new(9000, 9039).unwrap();
        let probe = FakeProbe::busy(&busy);

        if let Ok((primary, secondary)) = block_on(allocate_pair(&probe, range, &excluded)) {
            prop_assert!(primary < secondary);
            prop_assert!(secondary <= range.end);
            for port in [primary, secondary] {
                prop_assert!(!excluded.contains(&port), "excluded port {port} returned");
                prop_assert!(!busy.contains(&port), "busy port {port} returned");
            }
        }
    }

    /// The primary is the lowest candidate that is neither excluded nor busy.
    #[test]
    fn prop_primary_is_lowest_free(
        excluded in prop::collection::btree_set(9000u16..9010, 0..5),
    ) {
        let range = PortRange::new(9000, 9039).unwrap();
        let probe = FakeProbe::default();

        let (primary, _) = block_on(allocate_pair(&probe, range, &excluded)).unwrap();

        let expected = (9000u16..).find(|p| !excluded.contains(p)).unwrap();
        prop_assert_eq!(primary, expected);
    }

    /// Scan never returns more than asked and only returns allowed ports.
    #[test]
    fn prop_scan_is_bounded(
        excluded in prop::collection::btree_set(9000u16..9020, 0..10),
        max in 0usize..25,
    ) {
        let range = PortRange::new(9000, 9019).unwrap();
        let probe = FakeProbe::default();

        let free = block_on(scan(&probe, range, &excluded, max));

        prop_assert!(free.len() <= max);
        prop_assert!(free.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(free.iter().all(|p| !excluded.contains(p)));
    }
}

// ============================================================================
// PortLedger
// ============================================================================

#[derive(Debug, Clone)]
enum LedgerOp {
    Reserve(u16, usize),
    Release(u16),
    ReleaseOwner(usize),
}

fn ledger_op() -> impl Strategy<Value = LedgerOp> {
    prop_oneof![
        (8000u16..8006, 0usize..3).prop_map(|(p, o)| LedgerOp::Reserve(p, o)),
        (8000u16..8006).prop_map(LedgerOp::Release),
        (0usize..3).prop_map(LedgerOp::ReleaseOwner),
    ]
}

proptest! {
    /// Under any sequence of operations, each (port, kind) has at most one
    /// record, and an active record's owner is whoever reserved it last
    /// while it was free.
    #[test]
    fn prop_ledger_never_double_books(ops in prop::collection::vec(ledger_op(), 0..60)) {
        const OWNERS: [&str; 3] = ["alpha", "beta", "gamma"];
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut ledger = PortLedger::default();
        let mut model: BTreeMap<u16, Option<&str>> = BTreeMap::new();

        for op in ops {
            match op {
                LedgerOp::Reserve(port, owner) => {
                    let name = OWNERS[owner];
                    let result = ledger.reserve(port, PortKind::Primary, name, now);
                    match model.get(&port).copied().flatten() {
                        Some(holder) if holder != name => prop_assert!(result.is_err()),
                        _ => {
                            prop_assert!(result.is_ok());
                            model.insert(port, Some(name));
                        }
                    }
                }
                LedgerOp::Release(port) => {
                    let result = ledger.release(port, PortKind::Primary, now);
                    prop_assert_eq!(result.is_ok(), model.contains_key(&port));
                    if let Some(slot) = model.get_mut(&port) {
                        *slot = None;
                    }
                }
                LedgerOp::ReleaseOwner(owner) => {
                    ledger.release_owned_by(OWNERS[owner], now);
                    for slot in model.values_mut() {
                        if *slot == Some(OWNERS[owner]) {
                            *slot = None;
                        }
                    }
                }
            }
        }

        let active: BTreeSet<u16> = model
            .iter()
            .filter_map(|(port, owner)| owner.map(|_| *port))
            .collect();
        prop_assert_eq!(ledger.active_ports(), active);
        prop_assert_eq!(ledger.records().len(), model.len());
        for record in ledger.records() {
            prop_assert_eq!(record.active, record.released_at.is_none());
        }
    }
}

// ============================================================================
// Renewal dates
// ============================================================================

fn day_in_2026() -> impl Strategy<Value = NaiveDate> {
    (0u64..365).prop_map(|n| NaiveDate::from_ymd_opt(2026, 1, 1).unwrap() + Days::new(n))
}

proptest! {
    /// The renewal base is never in the past and never earlier than a
    /// still-running end date.
    #[test]
    fn prop_renewal_base_never_loses_days(end in day_in_2026(), today in day_in_2026()) {
        let base = renewal_base(Some(end), today);
        prop_assert!(base >= today);
        if end >= today {
            prop_assert_eq!(base, end);
        }
    }

    /// Renewal moves the end date strictly forward and past today.
    #[test]
    fn prop_renewal_extends_end_date(
        end in day_in_2026(),
        today in day_in_2026(),
        duration in prop_oneof![
            Just(DurationClass::Monthly),
            Just(DurationClass::Biannual),
            Just(DurationClass::Annual),
        ],
        state in prop_oneof![
            Just(SubscriptionState::Active),
            Just(SubscriptionState::ExpiringSoon),
            Just(SubscriptionState::Expired),
        ],
    ) {
        let plan = Plan { id: "p".into(), name: "Plan".into(), duration: Some(duration) };
        let mut sub = Subscription::new("SUB/2026/0001".into(), "c".into(), plan);
        sub.state = state;
        sub.start_date = Some(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        sub.end_date_override = Some(end);
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        let new_end = sub.renew(today, None, now).unwrap().new_end;

        prop_assert!(new_end > today);
        prop_assert!(new_end > end);
        prop_assert_eq!(sub.end_date(), Some(new_end));
        prop_assert_eq!(sub.state, SubscriptionState::Active);
    }
}

// ============================================================================
// render()
// ============================================================================

proptest! {
    /// Text without placeholders renders unchanged.
    #[test]
    fn prop_render_without_placeholders_is_identity(body in "[a-z0-9 :=\\n]{0,80}") {
        let bindings = BTreeMap::from([("HTTP-PORT".to_string(), "8073".to_string())]);
        prop_assert_eq!(render(&body, &bindings), body);
    }

    /// Every bound placeholder is substituted.
    #[test]
    fn prop_render_substitutes_bound_names(value in "[0-9]{1,5}") {
        let bindings = BTreeMap::from([("HTTP-PORT".to_string(), value.clone())]);
        let out = render("port={{HTTP-PORT}} again={{HTTP-PORT}}", &bindings);
        prop_assert_eq!(out, format!("port={value} again={value}"));
    }
}
