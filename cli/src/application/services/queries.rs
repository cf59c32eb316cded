//! Application service: read-only views for collaborators.
//!
//! The notification and portal collaborators read these; nothing here
//! mutates state or sends anything.

use chrono::NaiveDate;
use microsaas_common::{InstanceState, SubscriptionState};
use serde::Serialize;

use crate::domain::error::SubscriptionError;
use crate::domain::instance::{Instance, PublicEndpoint};
use crate::domain::platform::PlatformState;
use crate::domain::subscription::Subscription;

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InstanceStatus {
    pub name: String,
    pub state: InstanceState,
    /// Only while running.
    pub url: Option<String>,
}

impl InstanceStatus {
    #[must_use]
    pub fn of(instance: &Instance, endpoint: &PublicEndpoint) -> Self {
        Self {
            name: instance.name.clone(),
            state: instance.state,
            url: (instance.state == InstanceState::Running)
                .then(|| endpoint.url(instance.http_port)),
        }
    }
}

/// What the notification collaborator decides on.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SubscriptionStatus {
    pub reference: String,
    pub state: SubscriptionState,
    pub customer: String,
    pub plan: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub days_remaining: Option<i64>,
    pub renewals: usize,
    pub instance: Option<InstanceStatus>,
}

#[must_use]
pub fn subscription_status(
    state: &PlatformState,
    sub: &Subscription,
    endpoint: &PublicEndpoint,
    today: NaiveDate,
) -> SubscriptionStatus {
    SubscriptionStatus {
        reference: sub.reference.clone(),
        state: sub.state,
        customer: sub.customer.clone(),
        plan: sub.plan.name.clone(),
        start_date: sub.start_date,
        end_date: sub.end_date(),
        days_remaining: sub.days_remaining(today),
        renewals: sub.renewals.len(),
        instance: sub
            .instance
            .as_deref()
            .and_then(|name| state.instances.get(name))
            .map(|i| InstanceStatus::of(i, endpoint)),
    }
}

/// One page of a customer's subscriptions.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CustomerPage {
    pub customer: String,
    pub total: usize,
    /// One-based.
    pub page: usize,
    pub page_size: usize,
    pub items: Vec<SubscriptionStatus>,
}

/// Non-cancelled subscriptions of `customer`, newest start first.
#[must_use]
pub fn customer_page(
    state: &PlatformState,
    customer: &str,
    page: usize,
    page_size: usize,
    endpoint: &PublicEndpoint,
    today: NaiveDate,
) -> CustomerPage {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let all = state.customer_subscriptions(customer);
    let items = all
        .iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .map(|s| subscription_status(state, s, endpoint, today))
        .collect();
    CustomerPage {
        customer: customer.to_string(),
        total: all.len(),
        page,
        page_size,
        items,
    }
}

/// One subscription, visible only to its own customer.
///
/// # Errors
///
/// `SubscriptionError::NotFound` for an unknown reference or another
/// customer's subscription.
pub fn customer_subscription(
    state: &PlatformState,
    customer: &str,
    reference: &str,
    endpoint: &PublicEndpoint,
    today: NaiveDate,
) -> Result<SubscriptionStatus, SubscriptionError> {
    let sub = state.subscription(reference)?;
    if sub.customer != customer {
        return Err(SubscriptionError::NotFound(reference.to_string()));
    }
    Ok(subscription_status(state, sub, endpoint, today))
}

/// Every subscription, for operators.
#[must_use]
pub fn all_subscriptions(
    state: &PlatformState,
    endpoint: &PublicEndpoint,
    today: NaiveDate,
) -> Vec<SubscriptionStatus> {
    state
        .subscriptions
        .values()
        .map(|s| subscription_status(state, s, endpoint, today))
        .collect()
}

/// Row of the instance table.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InstanceSummary {
    pub name: String,
    pub state: InstanceState,
    pub http_port: u16,
    pub secondary_port: u16,
    pub customer: Option<String>,
    pub url: String,
}

#[must_use]
pub fn instance_summaries(state: &PlatformState, endpoint: &PublicEndpoint) -> Vec<InstanceSummary> {
    state
        .instances
        .values()
        .map(|i| InstanceSummary {
            name: i.name.clone(),
            state: i.state,
            http_port: i.http_port,
            secondary_port: i.secondary_port,
            customer: i.customer.clone(),
            url: endpoint.url(i.http_port),
        })
        .collect()
}
