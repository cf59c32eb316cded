//! The persisted aggregate: every instance, reservation, template,
//! subscription, and billing document known to this host.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use microsaas_common::SubscriptionState;
use serde::{Deserialize, Serialize};

use crate::domain::billing::BillingDocument;
use crate::domain::error::{InstanceError, SubscriptionError};
use crate::domain::instance::{Instance, sanitize_name};
use crate::domain::port_ledger::PortLedger;
use crate::domain::subscription::{Subscription, format_reference};
use crate::domain::template::{ComposeTemplate, DEFAULT_TEMPLATE_NAME};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlatformState {
    pub instances: BTreeMap<String, Instance>,
    pub ledger: PortLedger,
    pub templates: BTreeMap<String, ComposeTemplate>,
    pub subscriptions: BTreeMap<String, Subscription>,
    pub documents: BTreeMap<String, BillingDocument>,
    /// Last subscription sequence number handed out.
    pub sequence: u64,
}

impl PlatformState {
    /// # Errors
    ///
    /// `InstanceError::NotFound` if no instance has that name.
    pub fn instance(&self, name: &str) -> Result<&Instance, InstanceError> {
        self.instances
            .get(name)
            .ok_or_else(|| InstanceError::NotFound(name.to_string()))
    }

    /// # Errors
    ///
    /// `InstanceError::NotFound` if no instance has that name.
    pub fn instance_mut(&mut self, name: &str) -> Result<&mut Instance, InstanceError> {
        self.instances
            .get_mut(name)
            .ok_or_else(|| InstanceError::NotFound(name.to_string()))
    }

    /// Whether a name, or another name that sanitizes to the same
    /// directory, is already taken.
    #[must_use]
    pub fn name_taken(&self, name: &str) -> bool {
        let dir = sanitize_name(name);
        self.instances
            .keys()
            .any(|existing| existing == name || sanitize_name(existing) == dir)
    }

    /// Every port currently assigned to some instance, optionally ignoring one.
    #[must_use]
    pub fn assigned_ports(&self, except: Option<&str>) -> BTreeSet<u16> {
        self.instances
            .values()
            .filter(|i| Some(i.name.as_str()) != except)
            .flat_map(|i| [i.http_port, i.secondary_port])
            .collect()
    }

    /// Look up a template by name. The built-in default is always available
    /// unless a stored template shadows it.
    #[must_use]
    pub fn template(&self, name: &str) -> Option<ComposeTemplate> {
        self.templates.get(name).cloned().or_else(|| {
            (name == DEFAULT_TEMPLATE_NAME).then(ComposeTemplate::builtin)
        })
    }

    /// Hand out the next subscription reference.
    pub fn next_reference(&mut self, today: NaiveDate) -> String {
        self.sequence += 1;
        format_reference(today, self.sequence)
    }

    /// # Errors
    ///
    /// `SubscriptionError::NotFound` for an unknown reference.
    pub fn subscription(&self, reference: &str) -> Result<&Subscription, SubscriptionError> {
        self.subscriptions
            .get(reference)
            .ok_or_else(|| SubscriptionError::NotFound(reference.to_string()))
    }

    /// # Errors
    ///
    /// `SubscriptionError::NotFound` for an unknown reference.
    pub fn subscription_mut(
        &mut self,
        reference: &str,
    ) -> Result<&mut Subscription, SubscriptionError> {
        self.subscriptions
            .get_mut(reference)
            .ok_or_else(|| SubscriptionError::NotFound(reference.to_string()))
    }

    /// References of subscriptions bound to `instance`.
    #[must_use]
    pub fn subscriptions_bound_to(&self, instance: &str) -> Vec<String> {
        self.subscriptions
            .values()
            .filter(|s| s.instance.as_deref() == Some(instance))
            .map(|s| s.reference.clone())
            .collect()
    }

    /// The subscription that currently holds `instance`, if any.
    #[must_use]
    pub fn holder_of(&self, instance: &str) -> Option<&Subscription> {
        self.subscriptions
            .values()
            .find(|s| s.instance.as_deref() == Some(instance) && s.state.holds_instance())
    }

    /// Unbind `instance` from expired and cancelled subscriptions, returning
    /// their references.
    pub fn detach_finished(&mut self, instance: &str) -> Vec<String> {
        let mut detached = Vec::new();
        for sub in self.subscriptions.values_mut() {
            if sub.instance.as_deref() == Some(instance) && !sub.state.holds_instance() {
                sub.instance = None;
                detached.push(sub.reference.clone());
            }
        }
        detached
    }

    /// The renewable subscription a renewal for `(customer, plan)` applies to.
    /// The most recently started one wins when several match.
    #[must_use]
    pub fn renewable_for(&self, customer: &str, plan_id: &str) -> Option<&Subscription> {
        self.subscriptions
            .values()
            .filter(|s| s.customer == customer && s.plan.id == plan_id && s.state.is_renewable())
            .max_by_key(|s| (s.start_date, s.reference.clone()))
    }

    /// A customer's subscriptions, excluding cancelled ones, newest start first.
    #[must_use]
    pub fn customer_subscriptions(&self, customer: &str) -> Vec<&Subscription> {
        let mut subs: Vec<&Subscription> = self
            .subscriptions
            .values()
            .filter(|s| s.customer == customer && s.state != SubscriptionState::Cancelled)
            .collect();
        subs.sort_by(|a, b| {
            b.start_date
                .cmp(&a.start_date)
                .then_with(|| b.reference.cmp(&a.reference))
        });
        subs
    }
}
