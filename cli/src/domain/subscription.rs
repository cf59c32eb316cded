//! Subscription model, date arithmetic, and the transition rules.
//!
//! This module is intentionally free of I/O, async, and external layer imports.
//! Side effects on bound instances are decided here and carried out by the
//! application layer.

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use microsaas_common::{DurationClass, SubscriptionState};
use serde::{Deserialize, Serialize};

use crate::domain::error::SubscriptionError;

/// Days before the end date during which an active subscription is flagged.
pub const DEFAULT_EXPIRING_WINDOW_DAYS: u32 = 7;

/// A purchasable catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Plan {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<DurationClass>,
}

/// One renewal event. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenewalRecord {
    pub id: u64,
    pub renewed_on: NaiveDate,
    pub previous_end: Option<NaiveDate>,
    pub new_end: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscription {
    pub reference: String,
    #[serde(default)]
    pub state: SubscriptionState,
    pub customer: String,
    pub plan: Plan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    /// Set explicitly when the end date no longer follows start + duration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date_override: Option<NaiveDate>,
    #[serde(default)]
    pub renewals: Vec<RenewalRecord>,
}

impl Subscription {
    #[must_use]
    pub fn new(reference: String, customer: String, plan: Plan) -> Self {
        Self {
            reference,
            state: SubscriptionState::Draft,
            customer,
            plan,
            instance: None,
            document: None,
            start_date: None,
            end_date_override: None,
            renewals: Vec::new(),
        }
    }

    /// Start date plus the plan's duration, unless overridden.
    #[must_use]
    pub fn end_date(&self) -> Option<NaiveDate> {
        if let Some(end) = self.end_date_override {
            return Some(end);
        }
        let start = self.start_date?;
        self.plan.duration?.add_to(start)
    }

    /// Days between today and the end date. Negative once expired.
    #[must_use]
    pub fn days_remaining(&self, today: NaiveDate) -> Option<i64> {
        self.end_date().map(|end| (end - today).num_days())
    }

    /// `draft|expiring_soon → active`. Idempotent on `active`. Sets the
    /// start date to `today` when none was recorded; the end date is left
    /// alone, so the next sweep flags an expiring subscription again.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError::InvalidTransition` from `expired` or
    /// `cancelled`; those come back only through renewal.
    pub fn activate(&mut self, today: NaiveDate) -> Result<bool, SubscriptionError> {
        match self.state {
            SubscriptionState::Active => Ok(false),
            SubscriptionState::Draft | SubscriptionState::ExpiringSoon => {
                self.start_date.get_or_insert(today);
                self.state = SubscriptionState::Active;
                Ok(true)
            }
            from => Err(SubscriptionError::InvalidTransition {
                from,
                action: "activate",
            }),
        }
    }

    /// `draft|active|expiring_soon → cancelled`. No-op on `cancelled`.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError::InvalidTransition` from `expired`.
    pub fn cancel(&mut self) -> Result<bool, SubscriptionError> {
        match self.state {
            SubscriptionState::Cancelled => Ok(false),
            SubscriptionState::Draft
            | SubscriptionState::Active
            | SubscriptionState::ExpiringSoon => {
                self.state = SubscriptionState::Cancelled;
                Ok(true)
            }
            from @ SubscriptionState::Expired => Err(SubscriptionError::InvalidTransition {
                from,
                action: "cancel",
            }),
        }
    }

    /// Extend the end date by one plan period and return to `active`.
    ///
    /// The base date is the current end date while it is still today or
    /// later, so unused days carry over; otherwise the base is today.
    ///
    /// # Errors
    ///
    /// `NoDurationConfigured` when the plan has no duration class (checked
    /// first), `InvalidTransition` from `draft` or `cancelled`.
    pub fn renew(
        &mut self,
        today: NaiveDate,
        document: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<&RenewalRecord, SubscriptionError> {
        let duration = self
            .plan
            .duration
            .ok_or_else(|| SubscriptionError::NoDurationConfigured {
                plan: self.plan.name.clone(),
            })?;
        if !self.state.is_renewable() {
            return Err(SubscriptionError::InvalidTransition {
                from: self.state,
                action: "renew",
            });
        }
        let previous_end = self.end_date();
        let base = renewal_base(previous_end, today);
        let new_end = duration
            .add_to(base)
            .ok_or_else(|| SubscriptionError::NoDurationConfigured {
                plan: self.plan.name.clone(),
            })?;

        self.start_date.get_or_insert(today);
        self.end_date_override = Some(new_end);
        self.state = SubscriptionState::Active;
        let id = self.renewals.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        self.renewals.push(RenewalRecord {
            id,
            renewed_on: today,
            previous_end,
            new_end,
            document,
            recorded_at: now,
        });
        Ok(&self.renewals[self.renewals.len() - 1])
    }
}

/// Base date for a renewal: the current end if it has not passed, else today.
#[must_use]
pub fn renewal_base(current_end: Option<NaiveDate>, today: NaiveDate) -> NaiveDate {
    match current_end {
        Some(end) if end >= today => end,
        _ => today,
    }
}

/// Human-facing reference: `SUB/<year>/<seq>` with a four-digit sequence.
#[must_use]
pub fn format_reference(today: NaiveDate, sequence: u64) -> String {
    format!("SUB/{}/{sequence:04}", today.year())
}

/// Outcome the sweep assigns to one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepVerdict {
    Expire,
    FlagExpiringSoon,
}

/// Decide what the sweep does with `sub` on `today`.
///
/// Expiry is evaluated before the expiring-soon window, so one pass never
/// applies both.
#[must_use]
pub fn sweep_verdict(sub: &Subscription, today: NaiveDate, window_days: u32) -> Option<SweepVerdict> {
    let end = sub.end_date()?;
    if sub.state.is_live() && end < today {
        return Some(SweepVerdict::Expire);
    }
    let horizon = today.checked_add_days(Days::new(u64::from(window_days)))?;
    if sub.state == SubscriptionState::Active && end >= today && end <= horizon {
        return Some(SweepVerdict::FlagExpiringSoon);
    }
    None
}
