use std::fmt;
use std::str::FromStr;

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A value could not be parsed into one of the shared enums.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid {kind} '{value}' (expected one of: {expected})")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Lifecycle state of a provisioned application instance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    #[default]
    Draft,
    Stopped,
    Running,
    Error,
}

impl InstanceState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing-cycle state of a subscription
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    #[default]
    Draft,
    Active,
    ExpiringSoon,
    Expired,
    Cancelled,
}

impl SubscriptionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::ExpiringSoon => "expiring_soon",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    /// States from which a renewal is accepted.
    #[must_use]
    pub fn is_renewable(self) -> bool {
        matches!(self, Self::Active | Self::ExpiringSoon | Self::Expired)
    }

    /// States the daily sweep still has to look at.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Active | Self::ExpiringSoon)
    }

    /// States in which a subscription keeps its bound instance to itself.
    #[must_use]
    pub fn holds_instance(self) -> bool {
        matches!(self, Self::Draft | Self::Active | Self::ExpiringSoon)
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Duration class carried by a subscription plan
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum DurationClass {
    Monthly,
    Biannual,
    Annual,
}

impl DurationClass {
    /// Calendar offset in months.
    #[must_use]
    pub fn months(self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Biannual => 6,
            Self::Annual => 12,
        }
    }

    /// Add this duration to `date`, clamping to the last day of the target
    /// month (Jan 31 + 1 month = Feb 28/29).
    #[must_use]
    pub fn add_to(self, date: NaiveDate) -> Option<NaiveDate> {
        date.checked_add_months(Months::new(self.months()))
    }
}

impl fmt::Display for DurationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Monthly => "monthly",
            Self::Biannual => "biannual",
            Self::Annual => "annual",
        })
    }
}

impl FromStr for DurationClass {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(Self::Monthly),
            "biannual" => Ok(Self::Biannual),
            "annual" => Ok(Self::Annual),
            other => Err(ParseEnumError {
                kind: "duration class",
                value: other.to_string(),
                expected: "monthly, biannual, annual",
            }),
        }
    }
}

/// Which of an instance's two ports a reservation covers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    /// HTTP port
    Primary,
    /// Longpolling port
    Secondary,
}

impl PortKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Primary => "HTTP",
            Self::Secondary => "Longpolling",
        }
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        })
    }
}

impl FromStr for PortKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" | "http" => Ok(Self::Primary),
            "secondary" | "longpolling" => Ok(Self::Secondary),
            other => Err(ParseEnumError {
                kind: "port kind",
                value: other.to_string(),
                expected: "primary, secondary",
            }),
        }
    }
}
