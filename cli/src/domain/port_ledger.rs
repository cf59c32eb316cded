//! Durable record of every port ever assigned to an instance.
//!
//! Reservations are keyed by `(port, kind)` and are never deleted: releasing
//! one only marks it inactive and stamps the release time, which keeps the
//! audit trail and makes the port eligible for reuse.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use microsaas_common::PortKind;
use serde::{Deserialize, Serialize};

use crate::domain::error::PortError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortReservation {
    pub port: u16,
    pub kind: PortKind,
    pub active: bool,
    pub instance_name: String,
    pub assigned_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct PortLedger {
    records: BTreeMap<String, PortReservation>,
}

fn key(port: u16, kind: PortKind) -> String {
    format!("{port}/{kind}")
}

impl PortLedger {
    /// Upsert an active reservation for `instance_name`.
    ///
    /// An inactive record for the same `(port, kind)` is reactivated and its
    /// owner and timestamp overwritten. An active record held by another
    /// instance is a conflict; re-reserving one's own port is a no-op refresh.
    ///
    /// # Errors
    ///
    /// Returns `PortError::AlreadyReserved` if another instance holds the port.
    pub fn reserve(
        &mut self,
        port: u16,
        kind: PortKind,
        instance_name: &str,
        now: DateTime<Utc>,
    ) -> Result<(), PortError> {
        let entry = self.records.entry(key(port, kind));
        match entry {
            std::collections::btree_map::Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                if record.active && record.instance_name != instance_name {
                    return Err(PortError::AlreadyReserved {
                        port,
                        kind,
                        owner: record.instance_name.clone(),
                    });
                }
                record.active = true;
                record.instance_name = instance_name.to_string();
                record.assigned_at = now;
                record.released_at = None;
            }
            std::collections::btree_map::Entry::Vacant(vacant) => {
                vacant.insert(PortReservation {
                    port,
                    kind,
                    active: true,
                    instance_name: instance_name.to_string(),
                    assigned_at: now,
                    released_at: None,
                });
            }
        }
        Ok(())
    }

    /// Mark the reservation inactive. Releasing an inactive record is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `PortError::NotReserved` if no record exists for `(port, kind)`.
    pub fn release(
        &mut self,
        port: u16,
        kind: PortKind,
        now: DateTime<Utc>,
    ) -> Result<&PortReservation, PortError> {
        let record = self
            .records
            .get_mut(&key(port, kind))
            .ok_or(PortError::NotReserved { port, kind })?;
        if record.active {
            record.active = false;
            record.released_at = Some(now);
        }
        Ok(record)
    }

    /// Release every active reservation held by `instance_name`. Returns the
    /// released `(port, kind)` pairs.
    pub fn release_owned_by(
        &mut self,
        instance_name: &str,
        now: DateTime<Utc>,
    ) -> Vec<(u16, PortKind)> {
        let mut released = Vec::new();
        for record in self.records.values_mut() {
            if record.active && record.instance_name == instance_name {
                record.active = false;
                record.released_at = Some(now);
                released.push((record.port, record.kind));
            }
        }
        released
    }

    /// Port numbers with an active reservation of any kind.
    #[must_use]
    pub fn active_ports(&self) -> BTreeSet<u16> {
        self.records
            .values()
            .filter(|r| r.active)
            .map(|r| r.port)
            .collect()
    }

    #[must_use]
    pub fn get(&self, port: u16, kind: PortKind) -> Option<&PortReservation> {
        self.records.get(&key(port, kind))
    }

    /// All records ordered by port, then kind.
    #[must_use]
    pub fn records(&self) -> Vec<&PortReservation> {
        let mut all: Vec<_> = self.records.values().collect();
        all.sort_by_key(|r| (r.port, r.kind));
        all
    }

    /// Records (active or not) that name `instance_name` as owner.
    #[must_use]
    pub fn records_for(&self, instance_name: &str) -> Vec<&PortReservation> {
        self.records()
            .into_iter()
            .filter(|r| r.instance_name == instance_name)
            .collect()
    }
}
