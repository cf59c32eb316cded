//! Application service: port selection.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! The ledger and instance table only narrow the candidates; the OS bind
//! probe has the final say on every port returned.

use std::collections::BTreeSet;

use crate::application::ports::PortProbe;
use crate::domain::error::PortError;
use crate::domain::platform::PlatformState;

/// Inclusive port range to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// # Errors
    ///
    /// `PortError::InvalidRange` when `start > end` or `start` is zero.
    pub fn new(start: u16, end: u16) -> Result<Self, PortError> {
        if start == 0 || start > end {
            return Err(PortError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }
}

/// Ports no allocation may return: assigned to an instance, actively
/// reserved in the ledger, or held by the host application.
///
/// Built from freshly loaded state right before probing.
#[must_use]
pub fn excluded_ports(state: &PlatformState, host_reserved: &[u16]) -> BTreeSet<u16> {
    let mut excluded = state.assigned_ports(None);
    excluded.extend(state.ledger.active_ports());
    excluded.extend(host_reserved.iter().copied());
    excluded
}

/// Lowest port in `range` that is not excluded and passes a live bind probe.
///
/// # Errors
///
/// `PortError::NoPortAvailable` naming the exhausted range.
pub async fn allocate(
    probe: &impl PortProbe,
    range: PortRange,
    excluded: &BTreeSet<u16>,
) -> Result<u16, PortError> {
    for port in range.start..=range.end {
        if excluded.contains(&port) {
            continue;
        }
        if probe.is_free(port).await {
            return Ok(port);
        }
        tracing::debug!(port, "bind probe failed, skipping");
    }
    Err(PortError::NoPortAvailable {
        start: range.start,
        end: range.end,
    })
}

/// Allocate a primary port, then a secondary port strictly above it.
///
/// # Errors
///
/// `PortError::NoPortAvailable` when either search exhausts the range.
pub async fn allocate_pair(
    probe: &impl PortProbe,
    range: PortRange,
    excluded: &BTreeSet<u16>,
) -> Result<(u16, u16), PortError> {
    let primary = allocate(probe, range, excluded).await?;
    let exhausted = || PortError::NoPortAvailable {
        start: range.start,
        end: range.end,
    };
    let next = primary.checked_add(1).ok_or_else(exhausted)?;
    if next > range.end {
        return Err(exhausted());
    }
    let secondary = allocate(probe, PortRange { start: next, end: range.end }, excluded)
        .await
        .map_err(|_| exhausted())?;
    Ok((primary, secondary))
}

/// Up to `max_results` free ports in `range`, same rules as [`allocate`].
pub async fn scan(
    probe: &impl PortProbe,
    range: PortRange,
    excluded: &BTreeSet<u16>,
    max_results: usize,
) -> Vec<u16> {
    let mut free = Vec::new();
    for port in range.start..=range.end {
        if free.len() >= max_results {
            break;
        }
        if !excluded.contains(&port) && probe.is_free(port).await {
            free.push(port);
        }
    }
    free
}
