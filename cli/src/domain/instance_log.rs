//! Bounded per-instance activity log.
//!
//! Entries are kept newest-first in a ring buffer capped both by entry count
//! and by the total size of the messages. Pushing past either cap evicts the
//! oldest entries.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ENTRIES: usize = 200;
pub const DEFAULT_MAX_BYTES: usize = 20_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.at.format("%d/%m/%Y, %H:%M:%S"),
            self.level,
            self.message
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceLog {
    max_entries: usize,
    max_bytes: usize,
    /// Newest first.
    entries: VecDeque<LogEntry>,
}

impl Default for InstanceLog {
    fn default() -> Self {
        Self::with_limits(DEFAULT_MAX_ENTRIES, DEFAULT_MAX_BYTES)
    }
}

impl InstanceLog {
    /// Create an empty log. Both limits are clamped to at least one.
    #[must_use]
    pub fn with_limits(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            max_bytes: max_bytes.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, at: DateTime<Utc>, level: LogLevel, message: impl Into<String>) {
        let mut message = message.into();
        if message.len() > self.max_bytes {
            let mut end = self.max_bytes;
            while !message.is_char_boundary(end) {
                end -= 1;
            }
            message.truncate(end);
        }
        self.entries.push_front(LogEntry { at, level, message });
        self.evict();
    }

    fn evict(&mut self) {
        while self.entries.len() > self.max_entries {
            self.entries.pop_back();
        }
        while self.total_bytes() > self.max_bytes && self.entries.len() > 1 {
            self.entries.pop_back();
        }
    }

    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.entries.iter().map(|e| e.message.len()).sum()
    }

    /// Entries, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Re-apply caps, e.g. after the configured limits changed.
    pub fn set_limits(&mut self, max_entries: usize, max_bytes: usize) {
        self.max_entries = max_entries.max(1);
        self.max_bytes = max_bytes.max(1);
        self.evict();
    }
}
