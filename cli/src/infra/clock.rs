//! Wall clock implementation of the `Clock` port.

use chrono::{DateTime, Local, NaiveDate, Utc};

use crate::application::ports::Clock;

/// Timestamps in UTC; subscription dates follow the host's local calendar.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}
