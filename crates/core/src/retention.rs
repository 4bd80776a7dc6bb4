//! Calendar helpers for usage months and retention cutoffs.

use std::fmt;

use chrono::{DateTime, Datelike, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::plans::RetentionWindow;

/// A calendar month in UTC. Usage counters are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    /// 1-12
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    pub fn of(at: DateTime<Utc>) -> Self {
        Self::new(at.year(), at.month())
    }

    pub fn current() -> Self {
        Self::of(Utc::now())
    }

    /// ClickHouse `toYYYYMM` partition ID.
    pub fn partition_id(&self) -> u32 {
        self.year as u32 * 100 + self.month
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// Rows created before this instant fall outside the retention window.
///
/// `None` for unlimited retention.
pub fn retention_cutoff(now: DateTime<Utc>, window: RetentionWindow) -> Option<DateTime<Utc>> {
    let months = window.months()?;
    Some(
        now.checked_sub_months(Months::new(months))
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_display_and_partition() {
        let ym = YearMonth::new(2024, 3);
        assert_eq!(ym.to_string(), "2024-03");
        assert_eq!(ym.partition_id(), 202403);
    }

    #[test]
    fn test_retention_cutoff() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 3, 0, 0).unwrap();
        let cutoff = retention_cutoff(now, RetentionWindow::Months(1)).unwrap();
        // Clamped to the last day of February
        assert_eq!(cutoff, Utc.with_ymd_and_hms(2024, 2, 29, 3, 0, 0).unwrap());

        let cutoff = retention_cutoff(now, RetentionWindow::Months(6)).unwrap();
        assert_eq!(cutoff, Utc.with_ymd_and_hms(2023, 9, 30, 3, 0, 0).unwrap());

        assert!(retention_cutoff(now, RetentionWindow::Unlimited).is_none());
    }
}
