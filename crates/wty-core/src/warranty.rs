//! Warranty coverage computation.
//!
//! Works on calendar dates only; callers reduce timestamps to a date in the
//! offset they display in before calling [`WarrantyStatus::compute`].

use serde::{Deserialize, Serialize};
use time::{Date, Duration, OffsetDateTime, UtcOffset};

/// Coverage with this many days or fewer left is reported as near expiry.
pub const NEAR_EXPIRY_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarrantyState {
    Active,
    NearExpiry,
    Expired,
}

impl WarrantyState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::NearExpiry => "Expires Soon",
            Self::Expired => "Expired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarrantyStatus {
    pub end_date: Date,
    /// Signed; negative once the warranty has lapsed.
    pub remaining_days: i64,
    pub state: WarrantyState,
}

impl WarrantyStatus {
    pub fn compute(activation_date: Date, duration_days: u32, today: Date) -> Self {
        let end_date = activation_date.saturating_add(Duration::days(i64::from(duration_days)));
        let remaining_days = (end_date - today).whole_days();
        let state = if remaining_days <= 0 {
            WarrantyState::Expired
        } else if remaining_days <= NEAR_EXPIRY_DAYS {
            WarrantyState::NearExpiry
        } else {
            WarrantyState::Active
        };

        Self {
            end_date,
            remaining_days,
            state,
        }
    }

    /// Same as [`compute`](Self::compute) for an activation timestamp, viewed in `offset`.
    pub fn from_activation(
        activated_at: OffsetDateTime,
        duration_days: u32,
        today: Date,
        offset: UtcOffset,
    ) -> Self {
        Self::compute(activated_at.to_offset(offset).date(), duration_days, today)
    }

    /// Remaining days as shown to a customer, never negative.
    pub fn display_remaining_days(&self) -> i64 {
        self.remaining_days.max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime, offset};

    #[test]
    fn test_on_activation_day_full_coverage_remains() {
        for n in [31_u32, 90, 365, 730] {
            let d = date!(2024 - 02 - 29);
            let status = WarrantyStatus::compute(d, n, d);
            assert_eq!(status.remaining_days, i64::from(n));
            assert_eq!(status.state, WarrantyState::Active);
        }
    }

    #[test]
    fn test_expired_on_end_date() {
        for n in [1_u32, 30, 31, 365] {
            let d = date!(2023 - 12 - 15);
            let now = d + Duration::days(i64::from(n));
            let status = WarrantyStatus::compute(d, n, now);
            assert_eq!(status.state, WarrantyState::Expired);
            assert!(status.remaining_days <= 0);
            assert_eq!(status.end_date, now);
        }
    }

    #[test]
    fn test_near_expiry_fifteen_days_out() {
        for n in [16_u32, 30, 45] {
            let d = date!(2024 - 01 - 01);
            let now = d + Duration::days(i64::from(n) - 15);
            let status = WarrantyStatus::compute(d, n, now);
            assert_eq!(status.remaining_days, 15);
            assert_eq!(status.state, WarrantyState::NearExpiry);
        }
    }

    #[test]
    fn test_threshold_boundaries() {
        let d = date!(2024 - 01 - 01);
        assert_eq!(
            WarrantyStatus::compute(d, 30, d).state,
            WarrantyState::NearExpiry
        );
        assert_eq!(WarrantyStatus::compute(d, 31, d).state, WarrantyState::Active);
        assert_eq!(WarrantyStatus::compute(d, 1, d).state, WarrantyState::NearExpiry);
        assert_eq!(WarrantyStatus::compute(d, 0, d).state, WarrantyState::Expired);
    }

    #[test]
    fn test_display_clamps_but_raw_stays_signed() {
        let d = date!(2022 - 06 - 01);
        let status = WarrantyStatus::compute(d, 10, date!(2022 - 06 - 21));
        assert_eq!(status.remaining_days, -10);
        assert_eq!(status.display_remaining_days(), 0);
        assert_eq!(status.state.label(), "Expired");
    }

    #[test]
    fn test_activation_date_taken_in_display_offset() {
        // 23:30 UTC is already the next day at +02:00.
        let activated = datetime!(2024 - 03 - 10 23:30 UTC);
        let status =
            WarrantyStatus::from_activation(activated, 30, date!(2024 - 03 - 11), offset!(+2));
        assert_eq!(status.end_date, date!(2024 - 04 - 10));
        assert_eq!(status.remaining_days, 30);
    }

    #[test]
    fn test_pure_for_identical_inputs() {
        let d = date!(2024 - 05 - 05);
        let today = date!(2024 - 06 - 01);
        assert_eq!(
            WarrantyStatus::compute(d, 180, today),
            WarrantyStatus::compute(d, 180, today)
        );
    }
}
