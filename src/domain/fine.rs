use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::FineAmount;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// 延滞料金の計算方針
///
/// 返却期限を過ぎた日数（開始した日を1日として数える）× 日額。
/// `cap` を指定した場合はそれを上限とする。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinePolicy {
    pub daily_rate: Decimal,
    pub cap: Option<Decimal>,
}

impl FinePolicy {
    pub fn new(daily_rate: Decimal, cap: Option<Decimal>) -> Self {
        Self { daily_rate, cap }
    }

    /// 延滞日数（期限以前なら0）
    pub fn days_late(due_date: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
        if at <= due_date {
            return 0;
        }
        let seconds = (at - due_date).num_seconds().max(1);
        // 1秒でも過ぎたら1日
        (seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
    }

    /// `at` 時点での延滞料金
    pub fn fine_for(&self, due_date: DateTime<Utc>, at: DateTime<Utc>) -> FineAmount {
        let days = Self::days_late(due_date, at);
        if days == 0 {
            return FineAmount::zero();
        }
        let raw = self.daily_rate * Decimal::from(days);
        let capped = match self.cap {
            Some(cap) => raw.min(cap),
            None => raw,
        };
        FineAmount::saturating(capped)
    }
}

impl Default for FinePolicy {
    /// 1日あたり0.50、上限なし
    fn default() -> Self {
        Self {
            daily_rate: Decimal::new(50, 2),
            cap: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn due() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 14, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_days_late_zero_on_or_before_due_date() {
        assert_eq!(FinePolicy::days_late(due(), due()), 0);
        assert_eq!(FinePolicy::days_late(due(), due() - Duration::days(3)), 0);
    }

    #[test]
    fn test_days_late_counts_started_days() {
        assert_eq!(FinePolicy::days_late(due(), due() + Duration::seconds(1)), 1);
        assert_eq!(FinePolicy::days_late(due(), due() + Duration::days(1)), 1);
        assert_eq!(
            FinePolicy::days_late(due(), due() + Duration::days(1) + Duration::hours(1)),
            2
        );
    }

    #[test]
    fn test_fine_for_default_rate() {
        let policy = FinePolicy::default();
        assert!(policy.fine_for(due(), due()).is_zero());
        assert_eq!(
            policy.fine_for(due(), due() + Duration::days(6)).to_string(),
            "3.00"
        );
    }

    #[test]
    fn test_fine_for_respects_cap() {
        let policy = FinePolicy::new(Decimal::new(100, 2), Some(Decimal::new(500, 2)));
        assert_eq!(
            policy.fine_for(due(), due() + Duration::days(30)).to_string(),
            "5.00"
        );
    }
}
