use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 識別子の値がストレージの範囲外だった
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("identifier out of range: {0}")]
pub struct IdOutOfRange(pub i64);

/// 貸出ID - ストレージが採番する主キー
///
/// 一度割り当てられたら変更されない。新規貸出（`NewLoan`）はIDを持たない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoanId(u32);

impl LoanId {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// BIGINT列へバインドする値
    pub fn to_db(self) -> i64 {
        i64::from(self.0)
    }
}

impl TryFrom<i64> for LoanId {
    type Error = IdOutOfRange;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u32::try_from(value).map(Self).map_err(|_| IdOutOfRange(value))
    }
}

impl std::fmt::Display for LoanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 書籍ID - 外部の書籍カタログ（`books`テーブル）への参照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(u32);

impl BookId {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn to_db(self) -> i64 {
        i64::from(self.0)
    }
}

impl TryFrom<i64> for BookId {
    type Error = IdOutOfRange;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u32::try_from(value).map(Self).map_err(|_| IdOutOfRange(value))
    }
}

/// 利用者ID - 外部の利用者ディレクトリ（`users`テーブル）への参照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u32);

impl UserId {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn to_db(self) -> i64 {
        i64::from(self.0)
    }
}

impl TryFrom<i64> for UserId {
    type Error = IdOutOfRange;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u32::try_from(value).map(Self).map_err(|_| IdOutOfRange(value))
    }
}

/// 延滞料金のエラー
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FineAmountError {
    #[error("fine_amount must not be negative")]
    Negative,
    #[error("fine_amount must have at most 2 fractional digits")]
    TooPrecise,
    #[error("fine_amount does not fit NUMERIC(10,2)")]
    OutOfRange,
}

/// 延滞料金
///
/// 不変条件：
/// - 0以上
/// - 小数点以下2桁まで
/// - NUMERIC(10,2) に収まる（99,999,999.99以下）
///
/// 値は常に小数点以下2桁にそろえて保持する（`0` は `0.00`）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct FineAmount(Decimal);

impl FineAmount {
    /// 小数点以下の桁数
    pub const SCALE: u32 = 2;

    /// NUMERIC(10,2) の最大値
    pub fn max() -> Decimal {
        Decimal::new(9_999_999_999, Self::SCALE)
    }

    /// 0.00
    pub fn zero() -> Self {
        Self(Decimal::new(0, Self::SCALE))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// 上限で丸めて作成する（料金計算用）
    ///
    /// 負の値は0、範囲外は最大値になる。小数点以下3桁目以降は切り上げる。
    pub fn saturating(value: Decimal) -> Self {
        let rounded = value.round_dp_with_strategy(
            Self::SCALE,
            rust_decimal::RoundingStrategy::AwayFromZero,
        );
        let clamped = rounded.max(Decimal::ZERO).min(Self::max());
        let mut scaled = clamped;
        scaled.rescale(Self::SCALE);
        Self(scaled)
    }
}

impl Default for FineAmount {
    fn default() -> Self {
        Self::zero()
    }
}

impl TryFrom<Decimal> for FineAmount {
    type Error = FineAmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(FineAmountError::Negative);
        }
        if value.normalize().scale() > Self::SCALE {
            return Err(FineAmountError::TooPrecise);
        }
        if value > Self::max() {
            return Err(FineAmountError::OutOfRange);
        }
        let mut scaled = value.abs();
        scaled.rescale(Self::SCALE);
        Ok(Self(scaled))
    }
}

impl From<FineAmount> for Decimal {
    fn from(amount: FineAmount) -> Self {
        amount.0
    }
}

impl std::fmt::Display for FineAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fine_amount_zero_has_two_fractional_digits() {
        let zero = FineAmount::zero();
        assert!(zero.is_zero());
        assert_eq!(zero.to_string(), "0.00");
    }

    #[test]
    fn test_fine_amount_try_from_valid() {
        let fine = FineAmount::try_from(Decimal::new(15, 1)).unwrap();
        assert_eq!(fine.value(), Decimal::new(150, 2));
        assert_eq!(fine.to_string(), "1.50");
    }

    #[test]
    fn test_fine_amount_rejects_negative() {
        let result = FineAmount::try_from(Decimal::new(-1, 2));
        assert_eq!(result.unwrap_err(), FineAmountError::Negative);
    }

    #[test]
    fn test_fine_amount_accepts_negative_zero() {
        let fine = FineAmount::try_from(Decimal::new(-0, 2)).unwrap();
        assert!(fine.is_zero());
    }

    #[test]
    fn test_fine_amount_rejects_three_fractional_digits() {
        let result = FineAmount::try_from(Decimal::new(1005, 3));
        assert_eq!(result.unwrap_err(), FineAmountError::TooPrecise);
    }

    #[test]
    fn test_fine_amount_trailing_zeros_are_not_extra_precision() {
        // 1.500 は 1.50 と同じ値
        let fine = FineAmount::try_from(Decimal::new(1500, 3)).unwrap();
        assert_eq!(fine.to_string(), "1.50");
    }

    #[test]
    fn test_fine_amount_rejects_out_of_range() {
        let result = FineAmount::try_from(Decimal::new(10_000_000_000, 2));
        assert_eq!(result.unwrap_err(), FineAmountError::OutOfRange);
        assert!(FineAmount::try_from(FineAmount::max()).is_ok());
    }

    #[test]
    fn test_fine_amount_saturating_clamps() {
        assert!(FineAmount::saturating(Decimal::new(-500, 2)).is_zero());
        assert_eq!(
            FineAmount::saturating(Decimal::new(1_000_000_000_000, 0)).value(),
            FineAmount::max()
        );
        assert_eq!(FineAmount::saturating(Decimal::new(1001, 3)).to_string(), "1.01");
    }

    #[test]
    fn test_fine_amount_deserialize_rejects_negative() {
        let result: Result<FineAmount, _> = serde_json::from_str("\"-1.00\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_ids_from_storage_values() {
        assert_eq!(LoanId::try_from(42_i64).unwrap().value(), 42);
        assert_eq!(LoanId::try_from(-1_i64).unwrap_err(), IdOutOfRange(-1));
        assert!(BookId::try_from(i64::from(u32::MAX) + 1).is_err());
        assert_eq!(UserId::new(7).to_db(), 7_i64);
    }
}
