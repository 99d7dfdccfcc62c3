use thiserror::Error;

use super::{FineAmountError, LoanStatus};

/// 貸出レコードのバリデーションエラー
///
/// ストレージへ書き込む前に検出する。どの列の制約に違反したかは
/// `field()` で取得できる。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoanValidationError {
    /// 必須項目が指定されていない
    #[error("{field} is required")]
    Missing { field: &'static str },

    /// statusが borrowed / returned / overdue 以外
    #[error("invalid status {value:?}: expected one of borrowed, returned, overdue")]
    InvalidStatus { value: String },

    /// fine_amountの制約違反
    #[error(transparent)]
    InvalidFine(#[from] FineAmountError),

    /// 返却期限が貸出日より前
    #[error("due_date must not be before borrow_date")]
    DueBeforeBorrow,

    /// 返却日が貸出日より前
    #[error("return_date must not be before borrow_date")]
    ReturnBeforeBorrow,

    /// return_dateとstatusの組み合わせが不正
    #[error("return_date must be set if and only if status is returned (status: {status})")]
    ReturnDateStatusMismatch { status: LoanStatus },

    /// 返却期限前にoverdueを指定した
    #[error("status overdue requires due_date to have passed")]
    NotYetOverdue,
}

impl LoanValidationError {
    /// 違反した列名
    pub fn field(&self) -> &'static str {
        match self {
            LoanValidationError::Missing { field } => field,
            LoanValidationError::InvalidStatus { .. } => "status",
            LoanValidationError::InvalidFine(_) => "fine_amount",
            LoanValidationError::DueBeforeBorrow => "due_date",
            LoanValidationError::ReturnBeforeBorrow => "return_date",
            LoanValidationError::ReturnDateStatusMismatch { .. } => "return_date",
            LoanValidationError::NotYetOverdue => "status",
        }
    }
}

/// 状態遷移のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// 許可されていない遷移（例: returned → borrowed）
    #[error("illegal status transition: {from} -> {to}")]
    IllegalTransition { from: LoanStatus, to: LoanStatus },

    /// 返却期限を過ぎていないためoverdueにできない
    #[error("loan is not past its due date")]
    NotYetDue,

    /// 返却日が貸出日より前
    #[error("return_date must not be before borrow_date")]
    ReturnBeforeBorrow,
}
