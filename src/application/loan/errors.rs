use thiserror::Error;

use crate::domain::{LoanValidationError, TransitionError};
use crate::ports::LoanRepositoryError;

/// 貸出管理アプリケーション層のエラー
#[derive(Debug, Error)]
pub enum LoanApplicationError {
    /// 入力値が貸出レコードの制約を満たさない
    #[error("Invalid loan: {0}")]
    Validation(#[from] LoanValidationError),

    /// 許可されていない状態遷移
    #[error("Invalid loan transition: {0}")]
    Transition(#[from] TransitionError),

    /// 書籍が存在しない
    #[error("Book not found")]
    BookNotFound,

    /// 利用者が存在しない
    #[error("User not found")]
    UserNotFound,

    /// 貸出が見つからない
    #[error("Loan not found")]
    LoanNotFound,

    /// 外部キー制約違反（存在確認の後に参照先が削除された場合など）
    #[error("{field} does not reference an existing record")]
    Referential { field: &'static str },

    /// 並行した更新により貸出の状態が既に変わっていた
    #[error("Loan was modified concurrently")]
    ConcurrentUpdate,

    /// LoanRepositoryのエラー
    #[error("Loan repository error")]
    RepositoryError(#[source] LoanRepositoryError),

    /// BookCatalogのエラー
    #[error("Book catalog error")]
    BookCatalogError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// UserDirectoryのエラー
    #[error("User directory error")]
    UserDirectoryError(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<LoanRepositoryError> for LoanApplicationError {
    fn from(err: LoanRepositoryError) -> Self {
        match err {
            LoanRepositoryError::ForeignKeyViolation { field } => {
                LoanApplicationError::Referential { field }
            }
            LoanRepositoryError::NotFound(_) => LoanApplicationError::LoanNotFound,
            LoanRepositoryError::StaleStatus { .. } => LoanApplicationError::ConcurrentUpdate,
            other => LoanApplicationError::RepositoryError(other),
        }
    }
}

/// アプリケーション層の Result型
pub type Result<T> = std::result::Result<T, LoanApplicationError>;
