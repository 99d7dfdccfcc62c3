use crate::domain::{
    Loan, LoanStatus, NewLoan,
    value_objects::{LoanId, UserId},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// 貸出リポジトリのエラー
#[derive(Debug, Error)]
pub enum LoanRepositoryError {
    /// book_id / user_id が外部テーブルに存在しない（外部キー制約違反）
    #[error("{field} does not reference an existing record")]
    ForeignKeyViolation { field: &'static str },

    /// 更新対象の貸出が存在しない
    #[error("loan {0} not found")]
    NotFound(LoanId),

    /// 期待したステータスから既に変化していた（並行更新）
    #[error("loan {loan_id} is no longer {expected}")]
    StaleStatus {
        loan_id: LoanId,
        expected: LoanStatus,
    },

    /// ストレージの行が不変条件を満たさない
    #[error("corrupt loan row: {0}")]
    CorruptRow(String),

    /// ストレージ層の障害
    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, LoanRepositoryError>;

/// 貸出リポジトリポート
///
/// `loans` テーブルへのアクセスを抽象化する。
/// 貸出レコードは物理削除しないため、削除操作は持たない。
#[async_trait]
pub trait LoanRepository: Send + Sync {
    /// 新規貸出を保存し、採番されたIDを持つ貸出を返す
    ///
    /// 外部キー制約違反は `ForeignKeyViolation` として返す。
    async fn insert(&self, loan: NewLoan) -> Result<Loan>;

    /// IDで貸出を取得する
    async fn get_by_id(&self, loan_id: LoanId) -> Result<Option<Loan>>;

    /// 利用者の全貸出を取得する（貸出日の新しい順）
    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Loan>>;

    /// 延滞候補を検索する
    ///
    /// status = borrowed かつ due_date < cutoff の貸出を返す。
    async fn find_overdue_candidates(&self, cutoff: DateTime<Utc>) -> Result<Vec<Loan>>;

    /// 指定ステータスの貸出を取得する
    async fn find_by_status(&self, status: LoanStatus) -> Result<Vec<Loan>>;

    /// 状態遷移の結果を保存する
    ///
    /// 現在のステータスが `expected` の場合にのみ status / return_date /
    /// fine_amount を更新する。同じ貸出への並行更新はどちらか一方だけが
    /// 成功し、もう一方は `StaleStatus` になる。
    /// fine_amount は保存済みの額より小さくならない（古い計算結果での上書き防止）。
    /// loan_id と貸出条件（book_id, user_id, borrow_date, due_date）は変更しない。
    ///
    /// 保存後の貸出を返す。
    async fn update_transition(&self, loan: &Loan, expected: LoanStatus) -> Result<Loan>;
}
