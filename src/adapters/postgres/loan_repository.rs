use crate::domain::{
    FineAmount, Loan, LoanStatus, NewLoan,
    loan::validate_stored_loan,
    value_objects::{BookId, LoanId, UserId},
};
use crate::ports::loan_repository::{
    LoanRepository as LoanRepositoryTrait, LoanRepositoryError, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow};

/// 取得時の列リスト（statusは列挙型のため text にキャストして読む）
const LOAN_COLUMNS: &str = r#"
    loan_id,
    book_id,
    user_id,
    borrow_date,
    due_date,
    return_date,
    status::text AS status,
    fine_amount
"#;

fn storage(err: sqlx::Error) -> LoanRepositoryError {
    LoanRepositoryError::Storage(Box::new(err))
}

fn corrupt(message: String) -> LoanRepositoryError {
    LoanRepositoryError::CorruptRow(message)
}

/// 書き込み時のエラーを変換する
///
/// 外部キー制約違反は制約名から対象列を特定し、`ForeignKeyViolation` にする。
fn map_write_error(err: sqlx::Error) -> LoanRepositoryError {
    let field = match &err {
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
            match db_err.constraint() {
                Some("loans_book_id_fkey") => Some("book_id"),
                Some("loans_user_id_fkey") => Some("user_id"),
                _ => None,
            }
        }
        _ => None,
    };

    match field {
        Some(field) => LoanRepositoryError::ForeignKeyViolation { field },
        None => storage(err),
    }
}

/// PostgreSQLの行データをLoanに変換する
///
/// BIGINTからu32のIDへの変換、statusの文字列からの変換、
/// fine_amountの値域チェックでエラーハンドリングを行う。
/// 日付とstatusの組み合わせも `validate_stored_loan` で再検証する。
fn map_row_to_loan(row: &PgRow) -> Result<Loan> {
    let loan_id: i64 = row.try_get("loan_id").map_err(storage)?;
    let book_id: i64 = row.try_get("book_id").map_err(storage)?;
    let user_id: i64 = row.try_get("user_id").map_err(storage)?;
    let status: String = row.try_get("status").map_err(storage)?;
    let fine_amount: Decimal = row.try_get("fine_amount").map_err(storage)?;

    let loan = Loan {
        loan_id: LoanId::try_from(loan_id).map_err(|e| corrupt(e.to_string()))?,
        book_id: BookId::try_from(book_id).map_err(|e| corrupt(e.to_string()))?,
        user_id: UserId::try_from(user_id).map_err(|e| corrupt(e.to_string()))?,
        borrow_date: row.try_get("borrow_date").map_err(storage)?,
        due_date: row.try_get("due_date").map_err(storage)?,
        return_date: row.try_get("return_date").map_err(storage)?,
        status: status
            .parse::<LoanStatus>()
            .map_err(|e| corrupt(e.to_string()))?,
        fine_amount: FineAmount::try_from(fine_amount).map_err(|e| corrupt(e.to_string()))?,
    };

    validate_stored_loan(&loan)
        .map_err(|e| corrupt(format!("loan {}: {e}", loan.loan_id)))?;

    Ok(loan)
}

/// LoanRepositoryのPostgreSQL実装
///
/// `loans` テーブル（`ensure_loan_schema` で作成・同期）を読み書きする。
pub struct LoanRepository {
    pool: PgPool,
}

impl LoanRepository {
    /// PostgreSQLコネクションプールから新しいLoanRepositoryを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoanRepositoryTrait for LoanRepository {
    /// 新規貸出をINSERTし、採番されたloan_idを含む行を返す
    async fn insert(&self, loan: NewLoan) -> Result<Loan> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO loans (
                book_id,
                user_id,
                borrow_date,
                due_date,
                return_date,
                status,
                fine_amount
            )
            VALUES ($1, $2, $3, $4, $5, $6::loan_status, $7)
            RETURNING {LOAN_COLUMNS}
            "#
        ))
        .bind(loan.book_id().to_db())
        .bind(loan.user_id().to_db())
        .bind(loan.borrow_date())
        .bind(loan.due_date())
        .bind(loan.return_date())
        .bind(loan.status().as_str())
        .bind(loan.fine_amount().value())
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;

        map_row_to_loan(&row)
    }

    async fn get_by_id(&self, loan_id: LoanId) -> Result<Option<Loan>> {
        let row = sqlx::query(&format!(
            "SELECT {LOAN_COLUMNS} FROM loans WHERE loan_id = $1"
        ))
        .bind(loan_id.to_db())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.as_ref().map(map_row_to_loan).transpose()
    }

    /// 利用者の全貸出（貸出履歴）
    ///
    /// idx_loans_user_id を使用する。
    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Loan>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {LOAN_COLUMNS}
            FROM loans
            WHERE user_id = $1
            ORDER BY borrow_date DESC, loan_id DESC
            "#
        ))
        .bind(user_id.to_db())
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter().map(map_row_to_loan).collect()
    }

    /// 延滞候補を検索（延滞検出バッチ用）
    ///
    /// (status, due_date) のインデックスを使用する。
    async fn find_overdue_candidates(&self, cutoff: DateTime<Utc>) -> Result<Vec<Loan>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {LOAN_COLUMNS}
            FROM loans
            WHERE status = 'borrowed' AND due_date < $1
            ORDER BY due_date ASC
            "#
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter().map(map_row_to_loan).collect()
    }

    async fn find_by_status(&self, status: LoanStatus) -> Result<Vec<Loan>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {LOAN_COLUMNS}
            FROM loans
            WHERE status = $1::loan_status
            ORDER BY due_date ASC
            "#
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter().map(map_row_to_loan).collect()
    }

    /// 状態遷移を条件付きUPDATEで保存する
    ///
    /// WHERE句で現在のstatusを確認することで、同じ貸出への並行した
    /// 「延滞にする」「返却する」のうち片方だけが適用される。
    /// fine_amount は GREATEST で書き込み、古い計算結果で減らさない。
    async fn update_transition(&self, loan: &Loan, expected: LoanStatus) -> Result<Loan> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE loans
            SET
                status = $2::loan_status,
                return_date = $3,
                fine_amount = GREATEST(fine_amount, $4)
            WHERE loan_id = $1 AND status = $5::loan_status
            RETURNING {LOAN_COLUMNS}
            "#
        ))
        .bind(loan.loan_id.to_db())
        .bind(loan.status.as_str())
        .bind(loan.return_date)
        .bind(loan.fine_amount.value())
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_write_error)?;

        if let Some(row) = row {
            return map_row_to_loan(&row);
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM loans WHERE loan_id = $1)")
                .bind(loan.loan_id.to_db())
                .fetch_one(&self.pool)
                .await
                .map_err(storage)?;

        if exists {
            Err(LoanRepositoryError::StaleStatus {
                loan_id: loan.loan_id,
                expected,
            })
        } else {
            Err(LoanRepositoryError::NotFound(loan.loan_id))
        }
    }
}
