use crate::domain::{self, FinePolicy, Loan, NewLoan, commands::*, value_objects::*};
use crate::ports::*;
use std::sync::Arc;

use super::errors::{LoanApplicationError, Result};

/// サービスの依存関係
///
/// 関数型DDDの原則に従い、データ構造として定義。
/// 振る舞い（メソッド）は持たず、純粋な関数に依存関係を渡す。
#[derive(Clone)]
pub struct ServiceDependencies {
    pub loan_repository: Arc<dyn LoanRepository>,
    pub book_catalog: Arc<dyn BookCatalog>,
    pub user_directory: Arc<dyn UserDirectory>,
    pub fine_policy: FinePolicy,
}

/// 書籍を貸し出す
///
/// ビジネスルール：
/// - 返却期限が貸出日以降であること
/// - 書籍が存在すること
/// - 利用者が存在すること
///
/// 新規貸出は status = borrowed、return_date なし、fine_amount = 0.00 で作成される。
///
/// # 戻り値
/// 採番されたloan_idを含む保存済みの貸出
///
/// # エラー
/// - Validation: 入力値が制約を満たさない
/// - BookNotFound / UserNotFound: 参照先が存在しない
/// - Referential: 存在確認の後、保存時に外部キー制約違反となった
pub async fn borrow_book(deps: &ServiceDependencies, cmd: BorrowBook) -> Result<Loan> {
    // 1. 入力値の検証（I/Oの前に行う）
    let new_loan = NewLoan::new(cmd.book_id, cmd.user_id, cmd.borrow_date, cmd.due_date)?;

    // 2. 書籍と利用者の存在確認（並行して実行）
    let (book_exists, user_exists) = futures::try_join!(
        async {
            deps.book_catalog
                .exists(new_loan.book_id())
                .await
                .map_err(LoanApplicationError::BookCatalogError)
        },
        async {
            deps.user_directory
                .exists(new_loan.user_id())
                .await
                .map_err(LoanApplicationError::UserDirectoryError)
        },
    )?;

    if !book_exists {
        return Err(LoanApplicationError::BookNotFound);
    }
    if !user_exists {
        return Err(LoanApplicationError::UserNotFound);
    }

    // 3. 保存
    let loan = deps.loan_repository.insert(new_loan).await?;

    tracing::info!(
        loan_id = %loan.loan_id,
        book_id = loan.book_id.value(),
        user_id = loan.user_id.value(),
        "Book borrowed"
    );

    Ok(loan)
}

/// 書籍を返却する
///
/// ビジネスルール：
/// - borrowed / overdue の貸出のみ
/// - 返却日は貸出日以降
/// - 延滞料金は返却日時点で確定する
///
/// 読み込んだ時点のstatusを条件に更新するため、並行した延滞検出と
/// 競合した場合は `ConcurrentUpdate` を返す（再読み込みして再実行する）。
pub async fn return_book(deps: &ServiceDependencies, cmd: ReturnBook) -> Result<Loan> {
    let loan = get_loan(deps, cmd.loan_id).await?;

    let returned = domain::loan::return_loan(&loan, cmd.returned_at, &deps.fine_policy)?;

    let returned = deps
        .loan_repository
        .update_transition(&returned, loan.status)
        .await?;

    tracing::info!(
        loan_id = %returned.loan_id,
        fine_amount = %returned.fine_amount,
        "Book returned"
    );

    Ok(returned)
}

/// 貸出を取得する
pub async fn get_loan(deps: &ServiceDependencies, loan_id: LoanId) -> Result<Loan> {
    deps.loan_repository
        .get_by_id(loan_id)
        .await?
        .ok_or(LoanApplicationError::LoanNotFound)
}

/// 利用者の貸出履歴を取得する（貸出日の新しい順）
pub async fn loans_for_user(deps: &ServiceDependencies, user_id: UserId) -> Result<Vec<Loan>> {
    Ok(deps.loan_repository.find_by_user(user_id).await?)
}
