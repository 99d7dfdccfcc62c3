use chrono::{DateTime, Utc};

use crate::domain::{self, LoanStatus};
use crate::ports::LoanRepositoryError;

use super::errors::Result;
use super::loan_service::ServiceDependencies;

/// 延滞検出バッチの処理結果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverdueSweepSummary {
    /// borrowed から overdue にした件数
    pub marked_overdue: usize,
    /// 延滞料金を更新した overdue の件数
    pub fines_refreshed: usize,
    /// 並行した返却などで更新をスキップした件数
    pub conflicts: usize,
}

/// 延滞検出バッチ
///
/// 定期的に実行され、延滞した貸出を overdue にし、延滞料金を更新する。
///
/// ビジネスルール：
/// - 返却期限（due_date）を過ぎた borrowed の貸出を overdue にする
/// - 既に overdue の貸出は料金のみ更新する（料金は減らない）
/// - returned の貸出は処理しない
///
/// 処理フロー：
/// 1. 延滞候補（borrowed かつ due_date < now）を overdue にする
/// 2. overdue の貸出の延滞料金を `now` 時点の額に更新する
///
/// 各更新は読み込んだ時点のstatusを条件に行う。同時に返却された貸出は
/// 更新されず `conflicts` に数える。
///
/// # エラー
/// リポジトリのI/Oエラー
pub async fn detect_overdue_loans(
    deps: &ServiceDependencies,
    now: DateTime<Utc>,
) -> Result<OverdueSweepSummary> {
    let mut summary = OverdueSweepSummary::default();

    // 1. 延滞候補を overdue にする
    let candidates = deps.loan_repository.find_overdue_candidates(now).await?;

    for loan in candidates {
        let overdue = match domain::loan::mark_overdue(&loan, now, &deps.fine_policy) {
            Ok(overdue) => overdue,
            Err(err) => {
                tracing::debug!(loan_id = %loan.loan_id, error = %err, "Skipping overdue candidate");
                continue;
            }
        };

        match deps
            .loan_repository
            .update_transition(&overdue, LoanStatus::Borrowed)
            .await
        {
            Ok(_) => summary.marked_overdue += 1,
            Err(err @ (LoanRepositoryError::StaleStatus { .. } | LoanRepositoryError::NotFound(_))) => {
                tracing::warn!(loan_id = %loan.loan_id, error = %err, "Loan changed during overdue sweep");
                summary.conflicts += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }

    // 2. overdue の延滞料金を更新する
    let overdue_loans = deps
        .loan_repository
        .find_by_status(LoanStatus::Overdue)
        .await?;

    for loan in overdue_loans {
        let accrued = domain::loan::accrue_fine(&loan, now, &deps.fine_policy)?;
        if accrued.fine_amount == loan.fine_amount {
            continue;
        }

        match deps
            .loan_repository
            .update_transition(&accrued, LoanStatus::Overdue)
            .await
        {
            Ok(_) => summary.fines_refreshed += 1,
            Err(err @ (LoanRepositoryError::StaleStatus { .. } | LoanRepositoryError::NotFound(_))) => {
                tracing::warn!(loan_id = %loan.loan_id, error = %err, "Loan changed during fine refresh");
                summary.conflicts += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }

    tracing::info!(
        marked_overdue = summary.marked_overdue,
        fines_refreshed = summary.fines_refreshed,
        conflicts = summary.conflicts,
        "Overdue sweep finished"
    );

    Ok(summary)
}
