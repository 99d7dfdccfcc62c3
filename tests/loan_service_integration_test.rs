use chrono::{DateTime, Duration, TimeZone, Utc};
use library_loans::adapters::mock::{
    BookCatalog as MockBookCatalog, LoanRepository as InMemoryLoanRepository,
    UserDirectory as MockUserDirectory,
};
use library_loans::application::loan::{
    LoanApplicationError, OverdueSweepSummary, ServiceDependencies, borrow_book,
    detect_overdue_loans, get_loan, loans_for_user, return_book,
};
use library_loans::domain::commands::*;
use library_loans::domain::value_objects::*;
use library_loans::domain::{FinePolicy, LoanStatus, LoanValidationError, TransitionError};
use library_loans::ports::*;
use rust_decimal::Decimal;
use std::sync::Arc;

// ============================================================================
// テスト用ヘルパー
// ============================================================================

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

struct Fixture {
    deps: ServiceDependencies,
    repository: Arc<InMemoryLoanRepository>,
    books: Arc<MockBookCatalog>,
}

fn fixture() -> Fixture {
    let repository = Arc::new(InMemoryLoanRepository::new());
    let books = Arc::new(MockBookCatalog::new());
    let users = Arc::new(MockUserDirectory::new());

    books.add_book(BookId::new(1));
    books.add_book(BookId::new(2));
    users.add_user(UserId::new(7));

    let deps = ServiceDependencies {
        loan_repository: repository.clone(),
        book_catalog: books.clone(),
        user_directory: users,
        fine_policy: FinePolicy::default(),
    };

    Fixture {
        deps,
        repository,
        books,
    }
}

fn borrow_cmd(book: u32) -> BorrowBook {
    BorrowBook {
        book_id: BookId::new(book),
        user_id: UserId::new(7),
        borrow_date: at(2024, 1, 1),
        due_date: at(2024, 1, 14),
    }
}

// ============================================================================
// 貸出
// ============================================================================

#[tokio::test]
async fn test_borrow_book_applies_defaults() {
    let f = fixture();

    let loan = borrow_book(&f.deps, borrow_cmd(1)).await.unwrap();

    assert_eq!(loan.status, LoanStatus::Borrowed);
    assert_eq!(loan.return_date, None);
    assert_eq!(loan.fine_amount.to_string(), "0.00");

    let stored = get_loan(&f.deps, loan.loan_id).await.unwrap();
    assert_eq!(stored, loan);
}

#[tokio::test]
async fn test_borrow_book_assigns_distinct_ids() {
    let f = fixture();

    let first = borrow_book(&f.deps, borrow_cmd(1)).await.unwrap();
    let second = borrow_book(&f.deps, borrow_cmd(2)).await.unwrap();

    assert_ne!(first.loan_id, second.loan_id);
    assert_eq!(f.repository.len(), 2);
}

#[tokio::test]
async fn test_borrow_book_unknown_book() {
    let f = fixture();

    let result = borrow_book(&f.deps, borrow_cmd(99)).await;

    assert!(matches!(result, Err(LoanApplicationError::BookNotFound)));
    assert!(f.repository.is_empty());
}

#[tokio::test]
async fn test_borrow_book_unknown_user() {
    let f = fixture();
    let cmd = BorrowBook {
        user_id: UserId::new(8),
        ..borrow_cmd(1)
    };

    let result = borrow_book(&f.deps, cmd).await;

    assert!(matches!(result, Err(LoanApplicationError::UserNotFound)));
}

#[tokio::test]
async fn test_borrow_book_due_before_borrow() {
    let f = fixture();
    let cmd = BorrowBook {
        due_date: at(2023, 12, 31),
        ..borrow_cmd(1)
    };

    let result = borrow_book(&f.deps, cmd).await;

    match result {
        Err(LoanApplicationError::Validation(err)) => {
            assert_eq!(err, LoanValidationError::DueBeforeBorrow);
            assert_eq!(err.field(), "due_date");
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert!(f.repository.is_empty());
}

#[tokio::test]
async fn test_borrow_book_reference_removed_after_check() {
    let f = fixture();
    f.repository.reject_reference("book_id");

    let result = borrow_book(&f.deps, borrow_cmd(1)).await;

    assert!(matches!(
        result,
        Err(LoanApplicationError::Referential { field: "book_id" })
    ));
}

// ============================================================================
// 返却
// ============================================================================

#[tokio::test]
async fn test_return_before_due_has_no_fine() {
    let f = fixture();
    let loan = borrow_book(&f.deps, borrow_cmd(1)).await.unwrap();

    let returned = return_book(
        &f.deps,
        ReturnBook {
            loan_id: loan.loan_id,
            returned_at: at(2024, 1, 10),
        },
    )
    .await
    .unwrap();

    assert_eq!(returned.status, LoanStatus::Returned);
    assert_eq!(returned.return_date, Some(at(2024, 1, 10)));
    assert!(returned.fine_amount.is_zero());

    let stored = get_loan(&f.deps, loan.loan_id).await.unwrap();
    assert_eq!(stored, returned);
}

#[tokio::test]
async fn test_return_late_finalizes_fine() {
    let f = fixture();
    let loan = borrow_book(&f.deps, borrow_cmd(1)).await.unwrap();

    let returned = return_book(
        &f.deps,
        ReturnBook {
            loan_id: loan.loan_id,
            returned_at: at(2024, 1, 17),
        },
    )
    .await
    .unwrap();

    // 3日延滞 × 0.50
    assert_eq!(returned.fine_amount.value(), Decimal::new(150, 2));
}

#[tokio::test]
async fn test_return_twice_is_rejected() {
    let f = fixture();
    let loan = borrow_book(&f.deps, borrow_cmd(1)).await.unwrap();
    let cmd = ReturnBook {
        loan_id: loan.loan_id,
        returned_at: at(2024, 1, 10),
    };

    return_book(&f.deps, cmd.clone()).await.unwrap();
    let result = return_book(&f.deps, cmd).await;

    assert!(matches!(
        result,
        Err(LoanApplicationError::Transition(
            TransitionError::IllegalTransition {
                from: LoanStatus::Returned,
                to: LoanStatus::Returned,
            }
        ))
    ));
}

#[tokio::test]
async fn test_return_before_borrow_is_rejected() {
    let f = fixture();
    let loan = borrow_book(&f.deps, borrow_cmd(1)).await.unwrap();

    let result = return_book(
        &f.deps,
        ReturnBook {
            loan_id: loan.loan_id,
            returned_at: at(2023, 12, 25),
        },
    )
    .await;

    assert!(matches!(
        result,
        Err(LoanApplicationError::Transition(
            TransitionError::ReturnBeforeBorrow
        ))
    ));
    let stored = get_loan(&f.deps, loan.loan_id).await.unwrap();
    assert_eq!(stored.status, LoanStatus::Borrowed);
}

#[tokio::test]
async fn test_return_unknown_loan() {
    let f = fixture();

    let result = return_book(
        &f.deps,
        ReturnBook {
            loan_id: LoanId::new(404),
            returned_at: at(2024, 1, 10),
        },
    )
    .await;

    assert!(matches!(result, Err(LoanApplicationError::LoanNotFound)));
}

#[tokio::test]
async fn test_stale_transition_loses() {
    let f = fixture();
    let loan = borrow_book(&f.deps, borrow_cmd(1)).await.unwrap();

    // 返却が先に確定する
    return_book(
        &f.deps,
        ReturnBook {
            loan_id: loan.loan_id,
            returned_at: at(2024, 1, 20),
        },
    )
    .await
    .unwrap();

    // borrowed のまま読み込んだ古いスナップショットで延滞にしようとする
    let overdue = library_loans::domain::loan::mark_overdue(
        &loan,
        at(2024, 1, 20),
        &FinePolicy::default(),
    )
    .unwrap();
    let result = f
        .repository
        .update_transition(&overdue, LoanStatus::Borrowed)
        .await;

    assert!(matches!(
        result,
        Err(LoanRepositoryError::StaleStatus {
            expected: LoanStatus::Borrowed,
            ..
        })
    ));
    let stored = get_loan(&f.deps, loan.loan_id).await.unwrap();
    assert_eq!(stored.status, LoanStatus::Returned);
}

// ============================================================================
// 延滞検出
// ============================================================================

#[tokio::test]
async fn test_detect_overdue_after_due_date() {
    let f = fixture();
    let loan = borrow_book(&f.deps, borrow_cmd(1)).await.unwrap();

    // 期限当日はまだ延滞ではない
    let summary = detect_overdue_loans(&f.deps, at(2024, 1, 14)).await.unwrap();
    assert_eq!(summary, OverdueSweepSummary::default());

    let summary = detect_overdue_loans(&f.deps, at(2024, 1, 15)).await.unwrap();
    assert_eq!(summary.marked_overdue, 1);

    let stored = get_loan(&f.deps, loan.loan_id).await.unwrap();
    assert_eq!(stored.status, LoanStatus::Overdue);
    assert_eq!(stored.return_date, None);
    assert_eq!(stored.fine_amount.value(), Decimal::new(50, 2));
}

#[tokio::test]
async fn test_detect_overdue_refreshes_fines() {
    let f = fixture();
    let loan = borrow_book(&f.deps, borrow_cmd(1)).await.unwrap();

    detect_overdue_loans(&f.deps, at(2024, 1, 15)).await.unwrap();
    let summary = detect_overdue_loans(&f.deps, at(2024, 1, 18)).await.unwrap();

    assert_eq!(summary.marked_overdue, 0);
    assert_eq!(summary.fines_refreshed, 1);
    let stored = get_loan(&f.deps, loan.loan_id).await.unwrap();
    assert_eq!(stored.fine_amount.value(), Decimal::new(200, 2));

    // 同じ時刻で再実行しても変化しない
    let summary = detect_overdue_loans(&f.deps, at(2024, 1, 18)).await.unwrap();
    assert_eq!(summary, OverdueSweepSummary::default());
}

#[tokio::test]
async fn test_overdue_loan_can_be_returned_with_fine() {
    let f = fixture();
    let loan = borrow_book(&f.deps, borrow_cmd(1)).await.unwrap();
    detect_overdue_loans(&f.deps, at(2024, 1, 15)).await.unwrap();

    let returned = return_book(
        &f.deps,
        ReturnBook {
            loan_id: loan.loan_id,
            returned_at: at(2024, 1, 16),
        },
    )
    .await
    .unwrap();

    assert_eq!(returned.status, LoanStatus::Returned);
    assert!(returned.fine_amount.value() > Decimal::ZERO);

    // 返却済みは延滞検出の対象外
    let summary = detect_overdue_loans(&f.deps, at(2024, 2, 1)).await.unwrap();
    assert_eq!(summary, OverdueSweepSummary::default());
}

#[tokio::test]
async fn test_loans_for_user_newest_first() {
    let f = fixture();
    let older = borrow_book(&f.deps, borrow_cmd(1)).await.unwrap();
    let newer = borrow_book(
        &f.deps,
        BorrowBook {
            borrow_date: at(2024, 2, 1),
            due_date: at(2024, 2, 1) + Duration::days(14),
            ..borrow_cmd(2)
        },
    )
    .await
    .unwrap();

    let loans = loans_for_user(&f.deps, UserId::new(7)).await.unwrap();

    let ids: Vec<LoanId> = loans.iter().map(|l| l.loan_id).collect();
    assert_eq!(ids, vec![newer.loan_id, older.loan_id]);
    assert!(loans_for_user(&f.deps, UserId::new(8)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_catalog_lookup_happens_before_insert() {
    let f = fixture();
    f.books.remove_book(BookId::new(1));

    let result = borrow_book(&f.deps, borrow_cmd(1)).await;

    assert!(matches!(result, Err(LoanApplicationError::BookNotFound)));
    assert!(f.repository.is_empty());
}

#[tokio::test]
async fn test_stale_fine_refresh_does_not_lower_fine() {
    let f = fixture();
    let policy = FinePolicy::default();
    let loan = borrow_book(&f.deps, borrow_cmd(1)).await.unwrap();
    detect_overdue_loans(&f.deps, at(2024, 1, 15)).await.unwrap();

    // 2つのバッチが同じスナップショットを読み込む
    let snapshot = get_loan(&f.deps, loan.loan_id).await.unwrap();
    let newer = library_loans::domain::loan::accrue_fine(&snapshot, at(2024, 1, 30), &policy)
        .unwrap();
    let older = library_loans::domain::loan::accrue_fine(&snapshot, at(2024, 1, 20), &policy)
        .unwrap();

    f.repository
        .update_transition(&newer, LoanStatus::Overdue)
        .await
        .unwrap();
    let stored = f
        .repository
        .update_transition(&older, LoanStatus::Overdue)
        .await
        .unwrap();

    // 16日延滞 × 0.50 のまま
    assert_eq!(stored.fine_amount.value(), Decimal::new(800, 2));
    let stored = get_loan(&f.deps, loan.loan_id).await.unwrap();
    assert_eq!(stored.fine_amount.value(), Decimal::new(800, 2));
}

#[tokio::test]
async fn test_return_reports_stored_fine() {
    let f = fixture();
    let policy = FinePolicy::default();
    let loan = borrow_book(&f.deps, borrow_cmd(1)).await.unwrap();
    let overdue =
        library_loans::domain::loan::mark_overdue(&loan, at(2024, 1, 30), &policy).unwrap();
    f.repository
        .update_transition(&overdue, LoanStatus::Borrowed)
        .await
        .unwrap();

    // 返却日時点の額より保存済みの額が大きい場合は保存済みの額が残る
    let returned = return_book(
        &f.deps,
        ReturnBook {
            loan_id: loan.loan_id,
            returned_at: at(2024, 1, 20),
        },
    )
    .await
    .unwrap();

    assert_eq!(returned.status, LoanStatus::Returned);
    assert_eq!(returned.fine_amount.value(), Decimal::new(800, 2));
    assert_eq!(get_loan(&f.deps, loan.loan_id).await.unwrap(), returned);
}
