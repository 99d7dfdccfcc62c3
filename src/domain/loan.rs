use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    BookId, FineAmount, FinePolicy, LoanId, LoanValidationError, TransitionError, UserId,
};

/// 貸出ステータス
///
/// ストレージ上は `loan_status` 列挙型（'borrowed', 'returned', 'overdue'）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    /// 貸出中
    #[default]
    Borrowed,
    /// 返却済み
    Returned,
    /// 延滞中
    Overdue,
}

impl LoanStatus {
    /// 宣言順のすべての値
    pub const ALL: [LoanStatus; 3] = [LoanStatus::Borrowed, LoanStatus::Returned, LoanStatus::Overdue];

    /// 文字列表現を取得する
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Borrowed => "borrowed",
            LoanStatus::Returned => "returned",
            LoanStatus::Overdue => "overdue",
        }
    }

    pub fn is_returned(&self) -> bool {
        matches!(self, LoanStatus::Returned)
    }

    pub fn is_overdue(&self) -> bool {
        matches!(self, LoanStatus::Overdue)
    }

    /// 未返却（borrowed または overdue）
    pub fn is_outstanding(&self) -> bool {
        !self.is_returned()
    }

    /// 状態遷移が許可されているか確認する
    ///
    /// 許可される遷移：
    /// - borrowed → overdue（延滞検出）
    /// - borrowed → returned（返却）
    /// - overdue → returned（延滞後の返却）
    /// - overdue → overdue（延滞料金の更新）
    pub fn check_transition(self, to: LoanStatus) -> Result<(), TransitionError> {
        match (self, to) {
            (LoanStatus::Borrowed, LoanStatus::Overdue)
            | (LoanStatus::Borrowed, LoanStatus::Returned)
            | (LoanStatus::Overdue, LoanStatus::Returned)
            | (LoanStatus::Overdue, LoanStatus::Overdue) => Ok(()),
            (from, to) => Err(TransitionError::IllegalTransition { from, to }),
        }
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = LoanValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "borrowed" => Ok(LoanStatus::Borrowed),
            "returned" => Ok(LoanStatus::Returned),
            "overdue" => Ok(LoanStatus::Overdue),
            _ => Err(LoanValidationError::InvalidStatus {
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 貸出レコード - 1人の利用者による1冊の書籍の1回の貸出
///
/// `loans` テーブルの1行に対応する。書籍と利用者はIDでのみ参照する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    // 識別子（ストレージが採番）
    pub loan_id: LoanId,

    // 外部コンテキストへの参照（IDのみ）
    pub book_id: BookId,
    pub user_id: UserId,

    // 貸出期間
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,

    pub status: LoanStatus,
    pub fine_amount: FineAmount,
}

/// 検証済みの新規貸出（loan_id未採番）
///
/// `NewLoan::new` または `LoanDraft::validate` からのみ作成できるため、
/// この型の値はすべての列制約を満たしている。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewLoan {
    book_id: BookId,
    user_id: UserId,
    borrow_date: DateTime<Utc>,
    due_date: DateTime<Utc>,
    return_date: Option<DateTime<Utc>>,
    status: LoanStatus,
    fine_amount: FineAmount,
}

impl NewLoan {
    /// 必須項目のみから新規貸出を作成する
    ///
    /// status = borrowed、return_date = なし、fine_amount = 0.00 となる。
    pub fn new(
        book_id: BookId,
        user_id: UserId,
        borrow_date: DateTime<Utc>,
        due_date: DateTime<Utc>,
    ) -> Result<Self, LoanValidationError> {
        if due_date < borrow_date {
            return Err(LoanValidationError::DueBeforeBorrow);
        }

        Ok(Self {
            book_id,
            user_id,
            borrow_date,
            due_date,
            return_date: None,
            status: LoanStatus::Borrowed,
            fine_amount: FineAmount::zero(),
        })
    }

    pub fn book_id(&self) -> BookId {
        self.book_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn borrow_date(&self) -> DateTime<Utc> {
        self.borrow_date
    }

    pub fn due_date(&self) -> DateTime<Utc> {
        self.due_date
    }

    pub fn return_date(&self) -> Option<DateTime<Utc>> {
        self.return_date
    }

    pub fn status(&self) -> LoanStatus {
        self.status
    }

    pub fn fine_amount(&self) -> FineAmount {
        self.fine_amount
    }

    /// 採番されたIDを付与して貸出レコードにする
    pub fn into_loan(self, loan_id: LoanId) -> Loan {
        Loan {
            loan_id,
            book_id: self.book_id,
            user_id: self.user_id,
            borrow_date: self.borrow_date,
            due_date: self.due_date,
            return_date: self.return_date,
            status: self.status,
            fine_amount: self.fine_amount,
        }
    }
}

/// 未検証の貸出入力
///
/// 外部（サービス層のリクエスト、インポートなど）から受け取る形。
/// すべての項目が省略可能で、statusは自由な文字列として受け取る。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanDraft {
    pub book_id: Option<BookId>,
    pub user_id: Option<UserId>,
    pub borrow_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub fine_amount: Option<Decimal>,
}

impl LoanDraft {
    /// 列制約を検証して `NewLoan` に変換する
    ///
    /// 省略された status は borrowed、fine_amount は 0.00 になる。
    ///
    /// # 引数
    /// * `now` - overdue指定の妥当性判定に使う現在時刻
    pub fn validate(self, now: DateTime<Utc>) -> Result<NewLoan, LoanValidationError> {
        let book_id = self
            .book_id
            .ok_or(LoanValidationError::Missing { field: "book_id" })?;
        let user_id = self
            .user_id
            .ok_or(LoanValidationError::Missing { field: "user_id" })?;
        let borrow_date = self
            .borrow_date
            .ok_or(LoanValidationError::Missing { field: "borrow_date" })?;
        let due_date = self
            .due_date
            .ok_or(LoanValidationError::Missing { field: "due_date" })?;

        let status = match self.status.as_deref() {
            Some(value) => value.parse::<LoanStatus>()?,
            None => LoanStatus::default(),
        };
        let fine_amount = match self.fine_amount {
            Some(value) => FineAmount::try_from(value)?,
            None => FineAmount::zero(),
        };

        check_record(borrow_date, due_date, self.return_date, status, now)?;

        Ok(NewLoan {
            book_id,
            user_id,
            borrow_date,
            due_date,
            return_date: self.return_date,
            status,
            fine_amount,
        })
    }
}

/// 日付・ステータスの組み合わせを検証する
fn check_record(
    borrow_date: DateTime<Utc>,
    due_date: DateTime<Utc>,
    return_date: Option<DateTime<Utc>>,
    status: LoanStatus,
    now: DateTime<Utc>,
) -> Result<(), LoanValidationError> {
    check_stored_record(borrow_date, due_date, return_date, status)?;

    if status.is_overdue() && now <= due_date {
        return Err(LoanValidationError::NotYetOverdue);
    }

    Ok(())
}

/// 時刻に依存しない不変条件（ストレージのCHECK制約と同じ範囲）
fn check_stored_record(
    borrow_date: DateTime<Utc>,
    due_date: DateTime<Utc>,
    return_date: Option<DateTime<Utc>>,
    status: LoanStatus,
) -> Result<(), LoanValidationError> {
    if due_date < borrow_date {
        return Err(LoanValidationError::DueBeforeBorrow);
    }

    if return_date.is_some_and(|returned| returned < borrow_date) {
        return Err(LoanValidationError::ReturnBeforeBorrow);
    }

    // return_date が設定されている ⇔ status = returned
    if return_date.is_some() != status.is_returned() {
        return Err(LoanValidationError::ReturnDateStatusMismatch { status });
    }

    Ok(())
}

/// 貸出レコードが不変条件を満たすか検証する
///
/// `now` 時点で overdue が妥当か（返却期限を過ぎているか）も確認する。
pub fn validate_loan(loan: &Loan, now: DateTime<Utc>) -> Result<(), LoanValidationError> {
    check_record(
        loan.borrow_date,
        loan.due_date,
        loan.return_date,
        loan.status,
        now,
    )
}

/// 永続化済みの貸出レコードを読み込み時に検証する
///
/// 時刻に依存する規則は含めない。延滞にした後で返却期限が延長された
/// 貸出も読み込めるようにするため。
pub fn validate_stored_loan(loan: &Loan) -> Result<(), LoanValidationError> {
    check_stored_record(loan.borrow_date, loan.due_date, loan.return_date, loan.status)
}

/// 純粋関数：延滞判定
pub fn is_overdue(loan: &Loan, now: DateTime<Utc>) -> bool {
    loan.status.is_outstanding() && now > loan.due_date
}

/// 純粋関数：貸出を延滞にする
///
/// ビジネスルール：
/// - borrowed の貸出のみ
/// - 返却期限を過ぎていること
/// - 延滞料金は `now` 時点の額
///
/// 副作用なし。新しいLoanを返す。
pub fn mark_overdue(
    loan: &Loan,
    now: DateTime<Utc>,
    policy: &FinePolicy,
) -> Result<Loan, TransitionError> {
    if loan.status != LoanStatus::Borrowed {
        return Err(TransitionError::IllegalTransition {
            from: loan.status,
            to: LoanStatus::Overdue,
        });
    }

    if now <= loan.due_date {
        return Err(TransitionError::NotYetDue);
    }

    Ok(Loan {
        status: LoanStatus::Overdue,
        fine_amount: policy.fine_for(loan.due_date, now),
        ..loan.clone()
    })
}

/// 純粋関数：延滞中の貸出の延滞料金を更新する
///
/// 料金は減らない（方針変更などで計算結果が下がっても現在額を維持する）。
pub fn accrue_fine(
    loan: &Loan,
    now: DateTime<Utc>,
    policy: &FinePolicy,
) -> Result<Loan, TransitionError> {
    if loan.status != LoanStatus::Overdue {
        return Err(TransitionError::IllegalTransition {
            from: loan.status,
            to: LoanStatus::Overdue,
        });
    }

    let fine_amount = policy.fine_for(loan.due_date, now).max(loan.fine_amount);

    Ok(Loan {
        fine_amount,
        ..loan.clone()
    })
}

/// 純粋関数：書籍を返却する
///
/// ビジネスルール：
/// - borrowed / overdue の貸出のみ（returned は不可）
/// - 返却日は貸出日以降
/// - 延滞料金は返却日時点で確定する
///
/// 副作用なし。新しいLoanを返す。
pub fn return_loan(
    loan: &Loan,
    returned_at: DateTime<Utc>,
    policy: &FinePolicy,
) -> Result<Loan, TransitionError> {
    loan.status.check_transition(LoanStatus::Returned)?;

    if returned_at < loan.borrow_date {
        return Err(TransitionError::ReturnBeforeBorrow);
    }

    let fine_amount = policy
        .fine_for(loan.due_date, returned_at)
        .max(loan.fine_amount);

    Ok(Loan {
        return_date: Some(returned_at),
        status: LoanStatus::Returned,
        fine_amount,
        ..loan.clone()
    })
}
