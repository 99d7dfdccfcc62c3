use crate::domain::{
    Loan, LoanStatus, NewLoan,
    value_objects::{LoanId, UserId},
};
use crate::ports::loan_repository::{
    LoanRepository as LoanRepositoryTrait, LoanRepositoryError, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

struct Store {
    loans: BTreeMap<LoanId, Loan>,
    next_id: u32,
    rejected_reference: Option<&'static str>,
}

/// LoanRepositoryのインメモリ実装
///
/// PostgreSQL実装と同じく、`update_transition` は現在のstatusが
/// 期待値と一致する場合のみ更新し、fine_amount を減らさない。
pub struct LoanRepository {
    store: Mutex<Store>,
}

impl LoanRepository {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store {
                loans: BTreeMap::new(),
                next_id: 1,
                rejected_reference: None,
            }),
        }
    }

    /// 以降のinsertを外部キー制約違反にする（参照先の削除競合の再現用）
    pub fn reject_reference(&self, field: &'static str) {
        self.store.lock().unwrap().rejected_reference = Some(field);
    }

    /// 保存されている貸出の件数
    pub fn len(&self) -> usize {
        self.store.lock().unwrap().loans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LoanRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LoanRepositoryTrait for LoanRepository {
    async fn insert(&self, loan: NewLoan) -> Result<Loan> {
        let mut store = self.store.lock().unwrap();
        if let Some(field) = store.rejected_reference {
            return Err(LoanRepositoryError::ForeignKeyViolation { field });
        }

        let loan_id = LoanId::new(store.next_id);
        store.next_id += 1;

        let loan = loan.into_loan(loan_id);
        store.loans.insert(loan_id, loan.clone());
        Ok(loan)
    }

    async fn get_by_id(&self, loan_id: LoanId) -> Result<Option<Loan>> {
        Ok(self.store.lock().unwrap().loans.get(&loan_id).cloned())
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Loan>> {
        let store = self.store.lock().unwrap();
        let mut loans: Vec<Loan> = store
            .loans
            .values()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        loans.sort_by(|a, b| {
            b.borrow_date
                .cmp(&a.borrow_date)
                .then(b.loan_id.cmp(&a.loan_id))
        });
        Ok(loans)
    }

    async fn find_overdue_candidates(&self, cutoff: DateTime<Utc>) -> Result<Vec<Loan>> {
        let store = self.store.lock().unwrap();
        let mut loans: Vec<Loan> = store
            .loans
            .values()
            .filter(|l| l.status == LoanStatus::Borrowed && l.due_date < cutoff)
            .cloned()
            .collect();
        loans.sort_by_key(|l| l.due_date);
        Ok(loans)
    }

    async fn find_by_status(&self, status: LoanStatus) -> Result<Vec<Loan>> {
        let store = self.store.lock().unwrap();
        let mut loans: Vec<Loan> = store
            .loans
            .values()
            .filter(|l| l.status == status)
            .cloned()
            .collect();
        loans.sort_by_key(|l| l.due_date);
        Ok(loans)
    }

    async fn update_transition(&self, loan: &Loan, expected: LoanStatus) -> Result<Loan> {
        let mut store = self.store.lock().unwrap();
        let stored = store
            .loans
            .get_mut(&loan.loan_id)
            .ok_or(LoanRepositoryError::NotFound(loan.loan_id))?;

        if stored.status != expected {
            return Err(LoanRepositoryError::StaleStatus {
                loan_id: loan.loan_id,
                expected,
            });
        }

        stored.status = loan.status;
        stored.return_date = loan.return_date;
        stored.fine_amount = stored.fine_amount.max(loan.fine_amount);
        Ok(stored.clone())
    }
}
