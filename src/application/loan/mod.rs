mod errors;
mod loan_service;
mod overdue_detection;

pub use errors::{LoanApplicationError, Result};
pub use loan_service::{ServiceDependencies, borrow_book, get_loan, loans_for_user, return_book};
pub use overdue_detection::{OverdueSweepSummary, detect_overdue_loans};
