pub mod commands;
pub mod errors;
pub mod fine;
pub mod loan;
pub mod value_objects;

pub use errors::*;
pub use fine::FinePolicy;
pub use loan::{Loan, LoanDraft, LoanStatus, NewLoan};
pub use value_objects::*;
