pub mod catalog;
pub mod loan_repository;
pub mod schema;
pub mod schema_sync;

// パブリックに型を再エクスポート
pub use catalog::{BookCatalog as PostgresBookCatalog, UserDirectory as PostgresUserDirectory};
pub use loan_repository::LoanRepository as PostgresLoanRepository;
pub use schema_sync::{SchemaSyncError, SchemaSyncReport, ensure_loan_schema};
