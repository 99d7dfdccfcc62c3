pub mod book_catalog;
pub mod loan_repository;
pub mod user_directory;

pub use book_catalog::BookCatalog;
pub use loan_repository::LoanRepository;
pub use user_directory::UserDirectory;
