use crate::domain::value_objects::{BookId, UserId};
use crate::ports::book_catalog::{BookCatalog as BookCatalogTrait, Result};
use crate::ports::user_directory::UserDirectory as UserDirectoryTrait;
use async_trait::async_trait;
use sqlx::PgPool;

/// BookCatalog backed by the external `books` table.
///
/// The table is owned by the catalog context; only existence is checked here.
pub struct BookCatalog {
    pool: PgPool,
}

impl BookCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookCatalogTrait for BookCatalog {
    async fn exists(&self, book_id: BookId) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM books WHERE book_id = $1)")
                .bind(book_id.to_db())
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }
}

/// UserDirectory backed by the external `users` table.
pub struct UserDirectory {
    pool: PgPool,
}

impl UserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectoryTrait for UserDirectory {
    async fn exists(&self, user_id: UserId) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE user_id = $1)")
                .bind(user_id.to_db())
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }
}
