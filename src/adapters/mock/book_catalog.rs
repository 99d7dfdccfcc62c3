use crate::domain::value_objects::BookId;
use crate::ports::book_catalog::{BookCatalog as BookCatalogTrait, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

/// BookCatalogのモック実装
///
/// 書籍IDを保存することで状態を持ったテストをサポート。
pub struct BookCatalog {
    books: Mutex<HashSet<BookId>>,
}

impl BookCatalog {
    pub fn new() -> Self {
        Self {
            books: Mutex::new(HashSet::new()),
        }
    }

    /// テスト用に書籍を登録
    pub fn add_book(&self, book_id: BookId) {
        self.books.lock().unwrap().insert(book_id);
    }

    /// 書籍を削除（貸出後に参照先が消えたケースの再現用）
    pub fn remove_book(&self, book_id: BookId) {
        self.books.lock().unwrap().remove(&book_id);
    }
}

impl Default for BookCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BookCatalogTrait for BookCatalog {
    async fn exists(&self, book_id: BookId) -> Result<bool> {
        Ok(self.books.lock().unwrap().contains(&book_id))
    }
}
