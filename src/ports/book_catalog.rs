use crate::domain::value_objects::BookId;
use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 書籍カタログポート
///
/// 貸出コンテキストとカタログコンテキストの境界を維持する。
/// 貸出コンテキストはBookIDのみを知り、書籍詳細は知らない。
#[async_trait]
pub trait BookCatalog: Send + Sync {
    /// 書籍がカタログに存在するか確認する
    ///
    /// 貸出作成前の参照整合性チェックに使用される。
    async fn exists(&self, book_id: BookId) -> Result<bool>;
}
