use crate::domain::value_objects::UserId;
use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 利用者ディレクトリポート
///
/// 貸出コンテキストと利用者管理コンテキストの境界を維持する。
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// 利用者が存在するか確認する
    async fn exists(&self, user_id: UserId) -> Result<bool>;
}
