use crate::domain::value_objects::UserId;
use crate::ports::user_directory::{Result, UserDirectory as UserDirectoryTrait};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

/// UserDirectoryのモック実装
pub struct UserDirectory {
    users: Mutex<HashSet<UserId>>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashSet::new()),
        }
    }

    /// テスト用に利用者を登録
    pub fn add_user(&self, user_id: UserId) {
        self.users.lock().unwrap().insert(user_id);
    }
}

impl Default for UserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserDirectoryTrait for UserDirectory {
    async fn exists(&self, user_id: UserId) -> Result<bool> {
        Ok(self.users.lock().unwrap().contains(&user_id))
    }
}
