//! 文件归属登记：存储路径 → 所有者与原始文件名。

use std::sync::Arc;
use tracing::info;

use crate::store::{FileRecord, FileRepository, PersistenceError, UserId};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("file record not found")]
    NotFound,
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[derive(Clone)]
pub struct FileRegistry {
    files: Arc<dyn FileRepository>,
}

impl FileRegistry {
    pub fn new(files: Arc<dyn FileRepository>) -> Self {
        Self { files }
    }

    /// 登记已写入对象存储的文件；不检查对象是否真实存在。
    pub async fn create(
        &self,
        path: &str,
        original_name: &str,
        owner_id: UserId,
    ) -> Result<FileRecord, RegistryError> {
        let record = FileRecord {
            path: path.to_string(),
            original_name: original_name.to_string(),
            owner_id,
        };
        self.files.insert(&record).await?;
        info!(path, owner_id = %owner_id, "file record created");
        Ok(record)
    }

    /// 仅当 path 与 owner 同时匹配时返回记录。
    pub async fn find_owned(&self, path: &str, owner_id: UserId) -> Result<FileRecord, RegistryError> {
        self.files
            .find_owned(path, owner_id)
            .await?
            .ok_or(RegistryError::NotFound)
    }

    pub async fn list_by_owner(&self, owner_id: UserId) -> Result<Vec<FileRecord>, RegistryError> {
        Ok(self.files.list_by_owner(owner_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonStore;

    fn registry() -> FileRegistry {
        FileRegistry::new(Arc::new(JsonStore::in_memory()))
    }

    #[tokio::test]
    async fn other_users_cannot_see_record_even_with_known_path() {
        let registry = registry();
        let alice = UserId::new();
        let bob = UserId::new();
        let record = registry
            .create("1f2e-report.pdf", "report.pdf", alice)
            .await
            .expect("create");

        assert_eq!(
            registry.find_owned(&record.path, alice).await.expect("owner lookup"),
            record
        );
        assert!(matches!(
            registry.find_owned(&record.path, bob).await,
            Err(RegistryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn listing_is_a_fresh_query_each_call() {
        let registry = registry();
        let alice = UserId::new();
        registry.create("a1", "one.txt", alice).await.expect("create");
        let before = registry.list_by_owner(alice).await.expect("list");
        registry.create("a2", "two.txt", alice).await.expect("create");
        let after = registry.list_by_owner(alice).await.expect("list");

        assert_eq!(before.len(), 1);
        assert_eq!(after.len(), 2);
        assert_eq!(after[1].original_name, "two.txt");
    }

    #[tokio::test]
    async fn duplicate_path_surfaces_persistence_error() {
        let registry = registry();
        registry.create("a1", "one.txt", UserId::new()).await.expect("create");
        let result = registry.create("a1", "again.txt", UserId::new()).await;

        assert!(matches!(
            result,
            Err(RegistryError::Persistence(PersistenceError::DuplicateKey("path")))
        ));
    }
}
