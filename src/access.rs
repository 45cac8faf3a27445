//! 上传与下载的访问控制：所有者只取自已验证的 [`Identity`]。

use axum::body::Bytes;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::Identity;
use crate::config::DOWNLOAD_URL_TTL_SECS;
use crate::registry::{FileRegistry, RegistryError};
use crate::storage::{ObjectStore, StorageError};
use crate::store::{FileRecord, PersistenceError};

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// 记录不存在与不属于调用者不作区分。
    #[error("file not found or access denied")]
    NotFoundOrDenied,
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<RegistryError> for AccessError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::NotFound => AccessError::NotFoundOrDenied,
            RegistryError::Persistence(err) => AccessError::Persistence(err),
        }
    }
}

/// 已写入对象存储的对象。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadedObject {
    pub path: String,
    pub original_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

pub struct AccessController {
    registry: FileRegistry,
    objects: Arc<dyn ObjectStore>,
    link_ttl: Duration,
}

impl AccessController {
    pub fn new(registry: FileRegistry, objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            registry,
            objects,
            link_ttl: Duration::seconds(DOWNLOAD_URL_TTL_SECS),
        }
    }

    pub fn registry(&self) -> &FileRegistry {
        &self.registry
    }

    /// 写入对象存储后登记归属；登记失败则删除刚写入的对象。
    pub async fn store_upload(
        &self,
        identity: &Identity,
        original_name: &str,
        data: Bytes,
    ) -> Result<FileRecord, AccessError> {
        let path = self.objects.put(original_name, data).await?;
        let object = UploadedObject {
            path: path.clone(),
            original_name: original_name.to_string(),
        };
        match self.authorize_upload(identity, object).await {
            Ok(record) => Ok(record),
            Err(err) => {
                if let Err(cleanup) = self.objects.delete(&path).await {
                    warn!(path, error = %cleanup, "failed to remove orphaned object");
                }
                Err(err)
            }
        }
    }

    pub async fn authorize_upload(
        &self,
        identity: &Identity,
        object: UploadedObject,
    ) -> Result<FileRecord, AccessError> {
        let record = self
            .registry
            .create(&object.path, &object.original_name, identity.user_id)
            .await?;
        Ok(record)
    }

    /// 所有权校验通过后才向存储端申请 15 分钟有效的签名链接。
    pub async fn authorize_download(
        &self,
        identity: &Identity,
        path: &str,
    ) -> Result<SignedUrl, AccessError> {
        self.authorize_download_at(identity, path, Utc::now()).await
    }

    pub async fn authorize_download_at(
        &self,
        identity: &Identity,
        path: &str,
        now: DateTime<Utc>,
    ) -> Result<SignedUrl, AccessError> {
        let record = match self.registry.find_owned(path, identity.user_id).await {
            Ok(record) => record,
            Err(RegistryError::NotFound) => {
                warn!(path, user_id = %identity.user_id, "download denied");
                return Err(AccessError::NotFoundOrDenied);
            }
            Err(err) => return Err(err.into()),
        };
        let expires_at = now + self.link_ttl;
        let url = self.objects.signed_read_url(&record.path, expires_at).await?;
        info!(path, user_id = %identity.user_id, %expires_at, "download link issued");
        Ok(SignedUrl { url, expires_at })
    }
}
