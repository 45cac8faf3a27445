//! 对象存储：桶目录下的对象写入与 HMAC 预签名读取链接。

use async_trait::async_trait;
use axum::body::Bytes;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fs::Metadata;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::atomic::AtomicFile;

type HmacSha256 = Hmac<Sha256>;

const MAX_NAME_LEN: usize = 120;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid object key")]
    InvalidKey,
    #[error("object not found")]
    NotFound,
    #[error("signature invalid")]
    SignatureInvalid,
    #[error("signed url expired")]
    Expired,
    #[error("storage io failed: {0}")]
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound,
            _ => StorageError::Io(err),
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// 写入对象并返回新生成的唯一 key。
    async fn put(&self, original_name: &str, data: Bytes) -> Result<String, StorageError>;

    /// 删除对象；对象不存在返回 `NotFound`。
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// 生成到 `expires_at` 失效的只读链接。
    async fn signed_read_url(
        &self,
        key: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, StorageError>;
}

/// 本地文件系统桶：`<root>/<bucket>/<key>`。
pub struct LocalObjectStore {
    bucket: String,
    bucket_dir: PathBuf,
    public_url: String,
    secret: Vec<u8>,
}

impl std::fmt::Debug for LocalObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalObjectStore")
            .field("bucket", &self.bucket)
            .field("bucket_dir", &self.bucket_dir)
            .field("public_url", &self.public_url)
            .finish_non_exhaustive()
    }
}

impl LocalObjectStore {
    pub fn new(
        root: impl Into<PathBuf>,
        bucket: &str,
        public_url: &str,
        secret: impl Into<Vec<u8>>,
    ) -> Self {
        let bucket = bucket.trim().to_string();
        Self {
            bucket_dir: root.into().join(&bucket),
            bucket,
            public_url: public_url.trim_end_matches('/').to_string(),
            secret: secret.into(),
        }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        if !is_single_segment(&self.bucket) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "bucket must be a single path segment",
            ));
        }
        fs::create_dir_all(&self.bucket_dir).await
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        if !is_single_segment(key) {
            return Err(StorageError::InvalidKey);
        }
        Ok(self.bucket_dir.join(key))
    }

    async fn resolve_existing(&self, key: &str) -> Result<(PathBuf, Metadata), StorageError> {
        let target = self.resolve(key)?;
        let metadata = fs::symlink_metadata(&target).await?;
        if metadata.file_type().is_symlink() || !metadata.is_file() {
            return Err(StorageError::InvalidKey);
        }
        Ok((target, metadata))
    }

    fn signature(&self, key: &str, expires: i64) -> Result<HmacSha256, StorageError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| StorageError::SignatureInvalid)?;
        mac.update(format!("read\n{}/{}\n{}", self.bucket, key, expires).as_bytes());
        Ok(mac)
    }

    /// 校验预签名参数：签名常量时间比较，过期时间含边界。
    pub fn verify_read(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.resolve(key)?;
        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| StorageError::SignatureInvalid)?;
        self.signature(key, expires)?
            .verify_slice(&provided)
            .map_err(|_| StorageError::SignatureInvalid)?;
        if now.timestamp() > expires {
            return Err(StorageError::Expired);
        }
        Ok(())
    }

    pub async fn open(&self, key: &str) -> Result<(File, Metadata), StorageError> {
        let (target, metadata) = self.resolve_existing(key).await?;
        let file = File::open(&target).await?;
        Ok((file, metadata))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, original_name: &str, data: Bytes) -> Result<String, StorageError> {
        let key = format!("{}-{}", Uuid::new_v4().simple(), sanitize_name(original_name));
        let target = self.resolve(&key)?;
        let mut file = AtomicFile::new(&target).await?;
        if let Err(err) = file.file_mut().write_all(&data).await {
            file.cleanup().await;
            return Err(StorageError::Io(err));
        }
        file.finalize().await.map_err(StorageError::Io)?;
        info!(key, bytes = data.len(), bucket = self.bucket, "object stored");
        Ok(key)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let (target, _) = self.resolve_existing(key).await?;
        fs::remove_file(&target).await?;
        info!(key, bucket = self.bucket, "object deleted");
        Ok(())
    }

    async fn signed_read_url(
        &self,
        key: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        self.resolve_existing(key).await?;
        let expires = expires_at.timestamp();
        let signature = URL_SAFE_NO_PAD.encode(self.signature(key, expires)?.finalize().into_bytes());
        debug!(key, expires, "signed read url issued");
        Ok(format!(
            "{}/objects/{}?expires={}&signature={}",
            self.public_url, key, expires, signature
        ))
    }
}

/// 从对象 key 还原上传时的文件名部分。
pub fn display_name(key: &str) -> &str {
    key.split_once('-').map(|(_, name)| name).unwrap_or(key)
}

fn is_single_segment(value: &str) -> bool {
    if value.is_empty() || value.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(value).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn sanitize_name(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let cleaned: String = base
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
pub(crate) fn test_object_store(root: &Path) -> LocalObjectStore {
    LocalObjectStore::new(root, "vault", "http://vault.test/", "storage-secret")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn query_param<'a>(url: &'a str, name: &str) -> &'a str {
        url.split_once('?')
            .expect("query")
            .1
            .split('&')
            .find_map(|pair| pair.strip_prefix(&format!("{name}=")))
            .expect("param")
    }

    #[tokio::test]
    async fn put_writes_blob_under_unique_key() {
        let temp = tempdir().expect("tempdir");
        let store = test_object_store(temp.path());
        store.ensure_root().await.expect("root");

        let first = store
            .put("notes/My Report.pdf", Bytes::from_static(b"abc"))
            .await
            .expect("put");
        let second = store
            .put("notes/My Report.pdf", Bytes::from_static(b"def"))
            .await
            .expect("put");

        assert_ne!(first, second);
        assert!(first.ends_with("-My_Report.pdf"));
        assert_eq!(display_name(&first), "My_Report.pdf");
        let on_disk = std::fs::read(temp.path().join("vault").join(&first)).expect("read");
        assert_eq!(on_disk, b"abc");
    }

    #[tokio::test]
    async fn signed_url_round_trips_through_verification() {
        let temp = tempdir().expect("tempdir");
        let store = test_object_store(temp.path());
        store.ensure_root().await.expect("root");
        let key = store.put("a.txt", Bytes::from_static(b"abc")).await.expect("put");
        let now = Utc::now();
        let expires_at = now + Duration::minutes(15);

        let url = store.signed_read_url(&key, expires_at).await.expect("sign");
        assert!(url.starts_with(&format!("http://vault.test/objects/{key}?")));
        let expires: i64 = query_param(&url, "expires").parse().expect("expires");
        let signature = query_param(&url, "signature");
        assert_eq!(expires, expires_at.timestamp());

        assert!(store.verify_read(&key, expires, signature, now).is_ok());
        assert!(matches!(
            store.verify_read(&key, expires, signature, now + Duration::minutes(16)),
            Err(StorageError::Expired)
        ));
        assert!(matches!(
            store.verify_read(&key, expires + 60, signature, now),
            Err(StorageError::SignatureInvalid)
        ));
        assert!(matches!(
            store.verify_read(&key, expires, "AAAA", now),
            Err(StorageError::SignatureInvalid)
        ));
    }

    #[tokio::test]
    async fn signature_is_bound_to_secret_and_key() {
        let temp = tempdir().expect("tempdir");
        let store = test_object_store(temp.path());
        store.ensure_root().await.expect("root");
        let key = store.put("a.txt", Bytes::from_static(b"abc")).await.expect("put");
        let other = store.put("b.txt", Bytes::from_static(b"def")).await.expect("put");
        let expires_at = Utc::now() + Duration::minutes(15);
        let url = store.signed_read_url(&key, expires_at).await.expect("sign");
        let signature = query_param(&url, "signature");

        let foreign = LocalObjectStore::new(temp.path(), "vault", "http://vault.test", "other");
        assert!(
            foreign
                .verify_read(&key, expires_at.timestamp(), signature, Utc::now())
                .is_err()
        );
        assert!(
            store
                .verify_read(&other, expires_at.timestamp(), signature, Utc::now())
                .is_err()
        );
    }

    #[tokio::test]
    async fn delete_removes_blob() {
        let temp = tempdir().expect("tempdir");
        let store = test_object_store(temp.path());
        store.ensure_root().await.expect("root");
        let key = store.put("a.txt", Bytes::from_static(b"abc")).await.expect("put");

        store.delete(&key).await.expect("delete");
        assert!(!temp.path().join("vault").join(&key).exists());
        assert!(matches!(store.delete(&key).await, Err(StorageError::NotFound)));
    }

    #[tokio::test]
    async fn signing_missing_object_fails() {
        let temp = tempdir().expect("tempdir");
        let store = test_object_store(temp.path());
        store.ensure_root().await.expect("root");

        let result = store.signed_read_url("nope", Utc::now()).await;
        assert!(matches!(result, Err(StorageError::NotFound)));
    }

    #[test]
    fn traversal_keys_are_rejected() {
        let temp = tempdir().expect("tempdir");
        let store = test_object_store(temp.path());
        for key in ["", ".", "..", "../secret", "a/b", "a\\b", "/etc"] {
            assert!(
                matches!(store.resolve(key), Err(StorageError::InvalidKey)),
                "accepted {key:?}"
            );
        }
    }

    #[test]
    fn sanitize_name_strips_directories_and_odd_characters() {
        assert_eq!(sanitize_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_name("C:\\Users\\me\\résumé v2.doc"), "r_sum__v2.doc");
        assert_eq!(sanitize_name("..."), "file");
        assert_eq!(sanitize_name(""), "file");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn open_rejects_symlink() {
        use std::os::unix::fs::symlink;

        let temp = tempdir().expect("tempdir");
        let store = test_object_store(temp.path());
        store.ensure_root().await.expect("root");
        let outside = temp.path().join("outside.txt");
        std::fs::write(&outside, b"secret").expect("write outside file");
        symlink(&outside, temp.path().join("vault").join("link")).expect("symlink");

        let result = store.open("link").await;
        assert!(matches!(result, Err(StorageError::InvalidKey)));
    }
}
