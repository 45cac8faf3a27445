//! 用户与文件记录的持久化接口及 JSON 快照实现。
//!
//! 唯一约束在存储锁内检查：并发插入同一键时，后到者返回
//! [`PersistenceError::DuplicateKey`]。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::atomic::AtomicFile;
use crate::config::MEMORY_DATABASE;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// 文件归属记录：`owner_id` 引用 [`User::id`]。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub path: String,
    pub original_name: String,
    pub owner_id: UserId,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("duplicate key: {0}")]
    DuplicateKey(&'static str),
    #[error("store io failed: {0}")]
    Io(#[from] io::Error),
    #[error("store snapshot is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 插入新用户；用户名、邮箱与哈希均不得重复。
    async fn insert(&self, user: &User) -> Result<(), PersistenceError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, PersistenceError>;
}

#[async_trait]
pub trait FileRepository: Send + Sync {
    /// 插入新记录；`path` 不得重复。
    async fn insert(&self, record: &FileRecord) -> Result<(), PersistenceError>;

    /// 仅当 `path` 与 `owner_id` 同时匹配时返回记录。
    async fn find_owned(
        &self,
        path: &str,
        owner_id: UserId,
    ) -> Result<Option<FileRecord>, PersistenceError>;

    async fn list_by_owner(&self, owner_id: UserId) -> Result<Vec<FileRecord>, PersistenceError>;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    files: Vec<FileRecord>,
}

/// 以 JSON 快照持久化的存储；每次写入后原子替换快照文件。
#[derive(Debug)]
pub struct JsonStore {
    path: Option<PathBuf>,
    state: Mutex<Snapshot>,
}

impl JsonStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(Snapshot::default()),
        }
    }

    /// 打开 `path` 处的快照；文件不存在时从空状态开始。
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        let snapshot = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Snapshot::default(),
            Err(err) => return Err(err.into()),
        };
        info!(
            path = ?path,
            users = snapshot.users.len(),
            files = snapshot.files.len(),
            "store opened"
        );
        Ok(Self {
            path: Some(path),
            state: Mutex::new(snapshot),
        })
    }

    /// `memory:` 使用非持久存储，其余视为快照路径。
    pub async fn connect(connection: &str) -> Result<Self, PersistenceError> {
        let connection = connection.trim();
        if connection == MEMORY_DATABASE {
            info!("using in-memory store");
            return Ok(Self::in_memory());
        }
        Self::open(connection).await
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        write_snapshot(path, snapshot).await?;
        debug!(path = ?path, "store snapshot written");
        Ok(())
    }
}

async fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), PersistenceError> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    let mut file = AtomicFile::new(path).await?;
    if let Err(err) = file.file_mut().write_all(&bytes).await {
        file.cleanup().await;
        return Err(err.into());
    }
    file.finalize().await?;
    Ok(())
}

#[async_trait]
impl UserRepository for JsonStore {
    async fn insert(&self, user: &User) -> Result<(), PersistenceError> {
        let mut state = self.state.lock().await;
        for existing in &state.users {
            if existing.username == user.username {
                return Err(PersistenceError::DuplicateKey("username"));
            }
            if existing.email == user.email {
                return Err(PersistenceError::DuplicateKey("email"));
            }
            if existing.password_hash == user.password_hash {
                return Err(PersistenceError::DuplicateKey("password"));
            }
        }
        state.users.push(user.clone());
        if let Err(err) = self.persist(&state).await {
            state.users.pop();
            return Err(err);
        }
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, PersistenceError> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|user| user.email == email).cloned())
    }
}

#[async_trait]
impl FileRepository for JsonStore {
    async fn insert(&self, record: &FileRecord) -> Result<(), PersistenceError> {
        let mut state = self.state.lock().await;
        if state.files.iter().any(|file| file.path == record.path) {
            return Err(PersistenceError::DuplicateKey("path"));
        }
        state.files.push(record.clone());
        if let Err(err) = self.persist(&state).await {
            state.files.pop();
            return Err(err);
        }
        Ok(())
    }

    async fn find_owned(
        &self,
        path: &str,
        owner_id: UserId,
    ) -> Result<Option<FileRecord>, PersistenceError> {
        let state = self.state.lock().await;
        Ok(state
            .files
            .iter()
            .find(|file| file.path == path && file.owner_id == owner_id)
            .cloned())
    }

    async fn list_by_owner(&self, owner_id: UserId) -> Result<Vec<FileRecord>, PersistenceError> {
        let state = self.state.lock().await;
        Ok(state
            .files
            .iter()
            .filter(|file| file.owner_id == owner_id)
            .cloned()
            .collect())
    }
}
