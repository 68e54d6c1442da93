//! 会话持久化
//! 三个字符串键：访问令牌、刷新令牌、序列化后的用户身份

use crate::error::AppError;
use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// 持久化键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKey {
    AccessToken,
    RefreshToken,
    User,
}

impl StoreKey {
    pub const ALL: [StoreKey; 3] = [StoreKey::AccessToken, StoreKey::RefreshToken, StoreKey::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::AccessToken => "accessToken",
            StoreKey::RefreshToken => "refreshToken",
            StoreKey::User => "user",
        }
    }
}

/// 存储中读取到的原始会话条目，可能不完整
#[derive(Clone, Default)]
pub struct PersistedSession {
    pub access_token: Option<Secret<String>>,
    pub refresh_token: Option<Secret<String>>,
    pub user: Option<String>,
}

impl PersistedSession {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.user.is_none()
    }

    fn value(&self, key: StoreKey) -> Option<&str> {
        match key {
            StoreKey::AccessToken => self.access_token.as_ref().map(|s| s.expose_secret().as_str()),
            StoreKey::RefreshToken => self.refresh_token.as_ref().map(|s| s.expose_secret().as_str()),
            StoreKey::User => self.user.as_deref(),
        }
    }

    fn insert(&mut self, key: StoreKey, value: String) {
        match key {
            StoreKey::AccessToken => self.access_token = Some(Secret::new(value)),
            StoreKey::RefreshToken => self.refresh_token = Some(Secret::new(value)),
            StoreKey::User => self.user = Some(value),
        }
    }
}

impl fmt::Debug for PersistedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedSession")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("user", &self.user)
            .finish()
    }
}

/// 会话存储接口
///
/// 只有 SessionController 写入；其他组件的读取仅作参考
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: StoreKey) -> Result<Option<String>, AppError>;

    async fn set(&self, key: StoreKey, value: &str) -> Result<(), AppError>;

    async fn remove(&self, key: StoreKey) -> Result<(), AppError>;

    /// 读取全部三个条目
    async fn load_session(&self) -> Result<PersistedSession, AppError> {
        let mut session = PersistedSession::default();
        for key in StoreKey::ALL {
            if let Some(value) = self.get(key).await? {
                session.insert(key, value);
            }
        }
        Ok(session)
    }

    /// 整组写入；中途失败时清空，避免残留部分条目
    async fn write_session(&self, session: &PersistedSession) -> Result<(), AppError> {
        for key in StoreKey::ALL {
            let result = match session.value(key) {
                Some(value) => self.set(key, value).await,
                None => self.remove(key).await,
            };
            if let Err(e) = result {
                let _ = self.clear_session().await;
                return Err(e);
            }
        }
        Ok(())
    }

    /// 整组清除；尽量删除全部键，返回第一个错误
    async fn clear_session(&self) -> Result<(), AppError> {
        let mut first_error = None;
        for key in StoreKey::ALL {
            if let Err(e) = self.remove(key).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// 内存存储（测试与一次性进程）
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<StoreKey, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前存在的键数量
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: StoreKey) -> Result<Option<String>, AppError> {
        Ok(self.entries.lock().await.get(&key).cloned())
    }

    async fn set(&self, key: StoreKey, value: &str) -> Result<(), AppError> {
        self.entries.lock().await.insert(key, value.to_string());
        Ok(())
    }

    async fn remove(&self, key: StoreKey) -> Result<(), AppError> {
        self.entries.lock().await.remove(&key);
        Ok(())
    }

    async fn write_session(&self, session: &PersistedSession) -> Result<(), AppError> {
        let mut entries = self.entries.lock().await;
        for key in StoreKey::ALL {
            match session.value(key) {
                Some(value) => {
                    entries.insert(key, value.to_string());
                }
                None => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn clear_session(&self) -> Result<(), AppError> {
        self.entries.lock().await.clear();
        Ok(())
    }
}

/// 文件存储：一个 JSON 对象，整体以临时文件 + rename 替换
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    // 串行化同一进程内的读改写
    lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_entries(&self) -> Result<BTreeMap<String, String>, AppError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                AppError::Storage(format!("{}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// 读取现有条目用于修改；文件损坏时从空集合重新开始
    async fn read_entries_for_update(&self) -> Result<BTreeMap<String, String>, AppError> {
        match self.read_entries().await {
            Err(AppError::Storage(reason)) => {
                tracing::warn!(%reason, "Discarding unreadable session file");
                Ok(BTreeMap::new())
            }
            other => other,
        }
    }

    async fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), AppError> {
        if entries.is_empty() {
            return match tokio::fs::remove_file(&self.path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            };
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let body = serde_json::to_vec_pretty(entries)
            .map_err(|e| AppError::Storage(e.to_string()))?;
        let tmp_path = self.path.with_extension("tmp");

        // 上次中断留下的临时文件可能权限更宽，删除后重新创建
        match tokio::fs::remove_file(&tmp_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        // 令牌从创建起就只对当前用户可读
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&tmp_path).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, key: StoreKey) -> Result<Option<String>, AppError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_entries().await?.remove(key.as_str()))
    }

    async fn set(&self, key: StoreKey, value: &str) -> Result<(), AppError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries_for_update().await?;
        entries.insert(key.as_str().to_string(), value.to_string());
        self.write_entries(&entries).await
    }

    async fn remove(&self, key: StoreKey) -> Result<(), AppError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries_for_update().await?;
        if entries.remove(key.as_str()).is_some() {
            self.write_entries(&entries).await?;
        }
        Ok(())
    }

    async fn load_session(&self) -> Result<PersistedSession, AppError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;
        let mut session = PersistedSession::default();
        for key in StoreKey::ALL {
            if let Some(value) = entries.remove(key.as_str()) {
                session.insert(key, value);
            }
        }
        Ok(session)
    }

    async fn write_session(&self, session: &PersistedSession) -> Result<(), AppError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries_for_update().await?;
        for key in StoreKey::ALL {
            match session.value(key) {
                Some(value) => {
                    entries.insert(key.as_str().to_string(), value.to_string());
                }
                None => {
                    entries.remove(key.as_str());
                }
            }
        }
        self.write_entries(&entries).await
    }

    async fn clear_session(&self) -> Result<(), AppError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries_for_update().await?;
        for key in StoreKey::ALL {
            entries.remove(key.as_str());
        }
        self.write_entries(&entries).await
    }
}
