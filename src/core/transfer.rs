//! 传输执行：并发上传、批量删除、dry-run

use super::rules::CacheControlRules;
use crate::error::SyncError;
use crate::storage::{LocalFile, PutRequest, RemoteStore, MAX_DELETE_BATCH};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, error, info, warn};

/// 默认最大并发上传数
pub const DEFAULT_CONCURRENCY: usize = 5;

/// 未知扩展名时的 Content-Type
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// 上传批次类型（仅用于日志）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    New,
    Modified,
}

impl fmt::Display for UploadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadKind::New => write!(f, "new"),
            UploadKind::Modified => write!(f, "modified"),
        }
    }
}

/// 传输配置
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// 远程 key 前缀（直接拼接，不自动加 `/`）
    pub prefix: String,
    pub concurrency: usize,
    pub chunk_size: u64,
    pub dry_run: bool,
}

/// 传输统计
#[derive(Debug, Default)]
struct TransferStats {
    files_completed: AtomicU64,
    files_failed: AtomicU64,
    bytes_transferred: AtomicU64,
}

/// 一批上传的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub files_uploaded: u64,
    pub bytes_transferred: u64,
}

/// 传输管理器
pub struct TransferManager {
    store: Arc<dyn RemoteStore>,
    config: TransferConfig,
    cache_control: Arc<CacheControlRules>,
}

impl TransferManager {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        config: TransferConfig,
        cache_control: CacheControlRules,
    ) -> Self {
        Self {
            store,
            config,
            cache_control: Arc::new(cache_control),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    /// 相对路径 -> 完整 key
    pub fn remote_key(&self, path: &str) -> String {
        format!("{}{}", self.config.prefix, path)
    }

    /// 根据扩展名推断 Content-Type
    pub fn content_type(path: &str) -> String {
        mime_guess::from_path(path)
            .first_raw()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string()
    }

    /// 构造上传请求
    pub fn build_request(&self, file: &LocalFile) -> PutRequest {
        PutRequest {
            key: self.remote_key(&file.path),
            source: file.full_path.clone(),
            size: file.size,
            content_type: Self::content_type(&file.path),
            cache_control: self.cache_control.resolve(&file.path).map(str::to_string),
            chunk_size: self.config.chunk_size,
        }
    }

    /// 按给定顺序提交上传，最多 `concurrency` 个同时进行
    ///
    /// 单个失败不会取消其他上传；所有任务结束后，只要有失败就返回 [`SyncError::Upload`]。
    pub async fn upload_all(
        &self,
        files: &[LocalFile],
        kind: UploadKind,
    ) -> Result<UploadSummary, SyncError> {
        if files.is_empty() {
            return Ok(UploadSummary::default());
        }

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let stats = Arc::new(TransferStats::default());
        let errors = Arc::new(RwLock::new(Vec::<String>::new()));
        let mut handles = Vec::with_capacity(files.len());

        for file in files {
            let request = self.build_request(file);

            info!(
                "上传 {}/{} ({}; type={}; Cache-Control={})",
                self.store.name(),
                request.key,
                kind,
                request.content_type,
                request.cache_control.as_deref().unwrap_or("-")
            );

            if self.config.dry_run {
                stats.files_completed.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            // 按提交顺序获取许可，保持优先级顺序
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let store = self.store.clone();
            let stats = stats.clone();
            let errors = errors.clone();

            let handle = tokio::spawn(async move {
                match store.put_object(&request).await {
                    Ok(()) => {
                        debug!("已上传 {} ({} 字节)", request.key, request.size);
                        stats.files_completed.fetch_add(1, Ordering::Relaxed);
                        stats
                            .bytes_transferred
                            .fetch_add(request.size, Ordering::Relaxed);
                    }
                    Err(e) => {
                        error!("上传失败 {}: {:#}", request.key, e);
                        stats.files_failed.fetch_add(1, Ordering::Relaxed);
                        errors.write().await.push(request.key.clone());
                    }
                }
                drop(permit);
            });

            handles.push(handle);
        }

        // 等待所有任务完成，确保结果全部可见
        let mut panicked = None;
        for handle in handles {
            if let Err(e) = handle.await {
                error!("上传任务异常退出: {}", e);
                stats.files_failed.fetch_add(1, Ordering::Relaxed);
                panicked.get_or_insert(e);
            }
        }

        let failed = stats.files_failed.load(Ordering::Relaxed) as usize;
        if failed > 0 {
            let mut keys = errors.read().await.clone();
            keys.sort();
            if keys.is_empty() {
                if let Some(e) = panicked {
                    return Err(SyncError::Task(e));
                }
            }
            return Err(SyncError::Upload {
                failed,
                total: files.len(),
                keys,
            });
        }

        Ok(UploadSummary {
            files_uploaded: stats.files_completed.load(Ordering::Relaxed),
            bytes_transferred: stats.bytes_transferred.load(Ordering::Relaxed),
        })
    }

    /// 有待删除对象时先等待 `wait`
    pub async fn wait_before_delete(&self, pending: usize, wait: Duration) {
        if pending == 0 || self.config.dry_run || wait.is_zero() {
            return;
        }
        info!(
            "删除前等待 {} 毫秒（避免访问过期引用失败）",
            wait.as_millis()
        );
        tokio::time::sleep(wait).await;
    }

    /// 分批删除相对 key，返回已删除的完整 key
    pub async fn delete_all(&self, paths: &[String]) -> Result<Vec<String>, SyncError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        if self.config.dry_run {
            for path in paths {
                info!("删除 {}/{} (dry-run)", self.store.name(), self.remote_key(path));
            }
            return Ok(Vec::new());
        }

        let keys: Vec<String> = paths.iter().map(|p| self.remote_key(p)).collect();
        let mut deleted = Vec::with_capacity(keys.len());

        for batch in keys.chunks(MAX_DELETE_BATCH) {
            let confirmed = match self.store.delete_objects(batch).await {
                Ok(confirmed) => confirmed,
                Err(e) => {
                    error!("批量删除失败 ({} 个对象): {:#}", batch.len(), e);
                    return Err(SyncError::Delete {
                        requested: keys.len(),
                        deleted: deleted.len(),
                        reason: format!("{:#}", e),
                    });
                }
            };

            for key in &confirmed {
                info!("已删除 {}", key);
            }
            deleted.extend(confirmed);
        }

        if deleted.len() < keys.len() {
            let missing: Vec<&str> = keys
                .iter()
                .filter(|k| !deleted.contains(k))
                .map(String::as_str)
                .collect();
            warn!("{} 个对象未被确认删除: {}", missing.len(), missing.join(", "));
            return Err(SyncError::Delete {
                requested: keys.len(),
                deleted: deleted.len(),
                reason: format!("未确认删除: {}", missing.join(", ")),
            });
        }

        Ok(deleted)
    }
}
