//! 同步选项
//!
//! 可以从 JSON 配置文件加载，命令行参数覆盖文件中的值。

use crate::core::fingerprint::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use crate::core::transfer::DEFAULT_CONCURRENCY;
use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 同步选项
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptions {
    /// 目标 bucket
    #[serde(default)]
    pub bucket: String,
    /// 远程 key 前缀，直接拼接在相对路径前
    #[serde(default)]
    pub prefix: String,
    /// 本地源目录
    #[serde(default)]
    pub dir: PathBuf,
    /// 包含规则（至少一条）
    #[serde(default)]
    pub includes: Vec<String>,
    /// 排除规则，优先于包含规则
    #[serde(default)]
    pub excludes: Vec<String>,
    /// 上传优先级，逗号分隔的 glob 列表
    #[serde(default)]
    pub order: String,
    /// `glob=value` 形式的 Cache-Control 规则
    #[serde(default)]
    pub cache_control: Vec<String>,
    #[serde(default)]
    pub force_upload: bool,
    #[serde(default)]
    pub delete_orphaned: bool,
    /// 删除前等待（毫秒）
    #[serde(default)]
    pub wait_before_delete: u64,
    #[serde(default)]
    pub dry_run: bool,
    /// 最大并发上传数
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// 分块大小（字节），上传与指纹共用
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// S3 兼容服务的 endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            prefix: String::new(),
            dir: PathBuf::new(),
            includes: Vec::new(),
            excludes: Vec::new(),
            order: String::new(),
            cache_control: Vec::new(),
            force_upload: false,
            delete_orphaned: false,
            wait_before_delete: 0,
            dry_run: false,
            concurrency: default_concurrency(),
            chunk_size: default_chunk_size(),
            region: None,
            endpoint: None,
        }
    }
}

impl SyncOptions {
    /// 从 JSON 文件加载
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let content = fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("读取配置文件 {} 失败: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| SyncError::Config(format!("解析配置文件 {} 失败: {}", path.display(), e)))
    }

    /// 校验必填项
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.bucket.trim().is_empty() {
            return Err(SyncError::Config("bucket 不能为空".to_string()));
        }
        if self.dir.as_os_str().is_empty() {
            return Err(SyncError::Config("dir 不能为空".to_string()));
        }
        if self.includes.iter().all(|g| g.trim().is_empty()) {
            return Err(SyncError::Config("至少需要一条 includes 规则".to_string()));
        }
        if self.concurrency == 0 {
            return Err(SyncError::Config("concurrency 必须大于 0".to_string()));
        }
        // 分块大小不在 S3 范围内时，实际上传的分块与本地指纹对不上
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(SyncError::Config(format!(
                "chunkSize 必须在 {} 到 {} 字节之间",
                MIN_CHUNK_SIZE, MAX_CHUNK_SIZE
            )));
        }
        Ok(())
    }
}
