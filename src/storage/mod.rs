pub mod local;
pub mod s3;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub use local::LocalTree;
pub use s3::S3Store;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- list, delete 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- 上传分块等
pub const IO_TIMEOUT_SECS: u64 = 300;
/// S3 单次批量删除的最大 key 数
pub const MAX_DELETE_BATCH: usize = 1000;

/// 远程对象信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    /// 完整 key，或（在清单中）去掉前缀后的相对路径
    pub key: String,
    pub size: u64,
    /// 存储返回的原始 ETag，可能带引号或 `-N` 后缀
    pub etag: String,
}

/// 本地文件（已 stat，未计算指纹）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// 相对路径，使用 `/` 分隔
    pub path: String,
    pub full_path: PathBuf,
    pub size: u64,
}

/// 单个上传请求
#[derive(Debug, Clone)]
pub struct PutRequest {
    pub key: String,
    pub source: PathBuf,
    pub size: u64,
    pub content_type: String,
    pub cache_control: Option<String>,
    /// 大于该值的文件使用分块上传
    pub chunk_size: u64,
}

impl PutRequest {
    /// 恰好一块的文件由 opendal 以单次 PUT 发送，不算分块
    pub fn is_multipart(&self) -> bool {
        self.size > self.chunk_size
    }
}

/// 远程对象存储抽象接口
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 列出前缀下所有对象（内部处理分页）
    async fn list_objects(&self, prefix: &str) -> Result<Vec<RemoteObject>>;

    /// 上传单个文件
    async fn put_object(&self, request: &PutRequest) -> Result<()>;

    /// 批量删除，返回确认删除的 key
    async fn delete_objects(&self, keys: &[String]) -> Result<Vec<String>>;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 远程文件清单：相对 key -> 对象
#[derive(Debug, Clone, Default)]
pub struct RemoteInventory {
    objects: BTreeMap<String, RemoteObject>,
}

impl RemoteInventory {
    /// 由列表结果构建，去掉 key 的前缀，跳过空 key 和目录占位对象
    pub fn from_listing(objects: Vec<RemoteObject>, prefix: &str) -> Self {
        let objects = objects
            .into_iter()
            .filter_map(|mut obj| {
                let relative = obj.key.strip_prefix(prefix)?.to_string();
                if relative.is_empty() || relative.ends_with('/') {
                    return None;
                }
                obj.key = relative.clone();
                Some((relative, obj))
            })
            .collect();
        Self { objects }
    }

    /// 只保留满足条件的 key
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.objects.retain(|key, _| keep(key));
    }

    pub fn get(&self, key: &str) -> Option<&RemoteObject> {
        self.objects.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    /// 按 key 排序
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl FromIterator<RemoteObject> for RemoteInventory {
    fn from_iter<I: IntoIterator<Item = RemoteObject>>(iter: I) -> Self {
        Self {
            objects: iter.into_iter().map(|o| (o.key.clone(), o)).collect(),
        }
    }
}
