use super::fingerprint::normalize_etag;
use crate::error::SyncError;
use crate::storage::{LocalFile, RemoteInventory, RemoteObject};
use std::collections::HashSet;
use tracing::debug;

/// 单个本地文件与远程对象的比较结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRelation {
    /// 远程不存在
    New,
    /// 强制上传
    Forced,
    /// 大小不同（未计算指纹）
    SizeChanged { remote: u64, local: u64 },
    /// 指纹不同
    EtagChanged { remote: String, local: String },
    /// 大小和指纹都相同
    Unchanged,
}

impl FileRelation {
    pub fn needs_upload(&self) -> bool {
        !matches!(self, FileRelation::Unchanged)
    }
}

/// 分类结果
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub new_files: Vec<LocalFile>,
    pub modified_files: Vec<LocalFile>,
    /// 未变化的相对路径
    pub unchanged: Vec<String>,
    /// 远程多余的相对 key（未开启删除时为空）
    pub orphaned: Vec<String>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty() && self.modified_files.is_empty() && self.orphaned.is_empty()
    }
}

/// 比较配置
#[derive(Debug, Clone, Copy)]
pub struct CompareConfig {
    /// 远程存在的文件一律视为已修改
    pub force_upload: bool,
    /// 是否检测远程孤立文件
    pub delete_orphaned: bool,
    /// 指纹分块大小，必须与上传分块一致
    pub chunk_size: u64,
}

/// 文件比较器
#[derive(Debug, Clone, Copy)]
pub struct FileComparator {
    config: CompareConfig,
}

impl FileComparator {
    pub fn new(config: CompareConfig) -> Self {
        Self { config }
    }

    /// 比较单个文件，只在大小相同时计算指纹（阻塞 IO）
    pub fn compare_file(
        &self,
        file: &LocalFile,
        remote: Option<&RemoteObject>,
    ) -> Result<FileRelation, SyncError> {
        let Some(remote) = remote else {
            return Ok(FileRelation::New);
        };

        if self.config.force_upload {
            return Ok(FileRelation::Forced);
        }

        if file.size != remote.size {
            return Ok(FileRelation::SizeChanged {
                remote: remote.size,
                local: file.size,
            });
        }

        let hashed = file.clone().ensure_fingerprint(self.config.chunk_size)?;
        let remote_etag = normalize_etag(&remote.etag);
        if hashed.fingerprint == remote_etag {
            return Ok(FileRelation::Unchanged);
        }

        Ok(FileRelation::EtagChanged {
            remote: remote_etag.to_string(),
            local: hashed.fingerprint,
        })
    }

    /// 对已过滤的本地文件和远程清单分类
    ///
    /// 结果中 new/modified 保持本地枚举顺序，orphaned 按 key 排序。
    pub fn compare(
        &self,
        files: Vec<LocalFile>,
        inventory: &RemoteInventory,
    ) -> Result<SyncPlan, SyncError> {
        let mut plan = SyncPlan::default();

        let local_paths: HashSet<String> = if self.config.delete_orphaned {
            files.iter().map(|f| f.path.clone()).collect()
        } else {
            HashSet::new()
        };

        for file in files {
            let relation = self.compare_file(&file, inventory.get(&file.path))?;
            match relation {
                FileRelation::New => {
                    debug!("新文件: {}", file.path);
                    plan.new_files.push(file);
                }
                FileRelation::Forced => {
                    debug!("强制上传: {}", file.path);
                    plan.modified_files.push(file);
                }
                FileRelation::SizeChanged { remote, local } => {
                    debug!("文件大小变化: {} ({} -> {})", file.path, remote, local);
                    plan.modified_files.push(file);
                }
                FileRelation::EtagChanged { remote, local } => {
                    debug!("ETag 变化: {} ('{}' -> '{}')", file.path, remote, local);
                    plan.modified_files.push(file);
                }
                FileRelation::Unchanged => {
                    debug!("文件未变化，跳过: {}", file.path);
                    plan.unchanged.push(file.path);
                }
            }
        }

        if self.config.delete_orphaned {
            for key in inventory.keys() {
                if !local_paths.contains(key) {
                    debug!("孤立文件: {}", key);
                    plan.orphaned.push(key.to_string());
                }
            }
        }

        Ok(plan)
    }
}
