use super::LocalFile;
use crate::error::{io_err, SyncError};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 本地源目录
///
/// 所有路径都相对 `base_path` 拼接，不修改进程工作目录。
#[derive(Debug, Clone)]
pub struct LocalTree {
    base_path: PathBuf,
    name: String,
}

impl LocalTree {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let base_path = path.into();
        let name = format!("local:{}", base_path.display());
        Self { base_path, name }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 相对路径 -> 绝对路径
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }

    /// 规范化路径分隔符（统一使用 /）
    fn normalize_path(path: &str) -> String {
        path.replace('\\', "/")
    }

    /// 递归列出所有普通文件（不跟随符号链接），按文件名排序遍历
    pub async fn list_files(&self) -> Result<Vec<String>, SyncError> {
        let base = self.base_path.clone();

        // 使用 spawn_blocking 避免阻塞 async runtime
        tokio::task::spawn_blocking(move || Self::walk(&base)).await?
    }

    fn walk(base: &Path) -> Result<Vec<String>, SyncError> {
        let mut files = Vec::new();

        for entry in WalkDir::new(base)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(base).to_path_buf();
                io_err(path, e.into())
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let Some(relative) = entry
                .path()
                .strip_prefix(base)
                .ok()
                .and_then(|p| p.to_str())
            else {
                return Err(io_err(
                    entry.path(),
                    std::io::Error::new(std::io::ErrorKind::InvalidData, "路径不是有效的 UTF-8"),
                ));
            };

            files.push(Self::normalize_path(relative));
        }

        Ok(files)
    }

    /// stat 单个文件
    pub async fn describe(&self, path: &str) -> Result<LocalFile, SyncError> {
        let full_path = self.resolve(path);
        let metadata = tokio::fs::metadata(&full_path)
            .await
            .map_err(|e| io_err(&full_path, e))?;

        Ok(LocalFile {
            path: path.to_string(),
            full_path,
            size: metadata.len(),
        })
    }
}
