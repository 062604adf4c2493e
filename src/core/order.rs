//! 上传顺序：按 glob 优先级列表排序

use super::glob::{compile_all, Pattern};
use crate::error::SyncError;
use crate::storage::LocalFile;

/// 上传优先级规则
#[derive(Debug, Clone, Default)]
pub struct OrderRule {
    patterns: Vec<Pattern>,
}

impl OrderRule {
    pub fn new<S: AsRef<str>>(globs: &[S]) -> Result<Self, SyncError> {
        Ok(Self {
            patterns: compile_all(globs)?,
        })
    }

    /// 解析逗号分隔的列表，忽略空项
    pub fn parse(list: &str) -> Result<Self, SyncError> {
        let globs: Vec<&str> = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        Self::new(&globs)
    }

    /// 第一个匹配的模式下标，未匹配则为模式数量（排在最后）
    pub fn sort_key(&self, path: &str) -> usize {
        self.patterns
            .iter()
            .position(|p| p.matches(path))
            .unwrap_or(self.patterns.len())
    }

    /// 稳定排序，相同优先级保持原有顺序
    pub fn sort(&self, files: &mut [LocalFile]) {
        if self.patterns.is_empty() {
            return;
        }
        files.sort_by_cached_key(|f| self.sort_key(&f.path));
    }

    pub fn patterns(&self) -> Vec<&str> {
        self.patterns.iter().map(Pattern::as_str).collect()
    }
}
