//! Cache-Control 规则：`glob=value`，第一条匹配的规则生效

use super::glob::Pattern;
use crate::error::SyncError;

#[derive(Debug, Clone)]
pub struct CacheControlRule {
    pattern: Pattern,
    value: String,
}

impl CacheControlRule {
    pub fn new(glob: &str, value: &str) -> Result<Self, SyncError> {
        Ok(Self {
            pattern: Pattern::new(glob)?,
            value: value.to_string(),
        })
    }

    /// 在第一个 `=` 处拆分，两侧去空白
    pub fn parse(line: &str) -> Result<Self, SyncError> {
        let (glob, value) = line.split_once('=').ok_or_else(|| {
            SyncError::Config(format!("cache-control 规则缺少 '=': {}", line))
        })?;
        let glob = glob.trim();
        if glob.is_empty() {
            return Err(SyncError::Config(format!(
                "cache-control 规则缺少 glob: {}",
                line
            )));
        }
        Self::new(glob, value.trim())
    }

    pub fn glob(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// 有序规则列表
#[derive(Debug, Clone, Default)]
pub struct CacheControlRules {
    rules: Vec<CacheControlRule>,
}

impl CacheControlRules {
    pub fn new(rules: Vec<CacheControlRule>) -> Self {
        Self { rules }
    }

    /// 解析多行配置，空行忽略
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> Result<Self, SyncError> {
        let rules = lines
            .iter()
            .map(|l| l.as_ref())
            .filter(|l| !l.trim().is_empty())
            .map(CacheControlRule::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// 无匹配返回 None（不设置该头）
    pub fn resolve(&self, path: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|r| r.pattern.matches(path))
            .map(CacheControlRule::value)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
