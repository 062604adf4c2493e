//! glob 匹配与 include/exclude 过滤
//!
//! 匹配规则：区分大小写，`*` 和 `?` 不跨越 `/`，`**` 跨目录，支持 `{a,b}`。
//! 不含 `/` 的模式只匹配文件名（任意层级），点文件与普通文件同等对待。

use crate::error::SyncError;
use globset::{GlobBuilder, GlobMatcher};
use tracing::debug;

/// 编译后的单个 glob 模式
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    matcher: GlobMatcher,
    /// 模式不含 `/` 时只比较文件名
    base_only: bool,
}

impl Pattern {
    pub fn new(glob: &str) -> Result<Self, SyncError> {
        let matcher = GlobBuilder::new(glob)
            .literal_separator(true)
            .backslash_escape(true)
            .build()
            .map_err(|source| SyncError::Pattern {
                pattern: glob.to_string(),
                source,
            })?
            .compile_matcher();

        Ok(Self {
            source: glob.to_string(),
            matcher,
            base_only: !glob.contains('/'),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, path: &str) -> bool {
        if self.matcher.is_match(path) {
            return true;
        }
        if self.base_only {
            if let Some((_, name)) = path.rsplit_once('/') {
                return self.matcher.is_match(name);
            }
        }
        false
    }
}

/// 一次性匹配（会编译模式）
pub fn matches(path: &str, glob: &str) -> Result<bool, SyncError> {
    Ok(Pattern::new(glob)?.matches(path))
}

/// 编译一组模式
pub fn compile_all<S: AsRef<str>>(globs: &[S]) -> Result<Vec<Pattern>, SyncError> {
    globs.iter().map(|g| Pattern::new(g.as_ref())).collect()
}

/// include/exclude 过滤器，本地路径和远程 key 使用同一个实例
#[derive(Debug, Clone)]
pub struct GlobFilter {
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
}

impl GlobFilter {
    pub fn new<S: AsRef<str>>(includes: &[S], excludes: &[S]) -> Result<Self, SyncError> {
        Ok(Self {
            includes: compile_all(includes)?,
            excludes: compile_all(excludes)?,
        })
    }

    /// exclude 优先：命中任一 exclude 即拒绝，否则命中任一 include 才保留
    pub fn is_match(&self, path: &str) -> bool {
        if let Some(exclude) = self.excludes.iter().find(|p| p.matches(path)) {
            debug!("文件 {} 被排除规则 {} 排除", path, exclude.as_str());
            return false;
        }

        if let Some(include) = self.includes.iter().find(|p| p.matches(path)) {
            debug!("文件 {} 被包含规则 {} 包含", path, include.as_str());
            return true;
        }

        debug!("文件 {} 被排除（无匹配规则）", path);
        false
    }

    /// 保留匹配的路径，顺序不变
    pub fn filter<I, S>(&self, paths: I) -> Vec<S>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        paths
            .into_iter()
            .filter(|p| self.is_match(p.as_ref()))
            .collect()
    }

    pub fn includes(&self) -> Vec<&str> {
        self.includes.iter().map(Pattern::as_str).collect()
    }

    pub fn excludes(&self) -> Vec<&str> {
        self.excludes.iter().map(Pattern::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(path: &str, glob: &str) -> bool {
        matches(path, glob).unwrap()
    }

    #[test]
    fn test_base_name_matching() {
        assert!(m("a.css", "*.css"));
        assert!(m("assets/css/site.css", "*.css"));
        assert!(!m("assets/css/site.css", "assets/*.css"));
        assert!(m("assets/site.css", "assets/*.css"));
    }

    #[test]
    fn test_double_star_and_alternation() {
        assert!(m("static/img/logo.png", "static/**"));
        assert!(m("a/b/c/index.html", "**/*.html"));
        assert!(m("app.js", "*.{js,css}"));
        assert!(m("x/app.css", "*.{js,css}"));
        assert!(!m("app.png", "*.{js,css}"));
        assert!(m("a1.txt", "a?.txt"));
        assert!(!m("a/1.txt", "a?1.txt"));
    }

    #[test]
    fn test_dotfiles_and_case() {
        assert!(m(".well-known/security.txt", "**"));
        assert!(m(".htaccess", "*"));
        assert!(m("dir/.env", "*"));
        assert!(!m("README.MD", "*.md"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = Pattern::new("[").unwrap_err();
        assert!(matches!(err, SyncError::Pattern { ref pattern, .. } if pattern == "["));
    }

    #[test]
    fn test_filter_exclude_dominates() {
        let filter = GlobFilter::new(&["*"], &["*.map"]).unwrap();
        assert!(filter.is_match("app.js"));
        assert!(!filter.is_match("app.js.map"));
        assert!(!filter.is_match("js/app.js.map"));
    }

    #[test]
    fn test_filter_requires_include() {
        let filter = GlobFilter::new(&["*.html"], &[] as &[&str]).unwrap();
        let kept = filter.filter(vec!["index.html", "app.js", "docs/a.html"]);
        assert_eq!(kept, vec!["index.html", "docs/a.html"]);
    }
}
