// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 模板源模块
//!
//! 模板引擎通过 `TemplateSource` 访问模板源码及其版本标记（修改时间），
//! 新鲜度检查与重新加载都建立在这两个操作之上。
//!
//! - `FileSystemSource`：以某个目录为根，使用 tokio 异步文件 I/O。
//! - `MemorySource`：内存中的模板表，每次写入得到一个严格递增的版本标记。

use std::{
    collections::HashMap,
    path::{Component, Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        RwLock,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use log::debug;

use crate::exception::Exception;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TemplateSource: Send + Sync {
    /// 模板当前的版本标记
    async fn modified(&self, identifier: &str) -> Result<SystemTime, Exception>;

    /// 读取模板源码
    async fn read(&self, identifier: &str) -> Result<String, Exception>;
}

fn source_error(identifier: &str, message: impl ToString) -> Exception {
    Exception::TemplateSource {
        identifier: identifier.to_string(),
        message: message.to_string(),
    }
}

/// 从磁盘目录读取模板
#[derive(Debug, Clone)]
pub struct FileSystemSource {
    root: PathBuf,
}

impl FileSystemSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 将标识符映射为根目录下的路径，拒绝越出根目录的标识符
    fn resolve(&self, identifier: &str) -> Result<PathBuf, Exception> {
        let relative = Path::new(identifier.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(source_error(identifier, "path escapes the template root"));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl TemplateSource for FileSystemSource {
    async fn modified(&self, identifier: &str) -> Result<SystemTime, Exception> {
        let path = self.resolve(identifier)?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| source_error(identifier, e))?;
        metadata.modified().map_err(|e| source_error(identifier, e))
    }

    async fn read(&self, identifier: &str) -> Result<String, Exception> {
        let path = self.resolve(identifier)?;
        debug!("读取模板文件: {}", path.display());
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| source_error(identifier, e))
    }
}

/// 内存模板表
#[derive(Debug, Default)]
pub struct MemorySource {
    templates: RwLock<HashMap<String, (String, SystemTime)>>,
    revision: AtomicU64,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入或替换模板，版本标记严格递增
    pub fn insert(&self, identifier: &str, content: &str) {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        let modified = UNIX_EPOCH + Duration::from_nanos(revision);
        let mut templates = match self.templates.write() {
            Ok(lock) => lock,
            Err(poisoned) => poisoned.into_inner(),
        };
        templates.insert(identifier.to_string(), (content.to_string(), modified));
    }

    pub fn remove(&self, identifier: &str) {
        let mut templates = match self.templates.write() {
            Ok(lock) => lock,
            Err(poisoned) => poisoned.into_inner(),
        };
        templates.remove(identifier);
    }

    fn lookup(&self, identifier: &str) -> Result<(String, SystemTime), Exception> {
        let templates = match self.templates.read() {
            Ok(lock) => lock,
            Err(poisoned) => poisoned.into_inner(),
        };
        templates
            .get(identifier)
            .cloned()
            .ok_or_else(|| source_error(identifier, "no such template"))
    }
}

#[async_trait]
impl TemplateSource for MemorySource {
    async fn modified(&self, identifier: &str) -> Result<SystemTime, Exception> {
        self.lookup(identifier).map(|(_, modified)| modified)
    }

    async fn read(&self, identifier: &str) -> Result<String, Exception> {
        self.lookup(identifier).map(|(content, _)| content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_memory_source_revisions_increase() {
        let source = MemorySource::new();
        source.insert("a", "one");
        let first = source.modified("a").await.unwrap();
        source.insert("a", "two");
        let second = source.modified("a").await.unwrap();

        assert!(second > first);
        assert_eq!(source.read("a").await.unwrap(), "two");
    }

    #[tokio::test]
    async fn test_memory_source_missing() {
        let source = MemorySource::new();
        match source.read("nope").await {
            Err(Exception::TemplateSource { identifier, .. }) => assert_eq!(identifier, "nope"),
            other => panic!("expected source error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_memory_source_remove() {
        let source = MemorySource::new();
        source.insert("a", "one");
        source.remove("a");
        assert!(source.modified("a").await.is_err());
    }

    #[tokio::test]
    async fn test_file_system_source_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("index.tpl")).unwrap();
        file.write_all(b"Hello").unwrap();

        let source = FileSystemSource::new(dir.path());

        assert_eq!(source.read("/index.tpl").await.unwrap(), "Hello");
        assert!(source.modified("index.tpl").await.is_ok());
    }

    #[tokio::test]
    async fn test_file_system_source_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSystemSource::new(dir.path());

        assert!(source.read("../etc/passwd").await.is_err());
        assert!(source.modified("a/../../b").await.is_err());
    }

    #[tokio::test]
    async fn test_file_system_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSystemSource::new(dir.path());

        assert!(matches!(
            source.modified("missing.tpl").await,
            Err(Exception::TemplateSource { .. })
        ));
    }
}
