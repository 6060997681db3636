// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::SystemTime;

use log::warn;
use lru::LruCache;

use crate::template::Template;

/// 单个模板的缓存条目：原始源码、版本标记（修改时间）与可选的编译结果。
#[derive(Clone)]
struct CacheEntry {
    source: Arc<str>,
    modified_time: SystemTime,
    compiled: Option<Arc<Template>>,
}

/// 按模板标识符索引的两级缓存，容量受限，按 LRU 淘汰。
pub struct TemplateCache {
    cache: LruCache<String, CacheEntry>,
}

impl TemplateCache {
    // 根据容量构造
    pub fn from_capacity(capacity: usize) -> Self {
        let capacity = match NonZeroUsize::new(capacity) {
            Some(c) => c,
            None => {
                warn!("模板缓存容量被设置为0，目前不支持禁用缓存，改为1");
                NonZeroUsize::MIN
            }
        };
        Self {
            cache: LruCache::new(capacity),
        }
    }

    // 放入新的源码，旧的编译结果随之失效
    pub fn push(&mut self, identifier: &str, source: Arc<str>, modified_time: SystemTime) {
        let entry = CacheEntry {
            source,
            modified_time,
            compiled: None,
        };
        self.cache.put(identifier.to_string(), entry);
    }

    // 缓存的源码是否与给定的版本标记一致
    pub fn is_fresh(&self, identifier: &str, current_modified_time: SystemTime) -> bool {
        match self.cache.peek(identifier) {
            Some(entry) => entry.modified_time == current_modified_time,
            None => false,
        }
    }

    pub fn modified_time(&self, identifier: &str) -> Option<SystemTime> {
        self.cache.peek(identifier).map(|entry| entry.modified_time)
    }

    pub fn source(&mut self, identifier: &str) -> Option<Arc<str>> {
        self.cache.get(identifier).map(|entry| entry.source.clone())
    }

    // 查询源码、版本与编译结果
    pub fn find(
        &mut self,
        identifier: &str,
    ) -> Option<(Arc<str>, SystemTime, Option<Arc<Template>>)> {
        self.cache.get(identifier).map(|entry| {
            (
                entry.source.clone(),
                entry.modified_time,
                entry.compiled.clone(),
            )
        })
    }

    // 只有当条目仍是编译时所用的那个版本，才挂上编译结果
    pub fn store_compiled(
        &mut self,
        identifier: &str,
        modified_time: SystemTime,
        template: Arc<Template>,
    ) -> bool {
        match self.cache.get_mut(identifier) {
            Some(entry) if entry.modified_time == modified_time => {
                entry.compiled = Some(template);
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, identifier: &str) {
        self.cache.pop(identifier);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}
