// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 模板引擎模块
//!
//! 渲染流程：新鲜度检查 → （必要时）重新加载源码 → 编译（缓存中没有时）→ 执行。
//!
//! 编译结果只挂在与其源码版本一致的缓存条目上，因此并发渲染同一个过期模板时
//! 即使重复加载、重复编译，每条路径执行的仍是与某个有效源码一致的编译结果。

use std::{
    collections::HashMap,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::SystemTime,
};

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::{Map, Value};

use crate::{cache::TemplateCache, exception::Exception, source::TemplateSource, template::Template};

/// 模板引擎能力：按标识符渲染出文本
#[async_trait]
pub trait Engine: Send + Sync {
    async fn render(
        &self,
        identifier: &str,
        context: Option<&Map<String, Value>>,
    ) -> Result<String, Exception>;
}

/// 扩展名到模板引擎的映射，配置阶段填充，渲染阶段只读
#[derive(Default)]
pub struct EngineRegistry {
    engines: HashMap<String, Arc<dyn Engine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册引擎，扩展名可带或不带前导 `.`，后注册的覆盖先注册的
    pub fn register(&mut self, extension: &str, engine: Arc<dyn Engine>) {
        self.engines
            .insert(extension.trim_start_matches('.').to_string(), engine);
    }

    pub fn get(&self, extension: &str) -> Option<Arc<dyn Engine>> {
        self.engines
            .get(extension.trim_start_matches('.'))
            .cloned()
    }

    /// 按模板路径的扩展名选择引擎
    pub fn for_path(&self, path: &str) -> Result<Arc<dyn Engine>, Exception> {
        let extension = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        self.get(extension)
            .ok_or_else(|| Exception::NoEngine(extension.to_string()))
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

/// `<% %>` 模板语言的引擎实现
pub struct TemplateEngine<S: TemplateSource> {
    source: S,
    cache: Mutex<TemplateCache>,
    compilations: AtomicUsize,
}

impl<S: TemplateSource> TemplateEngine<S> {
    pub fn new(source: S, cache_size: usize) -> Self {
        Self {
            source,
            cache: Mutex::new(TemplateCache::from_capacity(cache_size)),
            compilations: AtomicUsize::new(0),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// 累计编译次数
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::SeqCst)
    }

    fn cache(&self) -> MutexGuard<'_, TemplateCache> {
        match self.cache.lock() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("模板缓存锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }

    /// 缓存中的源码是否仍与模板源一致；无法获取版本标记时视为不新鲜
    pub async fn is_fresh(&self, identifier: &str) -> bool {
        match self.source.modified(identifier).await {
            Ok(current) => self.cache().is_fresh(identifier, current),
            Err(e) => {
                debug!("模板{}新鲜度检查失败: {}", identifier, e);
                false
            }
        }
    }

    /// 重新读取源码放入缓存，同时丢弃该模板旧的编译结果
    pub async fn reload(&self, identifier: &str) -> Result<(Arc<str>, SystemTime), Exception> {
        let modified_time = self.source.modified(identifier).await?;
        let content: Arc<str> = Arc::from(self.source.read(identifier).await?);
        debug!("模板{}已重新加载，{} bytes", identifier, content.len());
        self.cache()
            .push(identifier, content.clone(), modified_time);
        Ok((content, modified_time))
    }

    /// 缓存中的原始源码
    pub fn cached_source(&self, identifier: &str) -> Option<Arc<str>> {
        self.cache().source(identifier)
    }

    /// 取得与缓存源码一致的编译结果，缺失时编译并写回缓存
    pub async fn compile(&self, identifier: &str) -> Result<Arc<Template>, Exception> {
        let cached = self.cache().find(identifier);
        let (source, modified_time, compiled) = match cached {
            Some(entry) => entry,
            None => {
                let (source, modified_time) = self.reload(identifier).await?;
                (source, modified_time, None)
            }
        };

        if let Some(template) = compiled {
            return Ok(template);
        }

        let template = Arc::new(Template::compile(&source)?);
        let count = self.compilations.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("模板{}编译完成（累计编译{}次）", identifier, count);
        if !self
            .cache()
            .store_compiled(identifier, modified_time, template.clone())
        {
            debug!("模板{}在编译期间已被替换，编译结果不写入缓存", identifier);
        }
        Ok(template)
    }
}

#[async_trait]
impl<S: TemplateSource> Engine for TemplateEngine<S> {
    async fn render(
        &self,
        identifier: &str,
        context: Option<&Map<String, Value>>,
    ) -> Result<String, Exception> {
        if !self.is_fresh(identifier).await {
            self.reload(identifier).await?;
        }
        let template = self.compile(identifier).await?;
        template.render(context)
    }
}
