// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 上下文模块
//!
//! - `ContextStore`：进程级共享的默认属性表，所有请求均可读取。
//! - `Context`：单个请求的上下文视图，叠加在共享默认值之上，写入只落在请求层。
//!
//! 两者都不会保存 `null`：写入 `null` 等价于删除该键。

use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use log::warn;
use serde_json::{Map, Value};

use crate::param::TITLE_KEY;

/// 共享的默认上下文，克隆得到的是同一张表的句柄。
#[derive(Clone, Debug)]
pub struct ContextStore {
    values: Arc<RwLock<HashMap<String, Value>>>,
}

impl Default for ContextStore {
    fn default() -> Self {
        let store = Self::empty();
        store.set(TITLE_KEY, Value::from("Yoke"));
        store
    }
}

impl ContextStore {
    /// 不含任何默认值的空表
    pub fn empty() -> Self {
        Self {
            values: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Value>> {
        match self.values.read() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("默认上下文读锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Value>> {
        match self.values.write() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("默认上下文写锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }

    /// 设置一个默认值；`Value::Null` 表示删除。
    pub fn set(&self, key: &str, value: Value) {
        let mut values = self.write();
        if value.is_null() {
            values.remove(key);
        } else {
            values.insert(key.to_string(), value);
        }
    }

    pub fn unset(&self, key: &str) {
        self.write().remove(key);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// 在一次读锁内复制全部默认值
    pub fn snapshot(&self) -> Map<String, Value> {
        self.read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// 单个请求的上下文视图。
///
/// 读取时先查请求层，再查共享默认值；写入只修改请求层。
#[derive(Debug)]
pub struct Context {
    defaults: ContextStore,
    local: HashMap<String, Value>,
}

impl Context {
    pub fn new(defaults: ContextStore) -> Self {
        Self {
            defaults,
            local: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        match self.local.get(key) {
            Some(value) => Some(value.clone()),
            None => self.defaults.get(key),
        }
    }

    /// 写入请求层；`Value::Null` 删除请求层中的同名键，使默认值重新可见。
    pub fn put(&mut self, key: &str, value: Value) {
        if value.is_null() {
            self.local.remove(key);
        } else {
            self.local.insert(key.to_string(), value);
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.local.remove(key)
    }

    /// 合并默认值与请求层，请求层优先。作为模板渲染的上下文使用。
    pub fn to_map(&self) -> Map<String, Value> {
        let mut merged = self.defaults.snapshot();
        for (key, value) in &self.local {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}
