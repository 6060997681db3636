// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 应用模块
//!
//! `Yoke` 是配置阶段的构建器：挂载中间件、设置错误处理器、注册模板引擎、
//! 写入共享默认属性。`build` 或 `listen` 消费构建器，之后中间件链只读共享，
//! 因此监听开始后无法再修改注册内容。

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use log::{debug, info};
use serde_json::Value;
use tokio::net::TcpListener;

use crate::{
    config::Config,
    context::ContextStore,
    dispatch::{Chain, Dispatch},
    engine::{Engine, EngineRegistry},
    exception::Exception,
    exchange::Exchange,
    middleware::{ErrorHandler, Middleware},
    request::Request,
    response::Response,
    server::{Listening, Server},
};

/// 应用构建器
pub struct Yoke {
    chain: Chain,
    engines: EngineRegistry,
    defaults: ContextStore,
    max_request_size: usize,
}

impl Default for Yoke {
    fn default() -> Self {
        Self::new()
    }
}

impl Yoke {
    pub fn new() -> Self {
        Self {
            chain: Chain::new(),
            engines: EngineRegistry::new(),
            defaults: ContextStore::default(),
            max_request_size: Config::new().max_request_size(),
        }
    }

    /// 以配置文件中的默认属性与请求大小上限初始化
    pub fn with_config(config: &Config) -> Self {
        let mut app = Self::new();
        app.max_request_size = config.max_request_size();
        for (key, value) in config.defaults() {
            app.defaults.set(key, value.clone());
        }
        app
    }

    /// 挂载到 `/`，即匹配所有请求
    pub fn use_middleware(&mut self, middleware: impl Middleware + 'static) -> &mut Self {
        self.use_at("/", middleware)
    }

    pub fn use_at(&mut self, route: &str, middleware: impl Middleware + 'static) -> &mut Self {
        debug!("挂载中间件于{}", route);
        self.chain.mount(route, Arc::new(middleware));
        self
    }

    /// 设置错误处理器，后设置的替换先设置的
    pub fn use_error_handler(&mut self, handler: impl ErrorHandler + 'static) -> &mut Self {
        self.chain.set_error_handler(Arc::new(handler));
        self
    }

    /// 为扩展名注册模板引擎
    pub fn engine(&mut self, extension: &str, engine: impl Engine + 'static) -> &mut Self {
        debug!("注册模板引擎：{}", extension);
        self.engines.register(extension, Arc::new(engine));
        self
    }

    /// 写入共享默认属性；`Value::Null` 表示删除
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.defaults.set(key, value.into());
        self
    }

    pub fn defaults(&self) -> &ContextStore {
        &self.defaults
    }

    pub fn build(self) -> App {
        info!(
            "应用构建完成：{}个中间件，{}个模板引擎",
            self.chain.len(),
            self.engines.len()
        );
        App {
            chain: Arc::new(self.chain),
            engines: Arc::new(self.engines),
            defaults: self.defaults,
            max_request_size: self.max_request_size,
            next_id: AtomicU64::new(0),
        }
    }

    /// 构建应用并在给定端口上开始监听，返回可用于停机的句柄
    pub async fn listen(self, port: u16, address: Option<&str>) -> Result<Listening, Exception> {
        self.build().listen(port, address).await
    }
}

/// 构建完成的应用，中间件链与引擎表只读共享
pub struct App {
    chain: Arc<Chain>,
    engines: Arc<EngineRegistry>,
    defaults: ContextStore,
    max_request_size: usize,
    next_id: AtomicU64,
}

impl App {
    /// 分配下一个请求 ID
    pub fn next_id(&self) -> u128 {
        self.next_id.fetch_add(1, Ordering::SeqCst) as u128
    }

    pub fn defaults(&self) -> &ContextStore {
        &self.defaults
    }

    pub fn max_request_size(&self) -> usize {
        self.max_request_size
    }

    pub async fn handle(&self, request: Request) -> Response {
        let id = self.next_id();
        self.handle_with_id(id, request).await
    }

    /// 为一个请求创建分发状态机并运行到终止分支
    pub async fn handle_with_id(&self, id: u128, request: Request) -> Response {
        let mut exchange = Exchange::new(
            id,
            request,
            self.defaults.clone(),
            Arc::clone(&self.engines),
        );
        let mut dispatch = Dispatch::new(Arc::clone(&self.chain));
        dispatch.run(&mut exchange).await;
        exchange.into_response()
    }

    /// 绑定地址（缺省为 `0.0.0.0`）并在后台运行主事件循环
    pub async fn listen(self, port: u16, address: Option<&str>) -> Result<Listening, Exception> {
        let address = address.unwrap_or("0.0.0.0");
        let listener = TcpListener::bind((address, port)).await?;
        let listening = Server::new(self).spawn(listener)?;
        info!("服务端将在{}上监听Socket连接", listening.local_addr());
        Ok(listening)
    }
}
