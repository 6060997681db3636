// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 分发模块
//!
//! 每个请求对应一个 `Dispatch`，按注册顺序遍历中间件链：
//!
//! ```text
//! Idle → Advancing → { Delegating, ErrorHandling, Exhausted } → Responded
//! ```
//!
//! 游标在循环中迭代推进，前缀不匹配的条目直接跳过，不产生递归。
//! 每个请求恰好进入一个终止分支：错误处理、404，或由某个中间件自行结束响应。

use std::{fmt, sync::Arc};

use log::debug;

use crate::{
    exception::Exception,
    exchange::Exchange,
    middleware::{ErrorHandler, Flow, Middleware, Next},
    param::TEXT_CONTENT_TYPE,
};

/// 挂载在某个路由前缀上的中间件
pub struct Mounted {
    route: String,
    middleware: Arc<dyn Middleware>,
}

impl Mounted {
    pub fn route(&self) -> &str {
        &self.route
    }

    /// 字面前缀匹配，路径不含查询参数
    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.route)
    }
}

/// 有序的中间件链与唯一的错误处理器。开始监听后只读共享。
#[derive(Default)]
pub struct Chain {
    middleware: Vec<Mounted>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(&mut self, route: &str, middleware: Arc<dyn Middleware>) {
        self.middleware.push(Mounted {
            route: route.to_string(),
            middleware,
        });
    }

    /// 设置错误处理器，替换之前注册的那个
    pub fn set_error_handler(&mut self, handler: Arc<dyn ErrorHandler>) {
        if self.error_handler.is_some() {
            debug!("错误处理器已被替换");
        }
        self.error_handler = Some(handler);
    }

    pub fn get(&self, index: usize) -> Option<&Mounted> {
        self.middleware.get(index)
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    pub fn has_error_handler(&self) -> bool {
        self.error_handler.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Advancing,
    Delegating,
    ErrorHandling,
    Exhausted,
    Responded,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Idle => "Idle",
            State::Advancing => "Advancing",
            State::Delegating => "Delegating",
            State::ErrorHandling => "ErrorHandling",
            State::Exhausted => "Exhausted",
            State::Responded => "Responded",
        };
        write!(f, "{}", name)
    }
}

/// 一次转移的结果
pub enum Step {
    /// 调用该中间件
    Invoke(Arc<dyn Middleware>),
    /// 进入错误分支
    Error(Exception),
    /// 中间件链已走完
    Exhausted,
}

/// 单个请求的分发状态机
pub struct Dispatch {
    chain: Arc<Chain>,
    cursor: Option<usize>,
    state: State,
}

impl Dispatch {
    pub fn new(chain: Arc<Chain>) -> Self {
        Self {
            chain,
            cursor: None,
            state: State::Idle,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// 最近一次被选中（或被跳过）的条目下标，尚未推进时为 `None`
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// 转移函数。`signal` 为 `None` 表示上一个中间件正常继续。
    pub fn transition(&mut self, path: &str, signal: Option<Exception>) -> Step {
        if let Some(error) = signal {
            self.state = State::ErrorHandling;
            return Step::Error(error);
        }

        self.state = State::Advancing;
        loop {
            let index = self.cursor.map_or(0, |i| i + 1);
            self.cursor = Some(index);
            match self.chain.get(index) {
                Some(mounted) if mounted.matches(path) => {
                    self.state = State::Delegating;
                    return Step::Invoke(mounted.middleware.clone());
                }
                Some(_) => continue,
                None => {
                    self.state = State::Exhausted;
                    return Step::Exhausted;
                }
            }
        }
    }

    /// 驱动整个中间件链直到进入终止分支
    pub async fn run(&mut self, exchange: &mut Exchange) {
        let path = exchange.path().to_string();
        let mut signal = None;

        loop {
            match self.transition(&path, signal.take()) {
                Step::Invoke(middleware) => {
                    debug!(
                        "[ID{}]调用第{}个中间件（{}）",
                        exchange.id(),
                        self.cursor.unwrap_or_default(),
                        self.route()
                    );
                    match middleware.handle(exchange, Next::new()).await {
                        Flow::Continue => {}
                        Flow::Fail(error) => signal = Some(error),
                        Flow::Done => {
                            debug!("[ID{}]响应已由中间件结束", exchange.id());
                            break;
                        }
                    }
                }
                Step::Error(error) => {
                    debug!("[ID{}]进入错误分支: {}", exchange.id(), error);
                    self.handle_error(exchange, error).await;
                    break;
                }
                Step::Exhausted => {
                    debug!("[ID{}]中间件链已耗尽，返回404", exchange.id());
                    self.handle_exhausted(exchange).await;
                    break;
                }
            }
        }

        self.state = State::Responded;
    }

    fn route(&self) -> &str {
        self.cursor
            .and_then(|i| self.chain.get(i))
            .map_or("", |m| m.route())
    }

    async fn handle_error(&self, exchange: &mut Exchange, error: Exception) {
        exchange.set_error(error);
        match &self.chain.error_handler {
            Some(handler) => handler.handle(exchange).await,
            None => {
                let response = exchange.response_mut();
                response
                    .set_status(500)
                    .set_content_type(TEXT_CONTENT_TYPE);
                let reason = response.information().to_string();
                response.end(reason);
            }
        }
    }

    async fn handle_exhausted(&self, exchange: &mut Exchange) {
        exchange
            .response_mut()
            .set_status(404)
            .set_content_type(TEXT_CONTENT_TYPE);
        match &self.chain.error_handler {
            Some(handler) => handler.handle(exchange).await,
            None => {
                let response = exchange.response_mut();
                let reason = response.information().to_string();
                response.end(reason);
            }
        }
    }
}
