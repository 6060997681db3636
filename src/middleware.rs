// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 中间件模块
//!
//! - `Middleware`：挂载在路由前缀上的处理器，拿到一次性的续延 `Next`。
//! - `ErrorHandler`：唯一的终端处理器，处理分发错误与链条耗尽，负责结束响应。
//!
//! 中间件的三种结局：
//! 1. `next.resume()`：继续下一个中间件；
//! 2. `next.fail(error)`：跳过剩余中间件，转入错误处理；
//! 3. 自己结束响应后返回 `Flow::Done`。

use async_trait::async_trait;
use log::{debug, info};

use crate::{
    exception::Exception,
    exchange::Exchange,
    param::HTML_CONTENT_TYPE,
    util::{escape_html, HtmlBuilder},
};

/// 中间件执行完毕后交回给分发循环的结果
#[derive(Debug, PartialEq)]
pub enum Flow {
    /// 继续推进中间件链
    Continue,
    /// 以错误终止中间件链
    Fail(Exception),
    /// 响应已由中间件结束
    Done,
}

/// 一次性续延。按值消费，因此一次激活中最多只能使用一次。
#[derive(Debug)]
#[must_use = "a middleware must resume, fail, or finish the response"]
pub struct Next {
    _private: (),
}

impl Next {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }

    pub fn resume(self) -> Flow {
        Flow::Continue
    }

    pub fn fail(self, error: Exception) -> Flow {
        Flow::Fail(error)
    }

    /// `Ok` 继续，`Err` 失败
    pub fn after(self, result: Result<(), Exception>) -> Flow {
        match result {
            Ok(()) => Flow::Continue,
            Err(e) => Flow::Fail(e),
        }
    }
}

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, exchange: &mut Exchange, next: Next) -> Flow;
}

#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn handle(&self, exchange: &mut Exchange);
}

/// 记录每个经过的请求，然后继续
pub struct Logger;

#[async_trait]
impl Middleware for Logger {
    async fn handle(&self, exchange: &mut Exchange, next: Next) -> Flow {
        info!(
            "[ID{}]{} {}",
            exchange.id(),
            exchange.request().method(),
            exchange.request().uri()
        );
        next.resume()
    }
}

/// 问候页：取查询参数 `name`（缺省为 `World`），转义后写入上下文并渲染模板
pub struct Hello {
    template: String,
}

impl Hello {
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }
}

#[async_trait]
impl Middleware for Hello {
    async fn handle(&self, exchange: &mut Exchange, next: Next) -> Flow {
        let name = exchange
            .request()
            .query_param("name")
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "World".to_string());
        exchange.put("name", escape_html(&name));

        match exchange.render(&self.template).await {
            Ok(()) => Flow::Done,
            Err(e) => next.fail(e),
        }
    }
}

/// 渲染 HTML 状态页的错误处理器。
///
/// 有分发错误时使用错误对应的状态码，否则沿用当前状态码（链条耗尽时为 404）。
#[derive(Default)]
pub struct ErrorPage {
    /// 为真时在页面中展示错误信息
    show_message: bool,
}

impl ErrorPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, show_message: bool) -> Self {
        self.show_message = show_message;
        self
    }
}

#[async_trait]
impl ErrorHandler for ErrorPage {
    async fn handle(&self, exchange: &mut Exchange) {
        let code = match exchange.error() {
            Some(error) => error.status_code(),
            None => exchange.response().status_code(),
        };
        let message = match (self.show_message, exchange.error()) {
            (true, Some(error)) => Some(error.to_string()),
            _ => None,
        };
        debug!("[ID{}]错误页处理器输出状态码{}", exchange.id(), code);

        let html = HtmlBuilder::from_status_code(code, message.as_deref()).build();
        exchange
            .response_mut()
            .set_status(code)
            .set_content_type(HTML_CONTENT_TYPE)
            .end(html);
    }
}
