// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求交换模块
//!
//! `Exchange` 绑定一次请求处理所需的全部状态：解析后的请求、待写出的响应、
//! 叠加在共享默认值之上的请求级上下文，以及已注册的模板引擎。
//! 中间件通过它读取请求、写入上下文、渲染模板并结束响应。

use std::sync::Arc;

use log::debug;
use serde_json::Value;

use crate::{
    context::{Context, ContextStore},
    engine::EngineRegistry,
    exception::Exception,
    param::{ERROR_KEY, HTML_CONTENT_TYPE},
    request::Request,
    response::Response,
};

pub struct Exchange {
    id: u128,
    request: Request,
    response: Response,
    context: Context,
    engines: Arc<EngineRegistry>,
    error: Option<Exception>,
}

impl Exchange {
    pub fn new(
        id: u128,
        request: Request,
        defaults: ContextStore,
        engines: Arc<EngineRegistry>,
    ) -> Self {
        Self {
            id,
            request,
            response: Response::new(),
            context: Context::new(defaults),
            engines,
            error: None,
        }
    }

    pub fn id(&self) -> u128 {
        self.id
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// 请求路径（不含查询参数）
    pub fn path(&self) -> &str {
        self.request.path()
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// 读取上下文：先请求层，后共享默认值
    pub fn get(&self, key: &str) -> Option<Value> {
        self.context.get(key)
    }

    /// 写入请求层；`Value::Null` 表示删除
    pub fn put(&mut self, key: &str, value: impl Into<Value>) {
        self.context.put(key, value.into());
    }

    /// 分发过程中记录的错误
    pub fn error(&self) -> Option<&Exception> {
        self.error.as_ref()
    }

    pub(crate) fn set_error(&mut self, error: Exception) {
        self.context.put(ERROR_KEY, Value::String(error.to_string()));
        self.error = Some(error);
    }

    /// 按扩展名选择模板引擎，以请求上下文渲染模板并结束响应。
    ///
    /// 失败时响应保持原样，错误交还给调用方，通常再交给 `Next::fail`。
    pub async fn render(&mut self, template: &str) -> Result<(), Exception> {
        let engine = self.engines.for_path(template)?;
        let context = self.context.to_map();
        let html = engine.render(template, Some(&context)).await?;
        debug!("[ID{}]模板{}渲染完成，{} bytes", self.id, template, html.len());
        self.response
            .set_status(200)
            .set_content_type(HTML_CONTENT_TYPE)
            .end(html);
        Ok(())
    }

    pub fn into_response(self) -> Response {
        self.response
    }
}
