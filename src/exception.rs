// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了请求分发与模板渲染生命周期中可能出现的各类异常情况。
//!
//! ## 分类
//! - **报文错误**：请求头无法解析，在进入中间件链之前直接以 400 响应。
//! - **分发错误**：中间件通过 `Next::fail` 发出的信号，交由错误处理器或默认 500 响应处理。
//! - **模板错误**：编译阶段的语法错误与执行阶段的求值错误。
//! - **模板源错误**：文件系统协作方在新鲜度检查或重新加载时产生的错误。

use std::{error::Error, fmt, io};

/// 服务器处理请求过程中发生的异常类型。
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// 客户端发送的请求字节流无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 客户端使用了服务器暂不支持的 HTTP 方法。
    UnSupportedRequestMethod,
    /// 客户端使用了服务器不支持的 HTTP 协议版本。
    UnsupportedHttpVersion,
    /// 请求行缺失或格式错误。
    MalformedRequest,
    /// 中间件希望以指定的 HTTP 状态码结束请求。
    Status(u16),
    /// 中间件自定义的错误信息。
    Custom(String),
    /// 模板源码中存在语法错误，`line` 与 `column` 从 1 开始计数。
    TemplateSyntax {
        line: usize,
        column: usize,
        message: String,
    },
    /// 模板执行阶段的求值错误。
    TemplateRender(String),
    /// 模板源无法读取或无法获取修改时间。
    TemplateSource { identifier: String, message: String },
    /// 没有为该扩展名注册模板引擎。
    NoEngine(String),
    /// 配置文件缺失或无法解析。
    Config(String),
    /// 套接字或其它 I/O 错误。
    Io(String),
}

use Exception::*;

impl Exception {
    /// 该异常对应的 HTTP 状态码。
    pub fn status_code(&self) -> u16 {
        match self {
            RequestIsNotUtf8 | UnSupportedRequestMethod | UnsupportedHttpVersion
            | MalformedRequest => 400,
            Status(code) => *code,
            NoEngine(_) => 501,
            _ => 500,
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            UnSupportedRequestMethod => write!(f, "Unsupported request method"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            MalformedRequest => write!(f, "Malformed request line"),
            Status(code) => write!(f, "Request failed with status {}", code),
            Custom(message) => write!(f, "{}", message),
            TemplateSyntax {
                line,
                column,
                message,
            } => write!(f, "Template syntax error at {}:{}: {}", line, column, message),
            TemplateRender(message) => write!(f, "Template render error: {}", message),
            TemplateSource {
                identifier,
                message,
            } => write!(f, "Couldn't load template {}: {}", identifier, message),
            NoEngine(extension) => write!(f, "No template engine registered for '{}'", extension),
            Config(message) => write!(f, "Invalid configuration: {}", message),
            Io(message) => write!(f, "I/O error: {}", message),
        }
    }
}

impl Error for Exception {}

impl From<io::Error> for Exception {
    fn from(e: io::Error) -> Self {
        Io(e.to_string())
    }
}
