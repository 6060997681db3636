// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 负责将 TCP 流中读取的原始字节解析为强类型的 `Request` 结构体：
//! 1. 请求行（Request-Line）的解析（方法、目标、版本）。
//! 2. 标头（Headers）的提取，字段名大小写不敏感。
//!
//! 请求体不在解析范围内，中间件链只依赖请求头进行分发。

use crate::{exception::Exception, param::*};
use log::error;

/// 表示一个 HTTP 请求的元数据。
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP 请求方法
    method: HttpRequestMethod,
    /// 请求目标（包含查询字符串）
    uri: String,
    /// HTTP 协议版本
    version: HttpVersion,
    /// 按出现顺序保存的标头
    headers: Vec<(String, String)>,
}

impl Request {
    /// 直接构造请求，用于进程内分发与测试。
    pub fn new(method: HttpRequestMethod, uri: &str) -> Self {
        Self {
            method,
            uri: uri.to_string(),
            version: HttpVersion::V1_1,
            headers: Vec::new(),
        }
    }

    /// 追加一个标头，返回自身以便链式调用。
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// 从原始字节缓冲区尝试构建 `Request` 实例。
    ///
    /// # 参数
    /// * `buffer` - 从网络 Socket 读取的请求头部分。
    /// * `id` - 请求 ID，用于在多任务环境下追踪日志。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let request_string = match std::str::from_utf8(buffer) {
            Ok(string) => string,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };

        let mut request_lines = request_string.split(CRLF);

        // 请求行，例如 "GET /index.html HTTP/1.1"
        let first_line = request_lines.next().unwrap_or_default();
        let first_line_parts: Vec<&str> = first_line.split(' ').collect();
        if first_line_parts.len() < 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, first_line);
            return Err(Exception::MalformedRequest);
        }

        let method_str = first_line_parts[0].to_uppercase();
        let method = match method_str.as_str() {
            "GET" => HttpRequestMethod::Get,
            "HEAD" => HttpRequestMethod::Head,
            "OPTIONS" => HttpRequestMethod::Options,
            "POST" => HttpRequestMethod::Post,
            "PUT" => HttpRequestMethod::Put,
            "DELETE" => HttpRequestMethod::Delete,
            "PATCH" => HttpRequestMethod::Patch,
            _ => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, &method_str);
                return Err(Exception::UnSupportedRequestMethod);
            }
        };

        let version_str = first_line_parts[first_line_parts.len() - 1].to_uppercase();
        let version = match version_str.as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            "HTTP/1.0" => HttpVersion::V1_0,
            _ => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, &version_str);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        // 路径中可能含有未编码的空格，通过 join 尝试恢复
        let uri = first_line_parts[1..first_line_parts.len() - 1].join(" ");

        let mut headers = Vec::new();
        for line in request_lines {
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
        }

        Ok(Self {
            method,
            uri,
            version,
            headers,
        })
    }
}

impl Request {
    /// 获取 HTTP 协议版本
    pub fn version(&self) -> HttpVersion {
        self.version
    }

    /// 获取完整的请求目标（含查询参数）
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// 获取请求路径，不含查询参数。路由前缀匹配基于该值进行。
    pub fn path(&self) -> &str {
        match self.uri.split_once('?') {
            Some((path, _)) => path,
            None => &self.uri,
        }
    }

    /// 获取查询字符串
    pub fn query(&self) -> Option<&str> {
        self.uri.split_once('?').map(|(_, query)| query)
    }

    /// 按名称取第一个查询参数并做百分号解码，`+` 视为空格。
    ///
    /// 无法解码为 UTF-8 的值按缺失处理。
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query()?
            .split('&')
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
            .find(|(key, _)| *key == name)
            .and_then(|(_, value)| {
                urlencoding::decode(&value.replace('+', " "))
                    .ok()
                    .map(|decoded| decoded.into_owned())
            })
    }

    /// 获取请求方法
    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    /// 按名称（大小写不敏感）查询第一个匹配的标头
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// 获取用户代理字符串
    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_is_percent_decoded() {
        let request = Request::new(
            HttpRequestMethod::Get,
            "/hello?flag&name=John%20Doe&city=New+York&bad=%FF",
        );

        assert_eq!(request.query_param("name").as_deref(), Some("John Doe"));
        assert_eq!(request.query_param("city").as_deref(), Some("New York"));
        assert_eq!(request.query_param("flag").as_deref(), Some(""));
        assert_eq!(request.query_param("bad"), None);
        assert_eq!(request.query_param("missing"), None);
        assert_eq!(Request::new(HttpRequestMethod::Get, "/").query_param("name"), None);
    }

    #[test]
    fn test_parse_get_request() {
        let request_str =
            "GET /api/users?id=1 HTTP/1.1\r\nHost: localhost:7878\r\nUser-Agent: Test-Browser\r\n\r\n";

        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.method(), HttpRequestMethod::Get);
        assert_eq!(request.uri(), "/api/users?id=1");
        assert_eq!(request.path(), "/api/users");
        assert_eq!(request.query(), Some("id=1"));
        assert_eq!(request.user_agent(), "Test-Browser");
        assert_eq!(request.header("host"), Some("localhost:7878"));
    }

    #[test]
    fn test_parse_delete_request() {
        let request_str = "DELETE /resource HTTP/1.1\r\nHost: localhost:7878\r\n\r\n";

        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.method(), HttpRequestMethod::Delete);
        assert_eq!(request.path(), "/resource");
    }

    #[test]
    fn test_unsupported_method() {
        let request_str = "BREW /pot HTTP/1.1\r\nHost: localhost:7878\r\n\r\n";

        match Request::try_from(request_str.as_bytes(), 0) {
            Err(Exception::UnSupportedRequestMethod) => {}
            other => panic!("Expected UnSupportedRequestMethod error, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_http_version() {
        let request_str = "GET / HTTP/2.0\r\nHost: localhost:7878\r\n\r\n";

        match Request::try_from(request_str.as_bytes(), 0) {
            Err(Exception::UnsupportedHttpVersion) => {}
            other => panic!("Expected UnsupportedHttpVersion error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_request_line() {
        match Request::try_from(b"GET\r\n\r\n", 0) {
            Err(Exception::MalformedRequest) => {}
            other => panic!("Expected MalformedRequest error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_utf8() {
        let buffer = vec![0xFF, 0xFE, 0xFD];

        match Request::try_from(&buffer, 0) {
            Err(Exception::RequestIsNotUtf8) => {}
            other => panic!("Expected RequestIsNotUtf8 error, got {:?}", other),
        }
    }

    #[test]
    fn test_case_insensitive_headers() {
        let request_str = "get / HTTP/1.0\r\nhost: localhost\r\nuser-agent: Test\r\n\r\n";

        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.method(), HttpRequestMethod::Get);
        assert_eq!(request.version(), HttpVersion::V1_0);
        assert_eq!(request.user_agent(), "Test");
        assert_eq!(request.header("HOST"), Some("localhost"));
    }

    #[test]
    fn test_new_with_header() {
        let request = Request::new(HttpRequestMethod::Post, "/submit").with_header("Accept", "*/*");

        assert_eq!(request.path(), "/submit");
        assert_eq!(request.header("accept"), Some("*/*"));
        assert_eq!(request.user_agent(), "");
    }
}
