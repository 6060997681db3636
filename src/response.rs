// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 响应构建模块
//!
//! 中间件通过 `set_status` 与 `end` 操作响应对象，服务端在分发结束后
//! 调用 `as_bytes` 将其序列化为 HTTP/1.1 报文。

use crate::param::*;

use bytes::Bytes;
use chrono::prelude::*;
use log::warn;

#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    content_type: Option<String>,
    headers: Vec<(String, String)>,
    date: DateTime<Utc>,
    server_name: String,
    content: Option<Bytes>,
    ended: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: "OK".to_string(),
            content_type: None,
            headers: Vec::new(),
            date: Utc::now(),
            server_name: SERVER_NAME.to_string(),
            content: None,
            ended: false,
        }
    }

    /// 以原因短语作为纯文本正文的响应，用于默认的 404/500 及报文解析失败。
    pub fn from_status_code(code: u16) -> Self {
        let mut response = Self::new();
        response
            .set_status(code)
            .set_content_type(TEXT_CONTENT_TYPE)
            .end(reason_phrase(code));
        response
    }

    /// 设置状态码，原因短语随之更新
    pub fn set_status(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = reason_phrase(code).to_string();
        self
    }

    pub fn set_content_type(&mut self, content_type: &str) -> &mut Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    /// 追加一个自定义标头
    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// 写入正文并结束响应。
    ///
    /// 重复调用属于调用方错误：只记录警告，后一次写入覆盖前一次。
    pub fn end(&mut self, body: impl Into<Bytes>) {
        if self.ended {
            warn!("响应已经结束，end 被重复调用（状态码 {}）", self.status_code);
        }
        self.content = Some(body.into());
        self.date = Utc::now();
        self.ended = true;
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        let content: &[u8] = match &self.content {
            Some(c) => c,
            None => &[],
        };
        let version = self.version.to_string();
        let status_code = self.status_code.to_string();
        let content_length = content.len().to_string();
        let date = format_date(&self.date);

        let mut header = [
            version.as_str(),
            " ",
            status_code.as_str(),
            " ",
            self.information.as_str(),
            CRLF,
            match &self.content_type {
                Some(t) => ["Content-Type: ", t, CRLF].concat(),
                None => "".to_string(),
            }
            .as_str(),
            "Content-Length: ",
            content_length.as_str(),
            CRLF,
            "Date: ",
            date.as_str(),
            CRLF,
            "Server: ",
            self.server_name.as_str(),
            CRLF,
        ]
        .concat();
        for (name, value) in &self.headers {
            header.push_str(&[name.as_str(), ": ", value.as_str(), CRLF].concat());
        }
        header.push_str(CRLF);

        let mut bytes = header.into_bytes();
        bytes.extend_from_slice(content);
        bytes
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// 响应是否已经调用过 `end`
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn body(&self) -> &[u8] {
        match &self.content {
            Some(c) => c,
            None => &[],
        }
    }

    /// 以 UTF-8（有损）方式读取正文，便于日志与测试
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(self.body()).to_string()
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_date() {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(format_date(&date), "Mon, 01 Jan 2024 12:00:00 GMT");
    }

    #[test]
    fn test_response_new() {
        let response = Response::new();
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.information(), "OK");
        assert!(!response.is_ended());
        assert!(response.body().is_empty());
    }

    #[test]
    fn test_set_status_updates_reason() {
        let mut response = Response::new();
        response.set_status(404);
        assert_eq!(response.status_code(), 404);
        assert_eq!(response.information(), "Not Found");
    }

    #[test]
    fn test_from_status_code_body_is_reason_phrase() {
        let response = Response::from_status_code(500);
        assert_eq!(response.status_code(), 500);
        assert_eq!(response.body_string(), "Internal Server Error");
        assert!(response.is_ended());
    }

    #[test]
    fn test_response_as_bytes_with_content() {
        let mut response = Response::new();
        response
            .set_content_type(HTML_CONTENT_TYPE)
            .set_header("X-Powered-By", "yoke")
            .end("<p>hi</p>");

        let text = String::from_utf8(response.as_bytes()).unwrap();

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: text/html;charset=utf-8\r\n"));
        assert!(text.contains("Content-Length: 9\r\n"));
        assert!(text.contains("Server: yoke\r\n"));
        assert!(text.contains("X-Powered-By: yoke\r\n"));
        assert!(text.ends_with("\r\n\r\n<p>hi</p>"));
    }

    #[test]
    fn test_response_as_bytes_without_content() {
        let mut response = Response::new();
        response.set_status(204);

        let text = String::from_utf8(response.as_bytes()).unwrap();

        assert!(text.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
        assert!(!text.contains("Content-Type"));
    }

    #[test]
    fn test_end_twice_overwrites_body() {
        let mut response = Response::new();
        response.end("first");
        response.end("second");
        assert_eq!(response.body_string(), "second");
    }
}
