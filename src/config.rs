use num_cpus;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{error, warn};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::prelude::*;

use crate::exception::Exception;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    template_root: String,
    port: u16,
    worker_threads: usize,
    cache_size: usize,
    local: bool,
    #[serde(default = "default_max_request_size")]
    max_request_size: usize,
    #[serde(default)]
    defaults: Map<String, Value>,
}

fn default_max_request_size() -> usize {
    8192 // 8KB
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            template_root: "views".to_string(),
            port: 7878,
            worker_threads: 0,
            cache_size: 5,
            local: true,
            max_request_size: default_max_request_size(),
            defaults: Map::new(),
        }
        .normalized()
    }

    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let mut file = File::open(filename)
            .map_err(|e| Exception::Config(format!("no such file {}: {}", filename, e)))?;
        let mut str_val = String::new();
        file.read_to_string(&mut str_val)
            .map_err(|e| Exception::Config(format!("error reading {}: {}", filename, e)))?;
        Ok(Self::parse(&str_val))
    }

    /// 解析配置文本；无法解析时记录错误并使用默认配置
    pub fn parse(text: &str) -> Self {
        let raw_config: Config = match toml::from_str(text) {
            Ok(t) => t,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象，使用默认配置: {}", e);
                Config::new()
            }
        };
        raw_config.normalized()
    }

    fn normalized(mut self) -> Self {
        if self.worker_threads == 0 {
            self.worker_threads = num_cpus::get();
        }
        if self.cache_size == 0 {
            warn!("cache_size被设置为0，但目前尚不支持禁用缓存，因此该值将被改为5。");
            self.cache_size = 5;
        }
        self
    }
}

impl Config {
    pub fn template_root(&self) -> &str {
        &self.template_root
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    pub fn local(&self) -> bool {
        self.local
    }

    /// `local` 为真时只监听回环地址
    pub fn address(&self) -> &'static str {
        match self.local {
            true => "127.0.0.1",
            false => "0.0.0.0",
        }
    }

    pub fn max_request_size(&self) -> usize {
        self.max_request_size
    }

    /// 写入共享上下文的默认属性
    pub fn defaults(&self) -> &Map<String, Value> {
        &self.defaults
    }
}
