// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Yoke 演示服务器
//!
//! 加载配置与日志，注册一条演示中间件链，然后启动监听：
//! - `Logger`：记录每个请求
//! - `/hello`：用 `views/hello.tpl` 渲染问候页
//! - `ErrorPage`：为错误与 404 渲染 HTML 页面
//!
//! 标准输入上提供运维控制台（`stop` / `status` / `help`）。

use log::{error, info};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    runtime::Builder,
};

use yoke::{
    Config, ErrorPage, FileSystemSource, Hello, Logger, ServerHandle, TemplateEngine, Yoke,
};

/// # 程序入口点
fn main() {
    // 日志系统通过外部 YAML 配置级别与输出目的地
    log4rs::init_file("config/log4rs.yaml", Default::default()).unwrap();

    let config = match Config::from_toml("config/development.toml") {
        Ok(config) => config,
        Err(e) => {
            error!("{}，使用默认配置", e);
            Config::new()
        }
    };
    info!("配置文件已载入");
    info!("template root: {}", config.template_root());

    // 根据配置文件分配工作线程数
    let runtime = Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        let mut yoke = Yoke::with_config(&config);
        yoke.engine(
            "tpl",
            TemplateEngine::new(
                FileSystemSource::new(config.template_root()),
                config.cache_size(),
            ),
        )
        .use_middleware(Logger)
        .use_at("/hello", Hello::new("hello.tpl"))
        .use_error_handler(ErrorPage::new());

        let port = config.port();
        let listening = match yoke.listen(port, Some(config.address())).await {
            Ok(listening) => listening,
            Err(e) => {
                error!("无法绑定端口：{}，错误：{}", port, e);
                panic!("无法绑定端口：{}，错误：{}", port, e);
            }
        };
        tokio::spawn(console(listening.handle()));

        if let Err(e) = listening.stopped().await {
            error!("服务器异常退出: {}", e);
        }
    });
}

/// 交互式管理控制台，运行在后台，不阻塞监听循环
async fn console(handle: ServerHandle) {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut input = String::new();
    loop {
        input.clear();
        match reader.read_line(&mut input).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        match input.trim() {
            "stop" => {
                handle.stop();
                println!("停机指令已激活，服务器将停止接受新连接...");
                break;
            }
            "help" => {
                println!("== Yoke Help ==");
                println!("stop   - 发出停机信号");
                println!("status - 查看当前服务器运行状态");
                println!("help   - 显示此帮助信息");
                println!("===============");
            }
            "status" => {
                println!("== Yoke 状态 ===");
                println!("当前活跃连接数: {}", handle.active_connections());
                println!("===============");
            }
            cmd => {
                println!("无效的命令：{}", cmd);
            }
        }
    }
}
