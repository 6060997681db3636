// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 监听模块
//!
//! 持续接收 TCP 连接，每个连接读取一个请求，交给应用分发后写回响应并关闭。
//! 停机信号通过 `ServerHandle` 发出，主循环在下一次轮询时退出。

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Instant,
};

use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::Notify,
    task::JoinHandle,
};

use crate::{app::App, exception::Exception, request::Request, response::Response};

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// 控制台等外部任务持有的服务器句柄
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: Arc<Notify>,
    active_connection: Arc<AtomicUsize>,
}

impl ServerHandle {
    /// 发出停机信号
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }

    /// 当前活跃连接数
    pub fn active_connections(&self) -> usize {
        self.active_connection.load(Ordering::SeqCst)
    }
}

/// 活跃连接计数的守卫，任务正常结束或因 panic 展开时都会减一
struct ConnectionGuard {
    active_connection: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    fn new(active_connection: Arc<AtomicUsize>) -> Self {
        active_connection.fetch_add(1, Ordering::SeqCst);
        Self { active_connection }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_connection.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 正在后台监听的服务器
pub struct Listening {
    local_addr: SocketAddr,
    handle: ServerHandle,
    task: JoinHandle<Result<(), Exception>>,
}

impl Listening {
    /// 实际绑定的地址，端口为 0 时可由此得知系统分配的端口
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// 等待主循环退出
    pub async fn stopped(self) -> Result<(), Exception> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(Exception::Io(format!("accept loop aborted: {}", e))),
        }
    }
}

pub struct Server {
    app: Arc<App>,
    handle: ServerHandle,
}

impl Server {
    pub fn new(app: App) -> Self {
        Self {
            app: Arc::new(app),
            handle: ServerHandle {
                shutdown: Arc::new(Notify::new()),
                active_connection: Arc::new(AtomicUsize::new(0)),
            },
        }
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// 在后台任务中运行主事件循环，立即返回句柄
    pub fn spawn(self, listener: TcpListener) -> Result<Listening, Exception> {
        let local_addr = listener.local_addr()?;
        let handle = self.handle();
        let task = tokio::spawn(self.serve(listener));
        Ok(Listening {
            local_addr,
            handle,
            task,
        })
    }

    /// 主事件循环，直到收到停机信号
    pub async fn serve(self, listener: TcpListener) -> Result<(), Exception> {
        loop {
            let (mut stream, addr) = tokio::select! {
                _ = self.handle.shutdown.notified() => {
                    info!("主循环接收到停机指令，正在退出...");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok(a) => a,
                    Err(e) => {
                        error!("接受TCP连接失败: {}", e);
                        continue;
                    }
                },
            };

            let id = self.app.next_id();
            debug!("[ID{}]TCP连接已建立：{}", id, addr);

            let app = Arc::clone(&self.app);
            let active_connection = Arc::clone(&self.handle.active_connection);
            tokio::spawn(async move {
                let _guard = ConnectionGuard::new(active_connection);
                handle_connection(&mut stream, id, &app).await;
            });
        }

        let remaining = self.handle.active_connections();
        if remaining > 0 {
            warn!("仍有{}个连接未处理完毕", remaining);
        }
        Ok(())
    }
}

/// 读取请求头直到空行。超过上限返回 `Err(413)`，对端提前关闭返回 `Ok(None)`。
async fn read_head(
    stream: &mut TcpStream,
    id: u128,
    limit: usize,
) -> Result<Option<Vec<u8>>, u16> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(n) => n,
            Err(e) => {
                error!("[ID{}]读取TCPStream时遇到错误: {}", id, e);
                return Ok(None);
            }
        };
        if n == 0 {
            return Ok(if buffer.is_empty() { None } else { Some(buffer) });
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(end) = buffer
            .windows(HEAD_TERMINATOR.len())
            .position(|w| w == HEAD_TERMINATOR)
        {
            buffer.truncate(end + HEAD_TERMINATOR.len());
            return Ok(Some(buffer));
        }
        if buffer.len() > limit {
            warn!("[ID{}]请求头超过{}字节上限", id, limit);
            return Err(413);
        }
    }
}

/// # 连接处理器
///
/// 读取并解析请求、运行分发、写回响应。
async fn handle_connection(stream: &mut TcpStream, id: u128, app: &App) {
    let head = match read_head(stream, id, app.max_request_size()).await {
        Ok(Some(head)) => head,
        Ok(None) => return,
        Err(code) => {
            write_response(stream, id, Response::from_status_code(code)).await;
            return;
        }
    };
    debug!("[ID{}]HTTP请求接收完毕", id);

    let start_time = Instant::now();

    let request = match Request::try_from(&head, id) {
        Ok(req) => req,
        Err(e) => {
            error!("[ID{}]解析HTTP请求失败: {}", id, e);
            write_response(stream, id, Response::from_status_code(e.status_code())).await;
            return;
        }
    };
    debug!("[ID{}]成功解析HTTP请求", id);

    let version = request.version();
    let path = request.path().to_string();
    let method = request.method();
    let user_agent = request.user_agent().to_string();

    let response = app.handle_with_id(id, request).await;
    debug!(
        "[ID{}]HTTP响应构建完成，服务端用时{}ms。",
        id,
        start_time.elapsed().as_millis()
    );

    info!(
        "[ID{}] {}, {}, {}, {}, {}, {}, ",
        id,
        version,
        path,
        method,
        response.status_code(),
        response.information(),
        user_agent,
    );

    write_response(stream, id, response).await;
}

async fn write_response(stream: &mut TcpStream, id: u128, mut response: Response) {
    response.set_header("Connection", "close");
    let response_bytes = response.as_bytes();
    debug!("[ID{}]发送响应，长度: {}", id, response_bytes.len());
    if let Err(e) = stream.write_all(&response_bytes).await {
        error!("[ID{}]发送响应失败: {}", id, e);
        return;
    }
    let _ = stream.flush().await;
    let _ = stream.shutdown().await;
}
