pub mod app;
pub mod cache;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod exception;
pub mod exchange;
pub mod expression;
pub mod middleware;
pub mod param;
pub mod request;
pub mod response;
pub mod server;
pub mod source;
pub mod template;
pub mod util;

pub use app::{App, Yoke};
pub use cache::TemplateCache;
pub use config::Config;
pub use context::{Context, ContextStore};
pub use dispatch::{Chain, Dispatch, State};
pub use engine::{Engine, EngineRegistry, TemplateEngine};
pub use exception::Exception;
pub use exchange::Exchange;
pub use middleware::{ErrorHandler, ErrorPage, Flow, Hello, Logger, Middleware, Next};
pub use param::{HttpRequestMethod, HttpVersion};
pub use request::Request;
pub use response::Response;
pub use server::{Listening, Server, ServerHandle};
pub use source::{FileSystemSource, MemorySource, TemplateSource};
pub use template::Template;
pub use util::HtmlBuilder;
