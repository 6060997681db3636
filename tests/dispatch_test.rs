use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;
use serde_json::json;

use yoke::{
    ErrorHandler, ErrorPage, Exception, Exchange, Flow, HttpRequestMethod, MemorySource,
    Middleware, Next, Request, TemplateEngine, Yoke,
};

type Trace = Arc<Mutex<Vec<String>>>;

/// 记录自身名字，然后按设定的方式结束
#[derive(Clone)]
enum Outcome {
    Resume,
    Fail(Exception),
    Finish(&'static str),
}

struct Recorder {
    name: String,
    trace: Trace,
    outcome: Outcome,
}

impl Recorder {
    fn new(name: &str, trace: &Trace, outcome: Outcome) -> Self {
        Self {
            name: name.to_string(),
            trace: Arc::clone(trace),
            outcome,
        }
    }
}

#[async_trait]
impl Middleware for Recorder {
    async fn handle(&self, exchange: &mut Exchange, next: Next) -> Flow {
        self.trace.lock().unwrap().push(self.name.clone());
        match self.outcome.clone() {
            Outcome::Resume => next.resume(),
            Outcome::Fail(e) => next.fail(e),
            Outcome::Finish(body) => {
                exchange.response_mut().end(body);
                Flow::Done
            }
        }
    }
}

/// 挂起一段时间后再继续
struct Sleepy {
    trace: Trace,
}

#[async_trait]
impl Middleware for Sleepy {
    async fn handle(&self, exchange: &mut Exchange, next: Next) -> Flow {
        tokio::time::sleep(Duration::from_millis(10)).await;
        exchange.put("slept", true);
        self.trace.lock().unwrap().push("sleepy".to_string());
        next.resume()
    }
}

struct CountingHandler {
    calls: Arc<AtomicUsize>,
    body: &'static str,
}

#[async_trait]
impl ErrorHandler for CountingHandler {
    async fn handle(&self, exchange: &mut Exchange) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let error = exchange.get("error").unwrap_or_default();
        let body = format!("{}:{}", self.body, error.as_str().unwrap_or("-"));
        exchange.response_mut().end(body);
    }
}

fn get(uri: &str) -> Request {
    Request::new(HttpRequestMethod::Get, uri)
}

fn trace() -> Trace {
    Arc::new(Mutex::new(Vec::new()))
}

fn recorded(trace: &Trace) -> Vec<String> {
    trace.lock().unwrap().clone()
}

#[cfg(test)]
mod dispatch_tests {
    use super::*;

    #[tokio::test]
    async fn test_prefix_chain_both_continue_is_not_found() {
        let trace = trace();
        let mut yoke = Yoke::new();
        yoke.use_at("/", Recorder::new("A", &trace, Outcome::Resume))
            .use_at("/api", Recorder::new("B", &trace, Outcome::Resume));
        let app = yoke.build();

        let response = app.handle(get("/api/x")).await;

        assert_eq!(recorded(&trace), vec!["A", "B"]);
        assert_eq!(response.status_code(), 404);
        assert_eq!(response.body_string(), "Not Found");
    }

    #[tokio::test]
    async fn test_unmatched_prefix_is_skipped() {
        let trace = trace();
        let mut yoke = Yoke::new();
        yoke.use_at("/admin", Recorder::new("admin", &trace, Outcome::Resume))
            .use_at("/api", Recorder::new("api", &trace, Outcome::Finish("ok")));
        let app = yoke.build();

        let response = app.handle(get("/api/users?page=2")).await;

        assert_eq!(recorded(&trace), vec!["api"]);
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.body_string(), "ok");
    }

    #[tokio::test]
    async fn test_failure_skips_rest_and_defaults_to_500() {
        let trace = trace();
        let mut yoke = Yoke::new();
        yoke.use_middleware(Recorder::new(
            "fail",
            &trace,
            Outcome::Fail(Exception::Custom("boom".to_string())),
        ))
        .use_middleware(Recorder::new("after", &trace, Outcome::Resume));
        let app = yoke.build();

        let response = app.handle(get("/")).await;

        assert_eq!(recorded(&trace), vec!["fail"]);
        assert_eq!(response.status_code(), 500);
        assert_eq!(response.body_string(), "Internal Server Error");
    }

    #[tokio::test]
    async fn test_failure_runs_error_handler_once() {
        let trace = trace();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut yoke = Yoke::new();
        yoke.use_middleware(Recorder::new(
            "fail",
            &trace,
            Outcome::Fail(Exception::Custom("boom".to_string())),
        ))
        .use_middleware(Recorder::new("after", &trace, Outcome::Resume))
        .use_error_handler(CountingHandler {
            calls: Arc::clone(&calls),
            body: "handled",
        });
        let app = yoke.build();

        let response = app.handle(get("/")).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(recorded(&trace), vec!["fail"]);
        assert_eq!(response.body_string(), "handled:boom");
    }

    #[tokio::test]
    async fn test_exhaustion_runs_error_handler_with_404() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut yoke = Yoke::new();
        yoke.use_error_handler(CountingHandler {
            calls: Arc::clone(&calls),
            body: "missing",
        });
        let app = yoke.build();

        let response = app.handle(get("/nothing")).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(response.status_code(), 404);
        assert_eq!(response.body_string(), "missing:-");
    }

    #[tokio::test]
    async fn test_second_error_handler_replaces_first() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut yoke = Yoke::new();
        yoke.use_error_handler(CountingHandler {
            calls: Arc::clone(&first),
            body: "first",
        })
        .use_error_handler(CountingHandler {
            calls: Arc::clone(&second),
            body: "second",
        });
        let app = yoke.build();

        let response = app.handle(get("/")).await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(response.body_string(), "second:-");
    }

    #[tokio::test]
    async fn test_suspending_handler_resumes_chain() {
        let trace = trace();
        let mut yoke = Yoke::new();
        yoke.use_middleware(Sleepy {
            trace: Arc::clone(&trace),
        })
        .use_middleware(Recorder::new("after", &trace, Outcome::Resume));
        let app = yoke.build();

        let response = app.handle(get("/")).await;

        assert_eq!(recorded(&trace), vec!["sleepy", "after"]);
        assert_eq!(response.status_code(), 404);
    }

    #[tokio::test]
    async fn test_error_page_status_from_error() {
        let trace = trace();
        let mut yoke = Yoke::new();
        yoke.use_middleware(Recorder::new(
            "deny",
            &trace,
            Outcome::Fail(Exception::Status(403)),
        ))
        .use_error_handler(ErrorPage::new());
        let app = yoke.build();

        let response = app.handle(get("/secret")).await;

        assert_eq!(response.status_code(), 403);
        assert!(response.body_string().contains("403 Forbidden"));
    }

    #[tokio::test]
    async fn test_request_context_does_not_leak_between_requests() {
        let mut yoke = Yoke::new();
        yoke.use_middleware(Sleepy { trace: trace() });
        let app = yoke.build();

        app.handle(get("/")).await;

        assert!(!app.defaults().contains("slept"));
        assert_eq!(app.defaults().get("title"), Some(json!("Yoke")));
    }

    #[tokio::test]
    async fn test_concurrent_requests_each_terminate_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut yoke = Yoke::new();
        yoke.use_middleware(Sleepy { trace: trace() })
            .use_error_handler(CountingHandler {
                calls: Arc::clone(&calls),
                body: "done",
            });
        let app = Arc::new(yoke.build());

        let mut tasks = Vec::new();
        for i in 0..16 {
            let app = Arc::clone(&app);
            tasks.push(tokio::spawn(async move {
                app.handle(get(&format!("/r/{}", i))).await
            }));
        }
        for task in tasks {
            let response = task.await.unwrap();
            assert_eq!(response.status_code(), 404);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 16);
    }

    #[tokio::test]
    async fn test_handler_renders_template() {
        struct Page;

        #[async_trait]
        impl Middleware for Page {
            async fn handle(&self, exchange: &mut Exchange, next: Next) -> Flow {
                exchange.put("name", "World");
                match exchange.render("hello.tpl").await {
                    Ok(()) => Flow::Done,
                    Err(e) => next.fail(e),
                }
            }
        }

        let source = MemorySource::new();
        source.insert("hello.tpl", "<%= title %>: Hello, <%= name %>!");
        let mut yoke = Yoke::new();
        yoke.engine("tpl", TemplateEngine::new(source, 4))
            .use_at("/hello", Page);
        let app = yoke.build();

        let response = app.handle(get("/hello")).await;

        assert_eq!(response.status_code(), 200);
        assert_eq!(response.body_string(), "Yoke: Hello, World!");
    }

    #[tokio::test]
    async fn test_render_failure_reaches_error_handler() {
        struct Broken;

        #[async_trait]
        impl Middleware for Broken {
            async fn handle(&self, exchange: &mut Exchange, next: Next) -> Flow {
                next.after(exchange.render("missing.tpl").await)
            }
        }

        let mut yoke = Yoke::new();
        yoke.engine(".tpl", TemplateEngine::new(MemorySource::new(), 4))
            .use_middleware(Broken);
        let app = yoke.build();

        let response = app.handle(get("/")).await;

        assert_eq!(response.status_code(), 500);
        assert_eq!(response.body_string(), "Internal Server Error");
    }
}

#[cfg(test)]
mod order_tests {
    use super::*;

    const ROUTES: [&str; 4] = ["/", "/a", "/a/b", "/c"];
    const PATHS: [&str; 5] = ["/", "/a", "/a/b/c", "/c?x=1", "/d"];

    proptest! {
        #[test]
        fn visits_matching_entries_in_registration_order(
            mounts in proptest::collection::vec(0..ROUTES.len(), 0..8),
            path in 0..PATHS.len(),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let trace = trace();
            let mut yoke = Yoke::new();
            for (i, route) in mounts.iter().enumerate() {
                yoke.use_at(ROUTES[*route], Recorder::new(&i.to_string(), &trace, Outcome::Resume));
            }
            let app = yoke.build();
            let uri = PATHS[path];
            let request_path = uri.split('?').next().unwrap();

            let response = runtime.block_on(app.handle(get(uri)));

            let expected: Vec<String> = mounts
                .iter()
                .enumerate()
                .filter(|(_, route)| request_path.starts_with(ROUTES[**route]))
                .map(|(i, _)| i.to_string())
                .collect();
            prop_assert_eq!(recorded(&trace), expected);
            prop_assert_eq!(response.status_code(), 404);
        }
    }
}
