//! Router module
//!
//! This module provides the routing and HTTP plumbing of the application. It allows for:
//!
//! - Method- and path-parameter-based routing of HTTP endpoints
//! - Global and route-specific middleware (pre and post)
//! - Transport-independent dispatch (`Router::dispatch`), served over axum
//! - Template live-reload in debug mode via a websocket route and a file watcher

use crate::error::AppError;
use crate::forms::FormData;
use crate::orm::Db;
use crate::settings::Settings;
use axum::Router as AxumRouter;
use axum::body::HttpBody;
use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::routing::get;
use notify::event::DataChange;
use notify::event::ModifyKind::Data;
use notify::{EventKind, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Db>,
    pub settings: Settings,
}

/// Largest request body accepted, in bytes.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Head,
    Other,
}

impl Method {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "HEAD" => Method::Head,
            _ => Method::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Head => "HEAD",
            Method::Other => "OTHER",
        }
    }

    fn allowed_by(&self, methods: &[Method]) -> bool {
        methods.contains(self) || (*self == Method::Head && methods.contains(&Method::Get))
    }
}

/// An incoming request, decoded from the transport.
#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub params: HashMap<String, String>,
    pub query: FormData,
    pub form: FormData,
}

impl Request {
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        Request {
            method,
            path: path.to_string(),
            params: HashMap::new(),
            query: FormData::parse(query),
            form: FormData::new(),
        }
    }

    pub fn get(target: &str) -> Self {
        Request::new(Method::Get, target)
    }

    pub fn post(target: &str, form: FormData) -> Self {
        Request {
            form,
            ..Request::new(Method::Post, target)
        }
    }

    pub fn is_post(&self) -> bool {
        self.method == Method::Post
    }

    /// A positive integer path parameter. Anything else means the URL names nothing.
    pub fn param_id(&self, name: &str) -> Result<i64, AppError> {
        self.params
            .get(name)
            .and_then(|raw| raw.parse::<i64>().ok())
            .filter(|id| *id > 0)
            .ok_or_else(|| AppError::not_found(format!("{} in {}", name, self.path)))
    }

    /// Decode an HTTP request. Url-encoded bodies become `form`; a body over
    /// `MAX_BODY_BYTES` is a 413 and an unreadable one a 400.
    pub async fn from_http(req: axum::extract::Request) -> Result<Self, Response> {
        let (parts, body) = req.into_parts();
        let is_form = parts
            .headers
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);
        let form = if is_form {
            if body.size_hint().lower() > MAX_BODY_BYTES as u64 {
                log::warn!(
                    "Rejected {} body of {} bytes",
                    parts.uri.path(),
                    body.size_hint().lower()
                );
                return Err(Response::error(413));
            }
            match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
                Ok(bytes) => FormData::parse_bytes(&bytes),
                Err(e) => {
                    log::warn!("Could not read request body for {}: {}", parts.uri.path(), e);
                    return Err(Response::error(400));
                }
            }
        } else {
            FormData::new()
        };
        Ok(Request {
            method: Method::parse(parts.method.as_str()),
            path: parts.uri.path().to_string(),
            params: HashMap::new(),
            query: FormData::parse(parts.uri.query().unwrap_or("")),
            form,
        })
    }
}

/// Represents the outcome of an HTTP handler.
#[derive(Debug)]
pub struct Response {
    pub status_code: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
}

impl Response {
    /// Construct a new HTTP 200 response with a plain body.
    pub fn ok(body: impl Into<String>) -> Self {
        Response {
            status_code: 200,
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    /// Construct a new HTTP 200 response with an HTML body.
    pub fn html(body: impl Into<String>) -> Self {
        let mut response = Response::ok(body);
        response.headers.insert(
            "Content-Type".to_string(),
            "text/html; charset=utf-8".to_string(),
        );
        response
    }

    /// Construct a 302 redirect to `location`.
    pub fn redirect(location: impl Into<String>) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Location".to_string(), location.into());
        Response {
            status_code: 302,
            body: String::new(),
            headers,
        }
    }

    /// Construct a new HTTP 404 "not found" response.
    pub fn not_found() -> Self {
        Response {
            status_code: 404,
            body: "404 Not Found".to_string(),
            headers: HashMap::new(),
        }
    }

    pub fn method_not_allowed(allowed: &[Method]) -> Self {
        let allow: Vec<&str> = allowed.iter().map(Method::as_str).collect();
        let mut headers = HashMap::new();
        headers.insert("Allow".to_string(), allow.join(", "));
        Response {
            status_code: 405,
            body: "405 Method Not Allowed".to_string(),
            headers,
        }
    }

    /// A plain `<code> <reason>` response, e.g. `413 Payload Too Large`.
    pub fn error(status_code: u16) -> Self {
        Response {
            status_code,
            body: format!("{} {}", status_code, status_text(status_code)),
            headers: HashMap::new(),
        }
    }

    pub fn server_error() -> Self {
        Response {
            status_code: 500,
            body: "500 Internal Server Error".to_string(),
            headers: HashMap::new(),
        }
    }

    fn into_axum(self) -> axum::response::Response {
        let mut builder = axum::http::Response::builder().status(self.status_code);
        for (key, value) in &self.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        builder
            .body(axum::body::Body::from(self.body))
            .unwrap_or_else(|e| {
                log::error!("Could not build response: {}", e);
                let mut fallback = axum::response::Response::new(axum::body::Body::empty());
                *fallback.status_mut() = axum::http::StatusCode::INTERNAL_SERVER_ERROR;
                fallback
            })
    }
}

/// Anything a handler may return; turned into a `Response` with access to app state.
pub trait Responder {
    fn respond(self, state: &AppState) -> Response;
}

impl Responder for Response {
    fn respond(self, _state: &AppState) -> Response {
        self
    }
}

/// Holds metadata about the current HTTP request and its extracted path parameters.
/// Middleware and handlers can modify/read this context.
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub params: HashMap<String, String>,
    pub start_time: Option<Instant>,
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Type alias for async handler functions for HTTP routes.
pub type Handler = Arc<dyn Fn(Request, AppState) -> HandlerFuture + Send + Sync>;

/// Type alias for synchronous, pre-processing middleware executed before the handler.
/// If a middleware returns Some(Response), request handling stops and this response is sent.
pub type Middleware = Arc<dyn Fn(&mut RequestContext) -> Option<Response> + Send + Sync>;

/// Type alias for post-processing middleware executed after the handler.
/// Post-middleware can inspect/modify the response before it is sent.
pub type PostMiddleware = Arc<dyn Fn(&RequestContext, Response) -> Response + Send + Sync>;

/// Represents a registered HTTP route and its associated handler + middleware.
#[derive(Clone)]
pub struct Route {
    pub methods: Vec<Method>,
    pub path_pattern: String,
    pub handler: Handler,
    pub middlewares: Vec<Middleware>,
}

/// The main application router.
/// Manages all HTTP routes and global middleware.
#[derive(Clone)]
pub struct Router {
    pub routes: Vec<Route>,
    pub middlewares: Vec<Middleware>,
    pub post_middlewares: Vec<PostMiddleware>,
    pub app_state: Option<AppState>,
}

/// Maps status codes to HTTP status text.
pub fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        302 => "Found",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Pre-middleware stamping the request start time, for `request_logger`.
pub fn request_timer() -> Middleware {
    Arc::new(|ctx| {
        ctx.start_time = Some(Instant::now());
        None
    })
}

/// Post-middleware logging method, path, status and latency of every request.
pub fn request_logger() -> PostMiddleware {
    Arc::new(|ctx, response| {
        let elapsed = ctx
            .start_time
            .map(|t| format!("{:.1?}", t.elapsed()))
            .unwrap_or_else(|| "-".to_string());
        if response.status_code >= 500 {
            log::error!(
                "{} {} {} {} in {}",
                ctx.method.as_str(),
                ctx.path,
                response.status_code,
                status_text(response.status_code),
                elapsed
            );
        } else {
            log::info!(
                "{} {} {} in {}",
                ctx.method.as_str(),
                ctx.path,
                response.status_code,
                elapsed
            );
        }
        response
    })
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create a new, empty application router.
    pub fn new() -> Self {
        Router {
            routes: Vec::new(),
            middlewares: Vec::new(),
            post_middlewares: Vec::new(),
            app_state: None,
        }
    }

    /// Register an HTTP route with methods, path pattern, handler, and any route-specific middleware.
    pub fn add_route(
        &mut self,
        methods: &[Method],
        path_pattern: &str,
        handler: Handler,
        middlewares: Vec<Middleware>,
    ) {
        self.routes.push(Route {
            methods: methods.to_vec(),
            path_pattern: path_pattern.to_string(),
            handler,
            middlewares,
        });
    }

    /// Add a global pre-middleware to be run before all HTTP handlers.
    pub fn add_middleware(&mut self, middleware: Middleware) {
        self.middlewares.push(middleware);
    }

    /// Add a post-middleware to be run after each HTTP handler.
    pub fn add_post_middleware(&mut self, middleware: PostMiddleware) {
        self.post_middlewares.push(middleware);
    }

    pub fn set_app_state(&mut self, state: AppState) {
        self.app_state = Some(state);
    }

    /// Run one request through middleware, route matching and the handler.
    pub async fn dispatch(&self, mut request: Request) -> Response {
        let mut ctx = RequestContext {
            method: request.method,
            path: request.path.clone(),
            params: HashMap::new(),
            start_time: None,
        };

        let mut response = self.dispatch_inner(&mut ctx, &mut request).await;

        for post_middleware in &self.post_middlewares {
            response = (post_middleware)(&ctx, response);
        }
        response
    }

    async fn dispatch_inner(&self, ctx: &mut RequestContext, request: &mut Request) -> Response {
        for middleware in &self.middlewares {
            if let Some(response) = (middleware)(ctx) {
                return response;
            }
        }

        let Some(state) = self.app_state.clone() else {
            log::error!("App state not set in Router");
            return Response::server_error();
        };

        let mut allowed: Vec<Method> = Vec::new();
        for route in &self.routes {
            let Some(params) = match_path(&route.path_pattern, &ctx.path) else {
                continue;
            };
            if !ctx.method.allowed_by(&route.methods) {
                allowed.extend(route.methods.iter().copied());
                continue;
            }
            ctx.params = params;
            for middleware in &route.middlewares {
                if let Some(response) = (middleware)(ctx) {
                    return response;
                }
            }
            request.params = ctx.params.clone();
            return (route.handler)(request.clone(), state).await;
        }

        if allowed.is_empty() {
            Response::not_found()
        } else {
            Response::method_not_allowed(&allowed)
        }
    }

    /// Watches the template directory for changes; notifies via WS broadcast for live-reload.
    fn setup_reload_watcher(&self, template_path: PathBuf, sender: broadcast::Sender<String>) {
        tokio::spawn(async move {
            let (tx, mut rx) = tokio::sync::mpsc::channel(32);
            let mut watcher = match notify::recommended_watcher(move |res| {
                let _ = tx.blocking_send(res);
            }) {
                Ok(watcher) => watcher,
                Err(e) => {
                    log::error!("Failed to create template watcher: {:?}", e);
                    return;
                }
            };

            if let Err(e) = watcher.watch(&template_path, RecursiveMode::Recursive) {
                log::error!("Cannot watch {}: {:?}", template_path.display(), e);
                return;
            }

            while let Some(res) = rx.recv().await {
                match res {
                    Ok(event) => {
                        if let EventKind::Modify(Data(DataChange::Content)) = event.kind {
                            if let Some(file_name) = event
                                .paths
                                .first()
                                .and_then(|p| p.file_name())
                                .and_then(|n| n.to_str())
                            {
                                log::info!("Template changed: {}", file_name);
                                let _ = sender.send("reload".to_string());
                            }
                        }
                    }
                    Err(e) => log::error!("Watch error: {:?}", e),
                }
            }
        });
    }

    /// Build the axum app: every request goes through `dispatch`, plus the
    /// `/ws/reload` websocket when a reload sender is given.
    pub fn build_axum_router(
        &self,
        reload_sender: Option<broadcast::Sender<String>>,
    ) -> AxumRouter {
        let router = Arc::new(self.clone());
        let mut app = AxumRouter::new().fallback(move |req: axum::extract::Request| {
            let router = router.clone();
            async move {
                match Request::from_http(req).await {
                    Ok(request) => router.dispatch(request).await.into_axum(),
                    Err(response) => response.into_axum(),
                }
            }
        });

        if let Some(tx) = reload_sender {
            app = app.route(
                "/ws/reload",
                get(move |ws: WebSocketUpgrade| {
                    let tx = tx.clone();
                    async move {
                        ws.on_upgrade(move |mut socket| async move {
                            let mut rx = tx.subscribe();
                            log::info!("Hot reload websocket client connected");
                            while let Ok(msg) = rx.recv().await {
                                if socket.send(Message::Text(msg.into())).await.is_err() {
                                    break;
                                }
                            }
                        })
                    }
                }),
            );
        }

        app
    }

    /// Serve the application on `settings.host:settings.port` until Ctrl-C.
    pub async fn run(
        &mut self,
        settings: Settings,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut reload_sender = None;
        if settings.debug {
            let (sender, _) = broadcast::channel::<String>(10);
            self.setup_reload_watcher(PathBuf::from(&settings.template.dir), sender.clone());
            reload_sender = Some(sender);
        }

        let app = self.build_axum_router(reload_sender);
        let addr = format!("{}:{}", settings.host, settings.port);
        let listener = TcpListener::bind(&addr).await?;
        log::info!(
            "HTTP server running on http://{}{}/",
            addr,
            settings.mount_prefix
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                log::info!("Shutting down");
            })
            .await?;
        Ok(())
    }
}

/// Register routes: `route!(router, [Get, Post] "/path/:id" => { handler, middleware... }, ...)`.
///
/// The handler is an async fn `(Request, AppState) -> impl Responder`.
#[macro_export]
macro_rules! route {
    ($router:expr, $( [$($method:ident),+] $path:expr => { $handler:expr $(, $middleware:expr )* } ),* $(,)?) => {
        $(
            $router.add_route(
                &[$($crate::router::Method::$method),+],
                &$path,
                ::std::sync::Arc::new(
                    move |request: $crate::router::Request,
                          state: $crate::router::AppState|
                          -> $crate::router::HandlerFuture {
                        Box::pin(async move {
                            let outcome = $handler(request, state.clone()).await;
                            $crate::router::Responder::respond(outcome, &state)
                        })
                    },
                ),
                vec![$($middleware),*]
            );
        )*
    };
}

/// Matches a path pattern (e.g. `/foo/:id`) against a real path,
/// extracting parameters into a HashMap if matched, or None if not.
pub fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.trim_matches('/').split('/').collect();
    let path_parts: Vec<&str> = path.trim_matches('/').split('/').collect();

    if pattern_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = HashMap::new();

    for (p, a) in pattern_parts.iter().zip(path_parts.iter()) {
        if let Some(name) = p.strip_prefix(':') {
            params.insert(name.to_string(), a.to_string());
        } else if p != a {
            return None;
        }
    }

    Some(params)
}
