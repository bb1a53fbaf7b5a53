//! portal_web - HTTP/1.1 protocol engine for server applications
//!
//! Turns a raw byte stream on an accepted connection into framed
//! request/response messages, routes each request to the right handler
//! deterministically, and fans out observability events around every
//! dispatch.
//!
//! # Architecture
//!
//! - **Framing**: a five-state boundary machine finds the `CRLFCRLF` header
//!   terminator under arbitrary read chunking, then exactly `Content-Length`
//!   body bytes are read. Malformed bytes become 4xx pages, never crashes.
//! - **Routing**: bindings keyed by (host pattern, method, URI template,
//!   content type) resolve most-specific-first: exact host before host
//!   wildcards, literal path segments before `{parameters}`, then content
//!   negotiation against the `Accept` list.
//! - **Dispatch**: filters run first and may short-circuit, one rewrite may
//!   substitute the request, then the resolved handler answers. Handler
//!   failures convert to 500 pages at this boundary.
//! - **Events**: request/response/error subscribers fan out through a
//!   guarded bus; the request log is awaited for ordering, the rest never
//!   block the response path.
//!
//! # Examples
//!
//! Quick start:
//! ```no_run
//! use portal_web::{Binding, Dispatcher, PathParams, Request, Response, Server, StatusCode};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let dispatcher = Dispatcher::builder()
//!         .route(Binding::get("/status", |_req: Arc<Request>, _params: PathParams| async move {
//!             Ok(Response::new(StatusCode::Ok)
//!                 .header("content-type", "application/json")
//!                 .body(r#"{"ok":true}"#))
//!         }).unwrap())
//!         .unwrap()
//!         .build();
//!
//!     Server::builder()
//!         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
//!         .dispatcher(dispatcher)
//!         .build()
//!         .launch()
//!         .await;
//! }
//! ```
//!
//! Parameterized routes, custom hosts and observability:
//! ```no_run
//! use portal_web::{
//!     Binding, Dispatcher, ErrorBinding, Fault, HostPattern, MediaType, PathParams, Request,
//!     Response, StatusCode,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), portal_web::RegisterError> {
//! let dispatcher = Dispatcher::builder()
//!     .server_name("api-gw")
//!     .route(
//!         Binding::get("/api/users/{id}", |_req: Arc<Request>, params: PathParams| async move {
//!             let id = params.get("id").unwrap_or("?").to_string();
//!             Ok(Response::new(StatusCode::Ok)
//!                 .header("content-type", "application/json")
//!                 .body(format!(r#"{{"user":"{id}"}}"#)))
//!         })?
//!         .host(HostPattern::any_port("api.example.com"))
//!         .content_type(MediaType::new("application", "json")),
//!     )?
//!     .error_route(ErrorBinding::new(StatusCode::NotFound, "/{rest}", |_req: Arc<Request>,
//!      fault: Fault| async move {
//!         Ok(Response::new(StatusCode::NotFound).body(fault.reason))
//!     })?)
//!     .subscribe_request_log(|event: Arc<portal_web::RequestReceived>| async move {
//!         println!("> {} {}", event.request.method(), event.request.target());
//!         Ok(())
//!     })
//!     .build();
//! # let _ = dispatcher; Ok(())
//! # }
//! ```

pub mod events;
pub mod limits;
pub(crate) mod errors;
pub(crate) mod http {
    pub mod accept;
    pub mod request;
    pub mod response;
    pub mod types;
}
pub mod pipeline;
pub(crate) mod routing {
    pub mod host;
    pub mod table;
    pub mod template;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod framing;
    pub mod server_impl;
}

pub use crate::{
    errors::{Fault, FrameError, HandlerError},
    events::{CallbackError, EventBus, EventCallback, EventError, SubscriptionId},
    http::{
        accept::{AcceptList, MediaRange},
        request::Request,
        response::{Body, Response},
        types::{Header, HeaderMap, Host, MediaType, Method, StatusCode, Version},
    },
    pipeline::{
        Authorizer, Dispatcher, DispatcherBuilder, ErrorOccurred, EventHub, Filter,
        RequestReceived, ResponseSent, Rewrite,
    },
    routing::{
        host::{HostPattern, TenantMap},
        table::{
            AuthFlags, Binding, ErrorBinding, ErrorHandler, RegisterError, ReplacePolicy,
            RouteHandler, RouteMatch, RouteMiss, RoutingTable,
        },
        template::{PathParams, TemplateError, UriTemplate},
    },
    server::server_impl::{Server, ServerBuilder},
};

/// Boxed future type used across handler, filter, rewrite and subscriber
/// seams.
pub type BoxFuture<T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'static>>;
