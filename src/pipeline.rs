//! Per-request orchestration: filters, rewrites, routing, invocation and
//! event fan-out.
//!
//! [`Dispatcher::dispatch`] is the single entry point the connection layer
//! calls once a request has been framed. Whatever happens inside, it always
//! produces a response; handler failures are converted at this boundary,
//! never propagated.

use crate::{
    errors::{self, Fault, HandlerError},
    events::{EventBus, EventCallback, SubscriptionId},
    http::{request::Request, response::Response, types::StatusCode},
    routing::table::{
        AuthFlags, Binding, ErrorBinding, RegisterError, ReplacePolicy, RouteMiss, RoutingTable,
    },
    BoxFuture,
};
use std::{future::Future, sync::Arc};

/// A pre-routing hook. The first filter answering with a response
/// short-circuits the pipeline; routing is skipped entirely.
pub trait Filter: Send + Sync + 'static {
    fn call(&self, request: Arc<Request>) -> BoxFuture<Option<Response>>;
}

impl<F, Fut> Filter for F
where
    F: Fn(Arc<Request>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Response>> + Send + 'static,
{
    fn call(&self, request: Arc<Request>) -> BoxFuture<Option<Response>> {
        Box::pin(self(request))
    }
}

/// A request-substitution hook. The first rewrite answering with a
/// replacement substitutes it and stops further rewriting; rewrites do not
/// chain.
pub trait Rewrite: Send + Sync + 'static {
    fn call(&self, request: Arc<Request>) -> BoxFuture<Option<Request>>;
}

impl<F, Fut> Rewrite for F
where
    F: Fn(Arc<Request>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Request>> + Send + 'static,
{
    fn call(&self, request: Arc<Request>) -> BoxFuture<Option<Request>> {
        Box::pin(self(request))
    }
}

/// External authentication collaborator consulted for routes carrying
/// [`AuthFlags`]. Without a configured authorizer every such route answers
/// 401.
pub trait Authorizer: Send + Sync + 'static {
    fn authorize(&self, request: &Request, required: AuthFlags) -> bool;
}

impl<F> Authorizer for F
where
    F: Fn(&Request, AuthFlags) -> bool + Send + Sync + 'static,
{
    fn authorize(&self, request: &Request, required: AuthFlags) -> bool {
        self(request, required)
    }
}

/// Fired as soon as a request is framed, before routing. Fully awaited, so
/// request-log ordering is preserved relative to the response.
#[derive(Debug)]
pub struct RequestReceived {
    pub request: Arc<Request>,
}

/// Fired once the response is finalized, detached from the response path.
#[derive(Debug)]
pub struct ResponseSent {
    pub request: Arc<Request>,
    pub status: StatusCode,
}

/// Fired for every 4xx/5xx outcome and every internal failure, detached
/// from the response path. Framing faults carry no request.
#[derive(Debug)]
pub struct ErrorOccurred {
    pub request: Option<Arc<Request>>,
    pub fault: Fault,
}

/// The three observability buses of an engine.
#[derive(Default)]
pub struct EventHub {
    pub request_received: EventBus<RequestReceived>,
    pub response_sent: EventBus<ResponseSent>,
    pub error_occurred: EventBus<ErrorOccurred>,
}

/// Builder for a [`Dispatcher`].
pub struct DispatcherBuilder {
    table: RoutingTable,
    filters: Vec<Arc<dyn Filter>>,
    rewrites: Vec<Arc<dyn Rewrite>>,
    authorizer: Option<Arc<dyn Authorizer>>,
    events: EventHub,
    server_name: String,
    expose_detail: bool,
}

impl DispatcherBuilder {
    /// Registers a route, failing on duplicates.
    pub fn route(self, binding: Binding) -> Result<Self, RegisterError> {
        self.route_with_policy(binding, ReplacePolicy::Fail)
    }

    pub fn route_with_policy(
        self,
        binding: Binding,
        policy: ReplacePolicy,
    ) -> Result<Self, RegisterError> {
        self.table.register(binding, policy)?;
        Ok(self)
    }

    pub fn error_route(self, binding: ErrorBinding) -> Self {
        self.table.register_error_handler(binding);
        self
    }

    pub fn filter(mut self, filter: impl Filter) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn rewrite(mut self, rewrite: impl Rewrite) -> Self {
        self.rewrites.push(Arc::new(rewrite));
        self
    }

    pub fn authorizer(mut self, authorizer: impl Authorizer) -> Self {
        self.authorizer = Some(Arc::new(authorizer));
        self
    }

    /// Server identity: the default `server` response header and the
    /// fallback host for HTTP/1.0 requests without one.
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Renders failure detail into generated error pages. Off by default;
    /// intended for development setups.
    pub fn expose_detail(mut self, expose: bool) -> Self {
        self.expose_detail = expose;
        self
    }

    pub fn subscribe_request_log(self, callback: impl EventCallback<RequestReceived>) -> Self {
        self.events.request_received.subscribe(callback);
        self
    }

    pub fn subscribe_response_log(self, callback: impl EventCallback<ResponseSent>) -> Self {
        self.events.response_sent.subscribe(callback);
        self
    }

    pub fn subscribe_error_log(self, callback: impl EventCallback<ErrorOccurred>) -> Self {
        self.events.error_occurred.subscribe(callback);
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            table: self.table,
            filters: self.filters,
            rewrites: self.rewrites,
            authorizer: self.authorizer,
            events: Arc::new(self.events),
            server_name: self.server_name,
            expose_detail: self.expose_detail,
        }
    }
}

/// The per-request orchestrator: filters, then rewrites, then routing, then
/// handler invocation, with event notification around the outcome.
pub struct Dispatcher {
    table: RoutingTable,
    filters: Vec<Arc<dyn Filter>>,
    rewrites: Vec<Arc<dyn Rewrite>>,
    authorizer: Option<Arc<dyn Authorizer>>,
    events: Arc<EventHub>,
    server_name: String,
    expose_detail: bool,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder {
            table: RoutingTable::new(),
            filters: Vec::new(),
            rewrites: Vec::new(),
            authorizer: None,
            events: EventHub::default(),
            server_name: "portal_web".to_string(),
            expose_detail: false,
        }
    }

    /// Turns one framed request into one response. Never fails; faults are
    /// resolved into pages here.
    pub async fn dispatch(&self, request: Request) -> Response {
        let mut request = Arc::new(request);

        self.events
            .request_received
            .notify_all(Arc::new(RequestReceived {
                request: request.clone(),
            }))
            .await;

        for filter in &self.filters {
            if let Some(response) = filter.call(request.clone()).await {
                tracing::debug!(path = %request.target(), "filter short-circuited request");
                return self.finish(request, response, None);
            }
        }

        for rewrite in &self.rewrites {
            if let Some(replacement) = rewrite.call(request.clone()).await {
                tracing::debug!(
                    from = %request.target(),
                    to = %replacement.target(),
                    "request rewritten"
                );
                request = Arc::new(replacement);
                break;
            }
        }

        let resolved = {
            let segments = request.segment_refs();
            self.table
                .resolve(request.host(), request.method(), &segments, request.accept())
        };

        match resolved {
            Ok(found) => {
                if found.auth.any() && !self.authorized(&request, found.auth) {
                    let fault =
                        Fault::new(StatusCode::Unauthorized, "authorization required");
                    return self.fail(request, fault).await;
                }

                match found.handler.call(request.clone(), found.params).await {
                    Ok(response) => self.finish(request, response, None),
                    Err(error) => {
                        tracing::warn!(
                            route = %found.template,
                            error = %error.reason,
                            "handler failed"
                        );
                        self.fail(request, handler_fault(error)).await
                    }
                }
            }
            Err(RouteMiss::NoRoute) => {
                let fault = Fault::new(StatusCode::NotFound, "no handler for request");
                self.fail(request, fault).await
            }
            Err(RouteMiss::NoAcceptableType) => {
                let fault =
                    Fault::new(StatusCode::NotAcceptable, "no acceptable representation");
                self.fail(request, fault).await
            }
        }
    }

    fn authorized(&self, request: &Request, required: AuthFlags) -> bool {
        match &self.authorizer {
            Some(authorizer) => authorizer.authorize(request, required),
            None => false,
        }
    }

    /// Resolves a fault into a response, through a custom error route when
    /// one matches, else the generated page.
    async fn fail(&self, request: Arc<Request>, fault: Fault) -> Response {
        let custom = {
            let segments = request.segment_refs();
            self.table.resolve_error(
                request.host(),
                request.method(),
                &segments,
                fault.status,
                request.accept(),
            )
        };

        let response = match custom {
            Some(handler) => match handler.call(request.clone(), fault.clone()).await {
                Ok(response) => response,
                Err(error) => {
                    tracing::warn!(error = %error.reason, "error handler failed");
                    self.generated_page(&request, &fault)
                }
            },
            None => self.generated_page(&request, &fault),
        };

        self.finish(request, response, Some(fault))
    }

    fn generated_page(&self, request: &Request, fault: &Fault) -> Response {
        errors::render(
            fault,
            Some(request.accept()),
            Some(&request.request_line()),
            self.expose_detail,
        )
    }

    /// Fires the detached response/error notifications and hands the
    /// response back to the connection layer. The write path does not wait
    /// on subscribers.
    fn finish(&self, request: Arc<Request>, response: Response, fault: Option<Fault>) -> Response {
        let status = response.status();
        let events = self.events.clone();

        let fault = match fault {
            Some(fault) => Some(fault),
            None if status.is_error() => Some(Fault::new(status, status.reason())),
            None => None,
        };

        tokio::spawn(async move {
            events
                .response_sent
                .notify_all(Arc::new(ResponseSent {
                    request: request.clone(),
                    status,
                }))
                .await;

            if let Some(fault) = fault {
                events
                    .error_occurred
                    .notify_all(Arc::new(ErrorOccurred {
                        request: Some(request),
                        fault,
                    }))
                    .await;
            }
        });

        response
    }

    pub(crate) fn notify_framing_fault(&self, fault: Fault) {
        let events = self.events.clone();
        tokio::spawn(async move {
            events
                .error_occurred
                .notify_all(Arc::new(ErrorOccurred {
                    request: None,
                    fault,
                }))
                .await;
        });
    }

    pub(crate) fn server_name(&self) -> &str {
        &self.server_name
    }

    pub(crate) const fn detail_exposed(&self) -> bool {
        self.expose_detail
    }
}

// Runtime registration surface. Registration is expected at startup, but
// the table stays guarded so later additions do not race lookups.
impl Dispatcher {
    pub fn register(&self, binding: Binding, policy: ReplacePolicy) -> Result<(), RegisterError> {
        self.table.register(binding, policy)
    }

    pub fn register_error_handler(&self, binding: ErrorBinding) {
        self.table.register_error_handler(binding);
    }

    pub fn subscribe_request_log(
        &self,
        callback: impl EventCallback<RequestReceived>,
    ) -> SubscriptionId {
        self.events.request_received.subscribe(callback)
    }

    pub fn subscribe_response_log(
        &self,
        callback: impl EventCallback<ResponseSent>,
    ) -> SubscriptionId {
        self.events.response_sent.subscribe(callback)
    }

    pub fn subscribe_error_log(
        &self,
        callback: impl EventCallback<ErrorOccurred>,
    ) -> SubscriptionId {
        self.events.error_occurred.subscribe(callback)
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }
}

fn handler_fault(error: HandlerError) -> Fault {
    Fault {
        status: StatusCode::InternalServerError,
        code: "HANDLER_FAILED".to_string(),
        reason: error.reason,
        detail: error.detail,
    }
}

#[cfg(test)]
mod pipeline_self {
    use super::*;
    use crate::{
        events::CallbackError,
        limits::ReqLimits,
        routing::template::PathParams,
    };
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use tokio::sync::mpsc;

    fn request(block: &str) -> Request {
        Request::parse(block.as_bytes(), &ReqLimits::default(), "test").unwrap()
    }

    fn ok_handler(tag: &'static str) -> impl crate::routing::table::RouteHandler {
        move |_req: Arc<Request>, _params: PathParams| async move {
            Ok::<Response, HandlerError>(Response::new(StatusCode::Ok).header("x-tag", tag))
        }
    }

    fn tag_of(response: &Response) -> Option<&str> {
        response
            .headers()
            .iter()
            .find(|h| h.name == "x-tag")
            .map(|h| h.value.as_str())
    }

    #[tokio::test]
    async fn resolves_and_invokes_handler() {
        let dispatcher = Dispatcher::builder()
            .route(Binding::get("/status", ok_handler("status")).unwrap())
            .unwrap()
            .build();

        let response = dispatcher
            .dispatch(request("GET /status HTTP/1.1\r\nHost: x\r\n\r\n"))
            .await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(tag_of(&response), Some("status"));
    }

    #[tokio::test]
    async fn missing_route_synthesizes_404() {
        let dispatcher = Dispatcher::builder().build();
        let response = dispatcher
            .dispatch(request("GET /missing HTTP/1.1\r\nHost: x\r\n\r\n"))
            .await;
        assert_eq!(response.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn filter_short_circuits_routing() {
        let routed = Arc::new(AtomicUsize::new(0));
        let routed_probe = routed.clone();

        let dispatcher = Dispatcher::builder()
            .route(
                Binding::get("/guarded", move |_req: Arc<Request>, _p: PathParams| {
                    let routed = routed_probe.clone();
                    async move {
                        routed.fetch_add(1, Ordering::SeqCst);
                        Ok::<Response, HandlerError>(Response::new(StatusCode::Ok))
                    }
                })
                .unwrap(),
            )
            .unwrap()
            .filter(|_req: Arc<Request>| async move {
                Some(Response::new(StatusCode::Forbidden).header("x-tag", "filtered"))
            })
            .build();

        let response = dispatcher
            .dispatch(request("GET /guarded HTTP/1.1\r\nHost: x\r\n\r\n"))
            .await;
        assert_eq!(response.status(), StatusCode::Forbidden);
        assert_eq!(tag_of(&response), Some("filtered"));
        assert_eq!(routed.load(Ordering::SeqCst), 0, "routing must be skipped");
    }

    #[tokio::test]
    async fn first_rewrite_wins_and_does_not_chain() {
        let dispatcher = Dispatcher::builder()
            .route(Binding::get("/new", ok_handler("rewritten")).unwrap())
            .unwrap()
            .rewrite(|req: Arc<Request>| async move {
                (req.path() == "/old").then(|| req.with_target("/new").unwrap())
            })
            .rewrite(|req: Arc<Request>| async move {
                // Would redirect again if rewrites chained.
                (req.path() == "/new").then(|| req.with_target("/other").unwrap())
            })
            .build();

        let response = dispatcher
            .dispatch(request("GET /old HTTP/1.1\r\nHost: x\r\n\r\n"))
            .await;
        assert_eq!(tag_of(&response), Some("rewritten"));
    }

    #[tokio::test]
    async fn handler_error_becomes_500() {
        let dispatcher = Dispatcher::builder()
            .route(
                Binding::get("/boom", |_req: Arc<Request>, _p: PathParams| async move {
                    Err::<Response, HandlerError>(HandlerError::with_detail(
                        "database unavailable",
                        "connect refused on 5432",
                    ))
                })
                .unwrap(),
            )
            .unwrap()
            .build();

        let response = dispatcher
            .dispatch(request("GET /boom HTTP/1.1\r\nHost: x\r\n\r\n"))
            .await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
        let body = std::str::from_utf8(response.body_bytes().unwrap()).unwrap();
        assert!(body.contains("database unavailable"));
        assert!(
            !body.contains("5432"),
            "detail must stay hidden unless exposed"
        );
    }

    #[tokio::test]
    async fn custom_error_route_handles_404() {
        let dispatcher = Dispatcher::builder()
            .error_route(
                ErrorBinding::new(StatusCode::NotFound, "/{rest}", |_req: Arc<Request>,
                 fault: Fault| async move {
                    Ok::<Response, HandlerError>(
                        Response::new(StatusCode::NotFound)
                            .header("x-tag", "custom-404")
                            .body(fault.reason),
                    )
                })
                .unwrap(),
            )
            .build();

        let response = dispatcher
            .dispatch(request("GET /nope HTTP/1.1\r\nHost: x\r\n\r\n"))
            .await;
        assert_eq!(tag_of(&response), Some("custom-404"));
    }

    #[tokio::test]
    async fn auth_flags_without_authorizer_yield_401() {
        let auth = AuthFlags {
            bearer: true,
            ..AuthFlags::default()
        };
        let secured = Dispatcher::builder()
            .route(Binding::get("/secret", ok_handler("secret")).unwrap().auth(auth))
            .unwrap()
            .build();

        let response = secured
            .dispatch(request("GET /secret HTTP/1.1\r\nHost: x\r\n\r\n"))
            .await;
        assert_eq!(response.status(), StatusCode::Unauthorized);
    }

    #[tokio::test]
    async fn authorizer_grants_access() {
        let auth = AuthFlags {
            bearer: true,
            ..AuthFlags::default()
        };
        let dispatcher = Dispatcher::builder()
            .route(Binding::get("/secret", ok_handler("secret")).unwrap().auth(auth))
            .unwrap()
            .authorizer(|req: &Request, _required: AuthFlags| {
                req.header("authorization") == Some("Bearer let-me-in")
            })
            .build();

        let denied = dispatcher
            .dispatch(request("GET /secret HTTP/1.1\r\nHost: x\r\n\r\n"))
            .await;
        assert_eq!(denied.status(), StatusCode::Unauthorized);

        let granted = dispatcher
            .dispatch(request(
                "GET /secret HTTP/1.1\r\nHost: x\r\nAuthorization: Bearer let-me-in\r\n\r\n",
            ))
            .await;
        assert_eq!(granted.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn events_fire_around_dispatch() {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let req_tx = tx.clone();
        let resp_tx = tx.clone();
        let err_tx = tx;
        let dispatcher = Dispatcher::builder()
            .subscribe_request_log(move |event: Arc<RequestReceived>| {
                let tx = req_tx.clone();
                async move {
                    let _ = tx.send(format!("request {}", event.request.target()));
                    Ok::<(), CallbackError>(())
                }
            })
            .subscribe_response_log(move |event: Arc<ResponseSent>| {
                let tx = resp_tx.clone();
                async move {
                    let _ = tx.send(format!("response {}", event.status.code()));
                    Ok::<(), CallbackError>(())
                }
            })
            .subscribe_error_log(move |event: Arc<ErrorOccurred>| {
                let tx = err_tx.clone();
                async move {
                    let _ = tx.send(format!("error {}", event.fault.code));
                    Ok::<(), CallbackError>(())
                }
            })
            .build();

        let response = dispatcher
            .dispatch(request("GET /absent HTTP/1.1\r\nHost: x\r\n\r\n"))
            .await;
        assert_eq!(response.status(), StatusCode::NotFound);

        let mut seen = Vec::new();
        for _ in 0..3 {
            let message = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("event should arrive")
                .expect("channel open");
            seen.push(message);
        }

        // The request event is awaited inline, before any outcome.
        assert_eq!(seen[0], "request /absent");
        assert!(seen.contains(&"response 404".to_string()));
        assert!(seen.contains(&"error NOT_FOUND".to_string()));
    }
}
