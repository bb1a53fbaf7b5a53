//! The route registry and its deterministic resolution rules.

use crate::{
    errors::{Fault, HandlerError},
    http::{
        accept::AcceptList,
        request::Request,
        response::Response,
        types::{Host, MediaType, Method, StatusCode},
    },
    routing::{
        host::HostPattern,
        template::{PathParams, TemplateError, UriTemplate},
    },
    BoxFuture,
};
use std::{
    fmt,
    future::Future,
    sync::{Arc, PoisonError, RwLock},
};

/// An async request handler bound to a route.
///
/// Implemented for any `Fn(Arc<Request>, PathParams) -> impl Future` closure
/// returning `Result<Response, HandlerError>`, so handlers register as plain
/// async closures. An `Err` is converted into a 500 page at the dispatch
/// boundary, it never tears down the connection.
pub trait RouteHandler: Send + Sync + 'static {
    fn call(
        &self,
        request: Arc<Request>,
        params: PathParams,
    ) -> BoxFuture<Result<Response, HandlerError>>;
}

impl<F, Fut> RouteHandler for F
where
    F: Fn(Arc<Request>, PathParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, HandlerError>> + Send + 'static,
{
    fn call(
        &self,
        request: Arc<Request>,
        params: PathParams,
    ) -> BoxFuture<Result<Response, HandlerError>> {
        Box::pin(self(request, params))
    }
}

/// A handler for failed requests, registered per status code.
///
/// Receives the request together with the resolved [`Fault`] (status,
/// reason, optional detail). Its own failure falls back to the generated
/// error page.
pub trait ErrorHandler: Send + Sync + 'static {
    fn call(
        &self,
        request: Arc<Request>,
        fault: Fault,
    ) -> BoxFuture<Result<Response, HandlerError>>;
}

impl<F, Fut> ErrorHandler for F
where
    F: Fn(Arc<Request>, Fault) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, HandlerError>> + Send + 'static,
{
    fn call(
        &self,
        request: Arc<Request>,
        fault: Fault,
    ) -> BoxFuture<Result<Response, HandlerError>> {
        Box::pin(self(request, fault))
    }
}

/// Per-route authorization requirements. Each flag independently demands
/// that the configured [`Authorizer`](crate::pipeline::Authorizer) accepts
/// the request before the handler runs; with all flags off the route is
/// public.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthFlags {
    pub basic: bool,
    pub bearer: bool,
    pub api_key: bool,
    pub session: bool,
}

impl AuthFlags {
    pub const fn any(&self) -> bool {
        self.basic || self.bearer || self.api_key || self.session
    }
}

/// What to do when a registration collides with an existing binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplacePolicy {
    /// Reject the second registration with
    /// [`RegisterError::DuplicateRoute`]. The default.
    #[default]
    Fail,
    /// Silently supersede the earlier binding.
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    /// A binding with the same (host, method, template, content type) key
    /// already exists and the policy was [`ReplacePolicy::Fail`].
    #[error("duplicate route: {0}")]
    DuplicateRoute(String),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Why resolution produced no handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMiss {
    /// Nothing matched the host, method and path. Becomes a 404.
    NoRoute,
    /// The path matched but no registered representation satisfies the
    /// client's `Accept` list. Becomes a 406.
    NoAcceptableType,
}

/// A registered route: matching key, auth requirements and handler.
pub struct Binding {
    host: HostPattern,
    method: Method,
    template: UriTemplate,
    content_type: Option<MediaType>,
    auth: AuthFlags,
    handler: Arc<dyn RouteHandler>,
}

impl Binding {
    /// Creates a binding for any host with no content type and no auth
    /// requirements; refine with the builder methods below.
    pub fn new(
        method: Method,
        template: &str,
        handler: impl RouteHandler,
    ) -> Result<Self, RegisterError> {
        Ok(Self {
            host: HostPattern::Any,
            method,
            template: UriTemplate::parse(template)?,
            content_type: None,
            auth: AuthFlags::default(),
            handler: Arc::new(handler),
        })
    }

    pub fn get(template: &str, handler: impl RouteHandler) -> Result<Self, RegisterError> {
        Self::new(Method::Get, template, handler)
    }

    pub fn post(template: &str, handler: impl RouteHandler) -> Result<Self, RegisterError> {
        Self::new(Method::Post, template, handler)
    }

    pub fn put(template: &str, handler: impl RouteHandler) -> Result<Self, RegisterError> {
        Self::new(Method::Put, template, handler)
    }

    pub fn delete(template: &str, handler: impl RouteHandler) -> Result<Self, RegisterError> {
        Self::new(Method::Delete, template, handler)
    }

    pub fn host(mut self, host: HostPattern) -> Self {
        self.host = host;
        self
    }

    /// The representation this binding produces, negotiated against the
    /// request's `Accept` list. A binding without one matches any request
    /// as a fallback.
    pub fn content_type(mut self, media: MediaType) -> Self {
        self.content_type = Some(media);
        self
    }

    pub fn auth(mut self, flags: AuthFlags) -> Self {
        self.auth = flags;
        self
    }

    fn same_key(&self, other: &Self) -> bool {
        self.host == other.host
            && self.method == other.method
            && self.template == other.template
            && self.content_type == other.content_type
    }

    fn key(&self) -> String {
        match &self.content_type {
            Some(media) => format!(
                "{} {} [{media}] on {:?}",
                self.method, self.template, self.host
            ),
            None => format!("{} {} on {:?}", self.method, self.template, self.host),
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("host", &self.host)
            .field("method", &self.method)
            .field("template", &self.template.as_str())
            .field("content_type", &self.content_type)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

/// A registered error route: matched like a [`Binding`] plus an exact
/// status code.
pub struct ErrorBinding {
    host: HostPattern,
    template: UriTemplate,
    method: Option<Method>,
    content_type: Option<MediaType>,
    status: StatusCode,
    handler: Arc<dyn ErrorHandler>,
}

impl ErrorBinding {
    pub fn new(
        status: StatusCode,
        template: &str,
        handler: impl ErrorHandler,
    ) -> Result<Self, RegisterError> {
        Ok(Self {
            host: HostPattern::Any,
            template: UriTemplate::parse(template)?,
            method: None,
            content_type: None,
            status,
            handler: Arc::new(handler),
        })
    }

    pub fn host(mut self, host: HostPattern) -> Self {
        self.host = host;
        self
    }

    /// Restricts the error route to one method; without it any method
    /// matches.
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn content_type(mut self, media: MediaType) -> Self {
        self.content_type = Some(media);
        self
    }
}

impl fmt::Debug for ErrorBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorBinding")
            .field("host", &self.host)
            .field("template", &self.template.as_str())
            .field("method", &self.method)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// A successful resolution: the handler plus everything the dispatch layer
/// needs around its invocation.
#[derive(Clone)]
pub struct RouteMatch {
    pub handler: Arc<dyn RouteHandler>,
    pub params: PathParams,
    pub auth: AuthFlags,
    pub content_type: Option<MediaType>,
    /// The winning template, for diagnostics.
    pub template: String,
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("params", &self.params)
            .field("auth", &self.auth)
            .field("content_type", &self.content_type)
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct TableState {
    bindings: Vec<Binding>,
    error_bindings: Vec<ErrorBinding>,
}

/// The route registry.
///
/// Registration takes the write lock; resolution works against a read
/// snapshot and can never observe a half-inserted binding. The expected
/// pattern is registration at startup and read-mostly traffic afterwards,
/// but interleaving stays race-free.
#[derive(Default)]
pub struct RoutingTable {
    state: RwLock<TableState>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a binding. An identical (host, method, template, content
    /// type) key fails under [`ReplacePolicy::Fail`] and supersedes under
    /// [`ReplacePolicy::Replace`].
    pub fn register(&self, binding: Binding, policy: ReplacePolicy) -> Result<(), RegisterError> {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(index) = state.bindings.iter().position(|b| b.same_key(&binding)) {
            return match policy {
                ReplacePolicy::Fail => Err(RegisterError::DuplicateRoute(binding.key())),
                ReplacePolicy::Replace => {
                    state.bindings[index] = binding;
                    Ok(())
                }
            };
        }

        state.bindings.push(binding);
        Ok(())
    }

    pub fn register_error_handler(&self, binding: ErrorBinding) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .error_bindings
            .push(binding);
    }

    pub fn route_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .bindings
            .len()
    }

    /// Resolves the single handler for a request, walking host tiers from
    /// most to least specific. Within a tier the template with the most
    /// literal segments wins, ties break by registration order, and the
    /// representation is negotiated against the `Accept` list last.
    pub fn resolve(
        &self,
        host: &Host,
        method: Method,
        path: &[&str],
        accept: &AcceptList,
    ) -> Result<RouteMatch, RouteMiss> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);

        for tier in 0..=3 {
            let mut best: Option<(usize, usize)> = None;
            for (index, binding) in state.bindings.iter().enumerate() {
                if binding.host.tier() != tier
                    || !binding.host.matches(host)
                    || binding.method != method
                    || binding.template.matches(path).is_none()
                {
                    continue;
                }

                let literals = binding.template.literal_count();
                let improves = match best {
                    None => true,
                    Some((best_literals, _)) => literals > best_literals,
                };
                if improves {
                    best = Some((literals, index));
                }
            }

            let Some((_, winner)) = best else { continue };
            let template = state.bindings[winner].template.clone();

            let candidates: Vec<&Binding> = state
                .bindings
                .iter()
                .filter(|b| {
                    b.host.tier() == tier
                        && b.host.matches(host)
                        && b.method == method
                        && b.template == template
                })
                .collect();

            let chosen = negotiate(&candidates, accept).ok_or(RouteMiss::NoAcceptableType)?;
            let params = chosen.template.matches(path).unwrap_or_default();

            return Ok(RouteMatch {
                handler: chosen.handler.clone(),
                params,
                auth: chosen.auth,
                content_type: chosen.content_type.clone(),
                template: chosen.template.as_str().to_string(),
            });
        }

        Err(RouteMiss::NoRoute)
    }

    /// Resolves a custom error handler. Narrowing mirrors
    /// [`resolve`](RoutingTable::resolve) with an exact status match on
    /// top; no match means the generated page is used.
    pub fn resolve_error(
        &self,
        host: &Host,
        method: Method,
        path: &[&str],
        status: StatusCode,
        accept: &AcceptList,
    ) -> Option<Arc<dyn ErrorHandler>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);

        for tier in 0..=3 {
            let mut best: Option<(usize, &ErrorBinding)> = None;
            for binding in &state.error_bindings {
                if binding.host.tier() != tier
                    || !binding.host.matches(host)
                    || binding.status != status
                    || binding.method.is_some_and(|m| m != method)
                    || binding.template.matches(path).is_none()
                {
                    continue;
                }
                if let Some(media) = &binding.content_type {
                    if !accept.accepts(media) {
                        continue;
                    }
                }

                let literals = binding.template.literal_count();
                let improves = match best {
                    None => true,
                    Some((best_literals, _)) => literals > best_literals,
                };
                if improves {
                    best = Some((literals, binding));
                }
            }

            if let Some((_, binding)) = best {
                return Some(binding.handler.clone());
            }
        }

        None
    }
}

fn negotiate<'a>(candidates: &[&'a Binding], accept: &AcceptList) -> Option<&'a Binding> {
    if accept.is_empty() {
        // No Accept header means anything goes: prefer the untyped
        // fallback, else the first registered representation.
        return candidates
            .iter()
            .find(|b| b.content_type.is_none())
            .or_else(|| candidates.first())
            .copied();
    }

    for range in accept.ranges() {
        for binding in candidates {
            if let Some(media) = &binding.content_type {
                if range.matches(media) {
                    return Some(binding);
                }
            }
        }
    }

    candidates.iter().find(|b| b.content_type.is_none()).copied()
}
