use crate::{
    errors,
    limits::{ConnLimits, ReqLimits, RespLimits, ServerLimits, WaitStrategy},
    pipeline::Dispatcher,
    server::connection::HttpConnection,
};
use crossbeam::queue::SegQueue;
use std::{net::SocketAddr, sync::Arc};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    task::yield_now,
    time::{sleep as tokio_sleep, timeout},
};

/// The accept layer: listens, queues connections and feeds a fixed pool of
/// protocol workers.
///
/// Workers are spawned once at build time and reused across connections;
/// the queue decouples acceptance from processing. When it overflows,
/// dedicated tasks answer with an immediate 503.
///
/// # Examples
///
/// ```no_run
/// use portal_web::{Binding, Dispatcher, PathParams, Request, Response, Server, StatusCode};
/// use std::sync::Arc;
/// use tokio::net::TcpListener;
///
/// #[tokio::main]
/// async fn main() {
///     let dispatcher = Dispatcher::builder()
///         .route(Binding::get("/status", |_req: Arc<Request>, _params: PathParams| async move {
///             Ok(Response::new(StatusCode::Ok)
///                 .header("content-type", "application/json")
///                 .body(r#"{"ok":true}"#))
///         }).unwrap())
///         .unwrap()
///         .build();
///
///     Server::builder()
///         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
///         .dispatcher(dispatcher)
///         .build()
///         .launch()
///         .await;
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    stream_queue: TcpQueue,
    error_queue: TcpQueue,
    server_limits: ServerLimits,
}

impl Server {
    /// Creates a new builder for configuring the server instance.
    pub fn builder() -> ServerBuilder {
        ServerBuilder {
            listener: None,
            dispatcher: None,

            server_limits: None,
            connection_limits: None,
            request_limits: None,
            response_limits: None,
        }
    }

    /// Accepts connections forever, feeding the worker queue. Overflow
    /// goes to the 503 queue instead.
    pub async fn launch(self) {
        loop {
            let Ok(value) = self.listener.accept().await else {
                continue;
            };

            match self.stream_queue.len() < self.server_limits.max_pending_connections {
                true => self.stream_queue.push(value),
                false => self.error_queue.push(value),
            }
        }
    }

    async fn next_stream(queue: &TcpQueue, wait: &WaitStrategy) -> (TcpStream, SocketAddr) {
        loop {
            if let Some(value) = queue.pop() {
                return value;
            }

            match wait {
                WaitStrategy::Yield => yield_now().await,
                WaitStrategy::Sleep(time) => tokio_sleep(*time).await,
            }
        }
    }
}

/// Builder for [`Server`] instances.
pub struct ServerBuilder {
    listener: Option<TcpListener>,
    dispatcher: Option<Arc<Dispatcher>>,

    server_limits: Option<ServerLimits>,
    connection_limits: Option<ConnLimits>,
    request_limits: Option<ReqLimits>,
    response_limits: Option<RespLimits>,
}

impl ServerBuilder {
    /// Sets the TCP listener the server accepts connections from.
    ///
    /// **This is a required component.**
    pub fn listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Sets the engine that answers framed requests.
    ///
    /// **This is a required component.**
    pub fn dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(Arc::new(dispatcher));
        self
    }

    /// Configures concurrency and queueing behavior.
    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.server_limits = Some(limits);
        self
    }

    /// Configures per-connection timeouts and lifetimes.
    pub fn connection_limits(mut self, limits: ConnLimits) -> Self {
        self.connection_limits = Some(limits);
        self
    }

    /// Configures request parsing limits.
    pub fn request_limits(mut self, limits: ReqLimits) -> Self {
        self.request_limits = Some(limits);
        self
    }

    /// Configures response serialization limits.
    pub fn response_limits(mut self, limits: RespLimits) -> Self {
        self.response_limits = Some(limits);
        self
    }

    /// Finalizes the builder, spawning the worker pool.
    ///
    /// # Panics
    ///
    /// Panics when [`listener`](Self::listener) or
    /// [`dispatcher`](Self::dispatcher) was not called.
    #[track_caller]
    pub fn build(self) -> Server {
        let listener = self
            .listener
            .expect("the `listener` method must be called to create");
        let dispatcher = self
            .dispatcher
            .expect("the `dispatcher` method must be called to create");
        let limits: AllLimits = (
            self.server_limits.unwrap_or_default(),
            self.connection_limits.unwrap_or_default(),
            self.request_limits.unwrap_or_default(),
            self.response_limits.unwrap_or_default(),
        );

        let stream_queue: TcpQueue = Arc::new(SegQueue::new());
        let error_queue: TcpQueue = Arc::new(SegQueue::new());

        for _ in 0..limits.0.max_connections {
            Self::spawn_worker(&stream_queue, &limits, &dispatcher);
        }
        if limits.0.count_503_handlers != 0 {
            for _ in 0..limits.0.count_503_handlers {
                Self::spawn_alarmist(&error_queue, &limits);
            }
        } else {
            Self::spawn_quiet_alarmist(&error_queue, &limits);
        }

        Server {
            listener,
            stream_queue,
            error_queue,
            server_limits: limits.0,
        }
    }

    fn spawn_worker(queue: &TcpQueue, limits: &AllLimits, dispatcher: &Arc<Dispatcher>) {
        let queue = queue.clone();
        let wait = limits.0.wait_strategy.clone();
        let mut connection = HttpConnection::new(dispatcher.clone(), limits);

        tokio::spawn(async move {
            loop {
                let (mut stream, addr) = Server::next_stream(&queue, &wait).await;
                tracing::debug!(client = %addr, "connection accepted");

                if let Err(error) = connection.run(&mut stream).await {
                    tracing::debug!(client = %addr, %error, "connection ended with io error");
                }
            }
        });
    }

    fn spawn_alarmist(queue: &TcpQueue, limits: &AllLimits) {
        let queue = queue.clone();
        let wait = limits.0.wait_strategy.clone();
        let write_timeout = limits.1.socket_write_timeout;

        tokio::spawn(async move {
            loop {
                let (mut stream, addr) = Server::next_stream(&queue, &wait).await;
                tracing::debug!(client = %addr, "admission queue full, answering 503");

                let _ = timeout(write_timeout, stream.write_all(errors::OVERLOAD_PAGE)).await;
            }
        });
    }

    fn spawn_quiet_alarmist(queue: &TcpQueue, limits: &AllLimits) {
        let queue = queue.clone();
        let wait = limits.0.wait_strategy.clone();

        tokio::spawn(async move {
            loop {
                let (stream, _) = Server::next_stream(&queue, &wait).await;

                drop(stream);
            }
        });
    }
}

type TcpQueue = Arc<SegQueue<(TcpStream, SocketAddr)>>;
pub(crate) type AllLimits = (ServerLimits, ConnLimits, ReqLimits, RespLimits);
