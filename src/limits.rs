//! Server configuration limits and timeouts.
//!
//! # Security-First Defaults
//!
//! Default limits are intentionally conservative to prevent:
//! - Resource exhaustion attacks
//! - Slowloris attacks
//! - Header flooding
//!
//! All knobs are explicit construction-time values; nothing is read from
//! process-wide state.
//!
//! # Examples
//!
//! ```no_run
//! use portal_web::{limits::{ConnLimits, ReqLimits, ServerLimits}, Dispatcher, Server};
//! use tokio::net::TcpListener;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     Server::builder()
//!         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
//!         .dispatcher(Dispatcher::builder().build())
//!         .server_limits(ServerLimits {
//!             max_connections: 5000, // Higher concurrency
//!             ..ServerLimits::default()
//!         })
//!         .connection_limits(ConnLimits {
//!             socket_read_timeout: Duration::from_secs(5),
//!             max_requests_per_connection: 10_000,
//!             ..ConnLimits::default()
//!         })
//!         .request_limits(ReqLimits {
//!             header_count: 48,           // More headers for complex APIs
//!             body_size: 256 * 1024,      // Larger payloads
//!             ..ReqLimits::default()
//!         })
//!         .build()
//!         .launch()
//!         .await;
//! }
//! ```

use std::time::Duration;

/// Server-level concurrency and queueing behavior.
///
/// Accepted connections go through a shared admission queue drained by a
/// fixed pool of worker tasks, spawned once at startup. When the queue is
/// full, dedicated overload tasks answer new connections with a 503.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Maximum number of concurrent active connections being processed
    /// (default: `100`). Exactly this many worker tasks are created.
    pub max_connections: usize,

    /// Maximum number of TCP connections waiting in the admission queue
    /// (default: `250`). Overflowing connections receive an immediate 503.
    pub max_pending_connections: usize,

    /// Strategy for worker task waiting behavior (default: `Sleep(50us)`).
    ///
    /// Controls how workers wait when the admission queue is empty.
    /// Affects latency, CPU usage and throughput characteristics.
    pub wait_strategy: WaitStrategy,

    /// Dedicated tasks for queue overflow responses (default: `1`).
    ///
    /// Set to 0 to silently close overflowing connections instead (not
    /// recommended for production HTTP servers).
    pub count_503_handlers: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_pending_connections: 250,
            wait_strategy: WaitStrategy::Sleep(Duration::from_micros(50)),
            count_503_handlers: 1,

            _priv: (),
        }
    }
}

/// Strategy for worker task waiting when no connections are available.
#[derive(Debug, Clone)]
pub enum WaitStrategy {
    /// Spin on [`tokio::task::yield_now()`]. Lowest latency, close to a
    /// full core of busy-waiting; measure before choosing it.
    Yield,

    /// Sleep between polls via [`tokio::time::sleep()`].
    Sleep(Duration),
}

/// Connection-level limits and timeouts.
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Maximum wait for socket reads (default: `2 seconds`).
    ///
    /// Bounds both the wait for a complete header block and each body
    /// read. The primary defense against slowloris-style clients; a
    /// connection that stays silent past it is dropped without a response.
    pub socket_read_timeout: Duration,

    /// Maximum wait for each socket write (default: `3 seconds`).
    ///
    /// Applies to the head, in-memory bodies, and every chunk of a
    /// streamed body, so a stalled client cannot pin a worker.
    pub socket_write_timeout: Duration,

    /// Maximum requests served on one connection (default: `100`).
    ///
    /// The connection closes after this many requests, bounding per-client
    /// resource accumulation.
    pub max_requests_per_connection: usize,

    /// Maximum lifetime of a connection (default: `2 minutes`).
    ///
    /// The final safety net; typically `socket_read_timeout` or
    /// `max_requests_per_connection` triggers first.
    pub connection_lifetime: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ConnLimits {
    fn default() -> Self {
        Self {
            socket_read_timeout: Duration::from_secs(2),
            socket_write_timeout: Duration::from_secs(3),
            max_requests_per_connection: 100,
            connection_lifetime: Duration::from_secs(120),

            _priv: (),
        }
    }
}

/// Request parsing limits.
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Maximum size of the header block in bytes, request line included
    /// (default: `8 KiB`). Exceeding it answers 431.
    pub header_block_size: usize,

    /// Maximum number of header fields (default: `32`).
    pub header_count: usize,

    /// Maximum length of the request target, query included
    /// (default: `2048`). Exceeding it answers 414.
    pub url_size: usize,

    /// Maximum declared body size in bytes (default: `64 KiB`).
    /// A larger `Content-Length` answers 413 before any body byte is read.
    pub body_size: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            header_block_size: 8 * 1024,
            header_count: 32,
            url_size: 2048,
            body_size: 64 * 1024,

            _priv: (),
        }
    }
}

/// Response serialization limits.
#[derive(Debug, Clone)]
pub struct RespLimits {
    /// Chunk size for copying streamed bodies (default: `8 KiB`).
    pub stream_chunk_size: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for RespLimits {
    fn default() -> Self {
        Self {
            stream_chunk_size: 8 * 1024,

            _priv: (),
        }
    }
}
