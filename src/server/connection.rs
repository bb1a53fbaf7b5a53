use crate::{
    errors::{self, Fault, FrameError},
    http::{
        request::Request,
        response::{Body, Response},
        types::Version,
    },
    limits::{ConnLimits, ReqLimits, RespLimits},
    pipeline::Dispatcher,
    server::{framing::FrameScanner, server_impl::AllLimits},
};
use std::{io, sync::Arc, time::Instant};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    time::{timeout, timeout_at, Instant as TokioInstant},
};

/// One connection's protocol loop: frame a request, dispatch it, write the
/// response, repeat until the peer or a policy says stop.
///
/// Workers reuse one instance across connections; buffers survive via
/// [`FrameScanner::reset`].
pub(crate) struct HttpConnection {
    dispatcher: Arc<Dispatcher>,
    scanner: FrameScanner,

    conn_limits: ConnLimits,
    req_limits: ReqLimits,
    resp_limits: RespLimits,

    created: Instant,
    served: usize,
}

enum ReadOutcome {
    Request(Request),
    /// Peer closed, errored or timed out before a complete frame. Ends the
    /// connection without an HTTP response.
    Transport,
    /// Malformed bytes. The request is present when the head parsed far
    /// enough to negotiate the error page.
    Fault(FrameError, Option<Request>),
}

impl HttpConnection {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>, limits: &AllLimits) -> Self {
        Self {
            dispatcher,
            scanner: FrameScanner::new(),

            conn_limits: limits.1.clone(),
            req_limits: limits.2.clone(),
            resp_limits: limits.3.clone(),

            created: Instant::now(),
            served: 0,
        }
    }

    pub(crate) async fn run<S>(&mut self, stream: &mut S) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        self.created = Instant::now();
        self.served = 0;

        loop {
            if self.expired() {
                break;
            }
            self.scanner.reset();

            match self.read_request(stream).await {
                ReadOutcome::Request(request) => {
                    let version = request.version();
                    let request_close = !request.is_keep_alive();

                    let response = self.dispatcher.dispatch(request).await;

                    // Close on explicit request only; an error status by
                    // itself does not end the connection.
                    let close = request_close
                        || response.close_requested()
                        || response.unbounded_stream();

                    self.write_response(stream, response, version, close).await?;
                    self.served += 1;

                    if close {
                        break;
                    }
                }
                ReadOutcome::Transport => break,
                ReadOutcome::Fault(error, request) => {
                    tracing::debug!(%error, "framing fault");
                    self.dispatcher.notify_framing_fault(Fault::from(&error));

                    let page = self.framing_page(&error, request.as_ref());
                    self.write_response(stream, page, Version::Http11, true)
                        .await?;
                    break;
                }
            }
        }

        Ok(())
    }

    fn expired(&self) -> bool {
        self.served >= self.conn_limits.max_requests_per_connection
            || self.created.elapsed() > self.conn_limits.connection_lifetime
    }

    fn framing_page(&self, error: &FrameError, request: Option<&Request>) -> Response {
        let fault = Fault::from(error);
        let page = match request {
            Some(request) => errors::render(
                &fault,
                Some(request.accept()),
                Some(&request.request_line()),
                self.dispatcher.detail_exposed(),
            ),
            None => errors::render(&fault, None, None, self.dispatcher.detail_exposed()),
        };
        page.close()
    }
}

// Reading
impl HttpConnection {
    /// Frames one request: header block through the boundary state
    /// machine, then exactly the declared number of body bytes. One read
    /// deadline covers the whole frame.
    async fn read_request<S>(&mut self, stream: &mut S) -> ReadOutcome
    where
        S: AsyncRead + Unpin,
    {
        let deadline = TokioInstant::now() + self.conn_limits.socket_read_timeout;

        while self.scanner.scan().is_none() {
            if self.scanner.len() > self.req_limits.header_block_size {
                return ReadOutcome::Fault(FrameError::HeaderBlockTooLarge, None);
            }
            match timeout_at(deadline, stream.read_buf(self.scanner.space())).await {
                Ok(Ok(0)) => return ReadOutcome::Transport,
                Ok(Ok(_)) => {}
                Ok(Err(error)) => {
                    tracing::debug!(%error, "socket read failed");
                    return ReadOutcome::Transport;
                }
                Err(_) => {
                    tracing::debug!("read timed out before a complete frame");
                    return ReadOutcome::Transport;
                }
            }
        }

        let mut request = match Request::parse(
            self.scanner.header_block(),
            &self.req_limits,
            self.dispatcher.server_name(),
        ) {
            Ok(request) => request,
            Err(error) => return ReadOutcome::Fault(error, None),
        };

        let declared = request.content_length().unwrap_or(0);
        while self.scanner.body_available() < declared {
            match timeout_at(deadline, stream.read_buf(self.scanner.space())).await {
                Ok(Ok(0)) => return ReadOutcome::Transport,
                Ok(Ok(_)) => {}
                Ok(Err(error)) => {
                    tracing::debug!(%error, "socket read failed");
                    return ReadOutcome::Transport;
                }
                Err(_) => {
                    tracing::debug!("read timed out inside the body");
                    return ReadOutcome::Transport;
                }
            }
        }

        // Pipelined or stray bytes past the declared length are rejected:
        // one request is in flight per connection.
        if self.scanner.body_available() > declared {
            return ReadOutcome::Fault(FrameError::BodyMismatch, Some(request));
        }
        if declared > 0 {
            request.set_body(self.scanner.take_body(declared));
        }

        ReadOutcome::Request(request)
    }
}

// Writing
impl HttpConnection {
    async fn write_response<S>(
        &mut self,
        stream: &mut S,
        response: Response,
        version: Version,
        close: bool,
    ) -> io::Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        let head = response.encode_head(version, self.dispatcher.server_name(), close);
        self.write_all_timed(stream, &head).await?;

        match response.into_body() {
            Body::Empty => {}
            Body::Bytes(bytes) => self.write_all_timed(stream, &bytes).await?,
            Body::Stream { mut reader, length } => {
                let mut buf = vec![0u8; self.resp_limits.stream_chunk_size];
                let mut remaining = length;

                loop {
                    let want = match remaining {
                        Some(0) => break,
                        Some(left) => buf.len().min(usize::try_from(left).unwrap_or(buf.len())),
                        None => buf.len(),
                    };

                    let read = match timeout(
                        self.conn_limits.socket_write_timeout,
                        reader.read(&mut buf[..want]),
                    )
                    .await
                    {
                        Ok(result) => result?,
                        Err(_) => {
                            return Err(io::Error::new(
                                io::ErrorKind::TimedOut,
                                "body stream read timeout",
                            ))
                        }
                    };

                    if read == 0 {
                        if remaining.is_some() {
                            return Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "body stream ended before its declared length",
                            ));
                        }
                        break;
                    }

                    self.write_all_timed(stream, &buf[..read]).await?;
                    if let Some(left) = remaining {
                        remaining = Some(left - read as u64);
                    }
                }
            }
        }

        match timeout(self.conn_limits.socket_write_timeout, stream.flush()).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "socket write timeout")),
        }
    }

    async fn write_all_timed<S>(&self, stream: &mut S, bytes: &[u8]) -> io::Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        match timeout(self.conn_limits.socket_write_timeout, stream.write_all(bytes)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "socket write timeout")),
        }
    }
}
