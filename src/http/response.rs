use crate::http::types::{Header, StatusCode, Version};
use std::fmt;
use tokio::io::AsyncRead;

/// The payload of a [`Response`].
pub enum Body {
    Empty,
    /// In-memory bytes, written in one piece. `content-length` is derived
    /// from the buffer.
    Bytes(Vec<u8>),
    /// A streamed source, copied through with a bounded per-chunk timeout.
    /// Without a declared length the connection is closed after the copy,
    /// since nothing else delimits the message.
    Stream {
        reader: Box<dyn AsyncRead + Send + Unpin>,
        length: Option<u64>,
    },
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Bytes(bytes) => write!(f, "Body::Bytes({} bytes)", bytes.len()),
            Body::Stream { length, .. } => write!(f, "Body::Stream(length: {length:?})"),
        }
    }
}

/// An HTTP response under construction.
///
/// Built fluently by handlers and consumed by the connection layer:
///
/// ```
/// use portal_web::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("content-type", "application/json")
///     .body(r#"{"ok":true}"#);
/// assert_eq!(response.status(), StatusCode::Ok);
/// ```
///
/// PLEASE DO NOT ADD THE FOLLOWING HEADERS YOURSELF:
/// - `content-length` - derived from the body
/// - `connection` - use [`close()`](Response::close)
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Vec<Header>,
    body: Body,
    close: bool,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Body::Empty,
            close: false,
        }
    }

    /// Appends a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    /// Sets an in-memory body.
    pub fn body(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.body = Body::Bytes(data.into());
        self
    }

    /// Sets a streamed body. With `length` present it becomes the
    /// `content-length`; without it the connection closes after the copy.
    pub fn stream(
        mut self,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        length: Option<u64>,
    ) -> Self {
        self.body = Body::Stream { reader, length };
        self
    }

    /// Forces the connection to close after this response.
    pub fn close(mut self) -> Self {
        self.close = true;
        self
    }

    pub const fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// The in-memory body, if there is one. Returns `None` for streams.
    pub fn body_bytes(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Empty => Some(&[]),
            Body::Bytes(bytes) => Some(bytes),
            Body::Stream { .. } => None,
        }
    }

    pub(crate) const fn close_requested(&self) -> bool {
        self.close
    }

    /// True when the message itself cannot be delimited for reuse.
    pub(crate) const fn unbounded_stream(&self) -> bool {
        matches!(
            self.body,
            Body::Stream { length: None, .. }
        )
    }

    pub(crate) fn into_body(self) -> Body {
        self.body
    }

    /// Serializes the status line and header block, including the derived
    /// `content-length` and `connection` headers. `close` is the final
    /// per-connection decision, which may come from the request side.
    pub(crate) fn encode_head(&self, version: Version, server_name: &str, close: bool) -> Vec<u8> {
        let mut head = Vec::with_capacity(256);
        head.extend_from_slice(self.status.into_first_line(version));

        if !self.has_header("server") && !server_name.is_empty() {
            push_header(&mut head, "server", server_name);
        }
        for header in &self.headers {
            push_header(&mut head, &header.name, &header.value);
        }

        match &self.body {
            Body::Empty => push_header(&mut head, "content-length", "0"),
            Body::Bytes(bytes) => {
                push_header(&mut head, "content-length", &bytes.len().to_string())
            }
            Body::Stream {
                length: Some(length),
                ..
            } => push_header(&mut head, "content-length", &length.to_string()),
            Body::Stream { length: None, .. } => {}
        }

        match (version, close) {
            (Version::Http11, true) => push_header(&mut head, "connection", "close"),
            (Version::Http11, false) => {}
            (Version::Http10, true) => push_header(&mut head, "connection", "close"),
            (Version::Http10, false) => push_header(&mut head, "connection", "keep-alive"),
        }

        head.extend_from_slice(b"\r\n");
        head
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h.name.eq_ignore_ascii_case(name))
    }
}

#[inline]
fn push_header(head: &mut Vec<u8>, name: &str, value: &str) {
    head.extend_from_slice(name.as_bytes());
    head.extend_from_slice(b": ");
    head.extend_from_slice(value.as_bytes());
    head.extend_from_slice(b"\r\n");
}

#[cfg(test)]
mod response_self {
    use super::*;

    fn head_str(response: &Response, version: Version, close: bool) -> String {
        String::from_utf8(response.encode_head(version, "portal_web", close)).unwrap()
    }

    #[test]
    fn head_for_bytes_body() {
        let response = Response::new(StatusCode::Ok)
            .header("content-type", "text/plain")
            .body("hello");
        let head = head_str(&response, Version::Http11, false);

        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("server: portal_web\r\n"));
        assert!(head.contains("content-type: text/plain\r\n"));
        assert!(head.contains("content-length: 5\r\n"));
        assert!(!head.contains("connection:"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[test]
    fn head_for_empty_body() {
        let response = Response::new(StatusCode::NoContent);
        let head = head_str(&response, Version::Http11, false);
        assert!(head.contains("content-length: 0\r\n"));
    }

    #[test]
    fn close_decision_writes_connection_header() {
        let response = Response::new(StatusCode::Ok).body("x");

        let closing = head_str(&response, Version::Http11, true);
        assert!(closing.contains("connection: close\r\n"));

        let legacy_reuse = head_str(&response, Version::Http10, false);
        assert!(legacy_reuse.contains("connection: keep-alive\r\n"));

        let legacy_close = head_str(&response, Version::Http10, true);
        assert!(legacy_close.contains("connection: close\r\n"));
    }

    #[test]
    fn stream_with_length_declares_it() {
        let reader = Box::new(tokio::io::empty());
        let response = Response::new(StatusCode::Ok).stream(reader, Some(1234));
        let head = head_str(&response, Version::Http11, false);

        assert!(head.contains("content-length: 1234\r\n"));
        assert!(!response.unbounded_stream());
    }

    #[test]
    fn stream_without_length_is_unbounded() {
        let reader = Box::new(tokio::io::empty());
        let response = Response::new(StatusCode::Ok).stream(reader, None);
        let head = head_str(&response, Version::Http11, true);

        assert!(!head.contains("content-length"));
        assert!(response.unbounded_stream());
    }

    #[test]
    fn custom_server_header_wins() {
        let response = Response::new(StatusCode::Ok).header("Server", "custom");
        let head = head_str(&response, Version::Http11, false);

        assert!(head.contains("Server: custom\r\n"));
        assert!(!head.contains("server: portal_web"));
    }
}
