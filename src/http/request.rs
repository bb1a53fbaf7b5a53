use crate::{
    errors::FrameError,
    http::{
        accept::AcceptList,
        types::{self, Header, HeaderMap, Host, MediaType, Method, Version},
    },
    limits::ReqLimits,
};

/// A parsed HTTP request, immutable once built.
///
/// # Input data requirements
///
/// The entire head must be `UTF-8` and use exactly `CRLF` line terminators.
/// Unlike RFC 9112, which tolerates a bare `LF` in some contexts, this parser
/// treats anything but `CRLF` as malformed. Binary payloads belong in the
/// body, which is read verbatim.
///
/// ## First line
///
/// ```text
/// [METHOD] SP [TARGET] SP "HTTP/1.1" CRLF
/// ```
///
/// **Contrary to the RFC**: two or more consecutive slashes in the path are
/// rejected with `400 Bad Request` rather than normalized.
///
/// ## Headers
///
/// ```text
/// [NAME]: [VALUE] CRLF
/// ```
///
/// Optional whitespace around the value is trimmed. Four headers carry
/// engine semantics and are parsed into typed fields (they also stay
/// visible in the plain header map):
///
/// | Header           | Parsed into                                  |
/// |------------------|----------------------------------------------|
/// | `Host`           | [`Host`] (name lower-cased, optional port)   |
/// | `Content-Length` | `Option<usize>`, bounded by request limits   |
/// | `Content-Type`   | [`MediaType`], `boundary` parameter retained |
/// | `Accept`         | [`AcceptList`], ordered by quality           |
///
/// `Connection` is interpreted for keep-alive semantics; values other than
/// `keep-alive` or `close` are rejected.
///
/// ## Body
///
/// Only explicit `Content-Length` bodies are supported. The connection layer
/// reads exactly that many bytes; a surplus or shortfall is a framing fault.
/// `Transfer-Encoding: chunked` and implicit-length bodies are not
/// supported.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: Method,
    target: String,
    path: String,
    query: Option<String>,
    segments: Vec<String>,
    version: Version,

    headers: HeaderMap,
    host: Host,
    content_type: Option<MediaType>,
    content_length: Option<usize>,
    accept: AcceptList,
    keep_alive: bool,

    body: Vec<u8>,
}

impl Request {
    /// Parses a complete header block (everything up to and including the
    /// blank line). The body is attached separately by the connection layer
    /// once the declared length has been read.
    ///
    /// `default_host` stands in for a missing `Host` header on HTTP/1.0
    /// requests; HTTP/1.1 requests without one are rejected.
    pub fn parse(
        block: &[u8],
        limits: &ReqLimits,
        default_host: &str,
    ) -> Result<Self, FrameError> {
        let text =
            simdutf8::basic::from_utf8(block).map_err(|_| FrameError::InvalidEncoding)?;

        let mut lines = text.split("\r\n");
        let first = lines.next().ok_or(FrameError::InvalidRequestLine)?;
        let (method, target, version, mut keep_alive) =
            Self::parse_request_line(first, limits)?;
        let (path, query, segments) = parse_target(&target, limits.url_size)?;

        let mut headers = HeaderMap::with_capacity(limits.header_count.min(32));
        let mut host = None;
        let mut content_type = None;
        let mut content_length = None;
        let mut accept = AcceptList::default();

        for line in lines {
            if line.is_empty() {
                break;
            }
            if headers.len() >= limits.header_count {
                return Err(FrameError::TooManyHeaders);
            }

            let (name, value) = parse_header_line(line)?;

            if name.eq_ignore_ascii_case("host") {
                if host.is_some() {
                    return Err(FrameError::InvalidHeader);
                }
                host = Some(Host::parse(value).ok_or(FrameError::InvalidHeader)?);
            } else if name.eq_ignore_ascii_case("content-length") {
                let length = types::slice_to_usize(value.as_bytes())
                    .ok_or(FrameError::InvalidContentLength)?;
                if content_length.is_some_and(|known| known != length) {
                    return Err(FrameError::InvalidContentLength);
                }
                if length > limits.body_size {
                    return Err(FrameError::BodyTooLarge);
                }
                content_length = Some(length);
            } else if name.eq_ignore_ascii_case("connection") {
                keep_alive = parse_connection(value)?;
            } else if name.eq_ignore_ascii_case("content-type") {
                content_type =
                    Some(MediaType::parse(value).ok_or(FrameError::InvalidHeader)?);
            } else if name.eq_ignore_ascii_case("accept") {
                accept = AcceptList::parse(value);
            }

            headers.push(Header::new(name, value));
        }

        let host = match host {
            Some(host) => host,
            None if version == Version::Http10 => Host::new(default_host, None),
            None => return Err(FrameError::MissingHost),
        };

        Ok(Self {
            method,
            target,
            path,
            query,
            segments,
            version,
            headers,
            host,
            content_type,
            content_length,
            accept,
            keep_alive,
            body: Vec::new(),
        })
    }

    fn parse_request_line(
        line: &str,
        limits: &ReqLimits,
    ) -> Result<(Method, String, Version, bool), FrameError> {
        if line.bytes().any(|b| b == b'\r' || b == b'\n') {
            return Err(FrameError::InvalidRequestLine);
        }

        let mut parts = line.split(' ');
        let method = parts.next().ok_or(FrameError::InvalidRequestLine)?;
        let target = parts.next().ok_or(FrameError::InvalidRequestLine)?;
        let version = parts.next().ok_or(FrameError::InvalidRequestLine)?;
        if parts.next().is_some() || method.is_empty() || target.is_empty() {
            return Err(FrameError::InvalidRequestLine);
        }

        let method = Method::from_bytes(method.as_bytes())?;
        if target.len() > limits.url_size {
            return Err(FrameError::UriTooLong);
        }
        let (version, keep_alive) = Version::from_bytes(version.as_bytes())?;

        Ok((method, target.to_string(), version, keep_alive))
    }

    /// Builds a copy of this request addressed at a different target.
    /// Intended for rewrite callbacks; headers, body and the typed fields
    /// carry over unchanged.
    pub fn with_target(&self, target: &str) -> Result<Self, FrameError> {
        let (path, query, segments) = parse_target(target, usize::MAX)?;

        let mut replacement = self.clone();
        replacement.target = target.to_string();
        replacement.path = path;
        replacement.query = query;
        replacement.segments = segments;
        Ok(replacement)
    }

    pub(crate) fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    pub(crate) fn segment_refs(&self) -> Vec<&str> {
        self.segments.iter().map(String::as_str).collect()
    }

    pub(crate) fn request_line(&self) -> String {
        format!("{} {} {}", self.method, self.target, self.version)
    }
}

// Public API
impl Request {
    pub const fn method(&self) -> Method {
        self.method
    }

    /// The raw request target, query string included.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The path component, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The raw query string, without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Query parameters in order of appearance. A key without `=` yields an
    /// empty value. No percent-decoding is applied.
    pub fn query_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.query
            .as_deref()
            .unwrap_or("")
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
    }

    /// Path segments between slashes, in order.
    pub fn path_segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    pub const fn version(&self) -> Version {
        self.version
    }

    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of the named header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub const fn host(&self) -> &Host {
        &self.host
    }

    pub const fn content_type(&self) -> Option<&MediaType> {
        self.content_type.as_ref()
    }

    pub const fn content_length(&self) -> Option<usize> {
        self.content_length
    }

    pub const fn accept(&self) -> &AcceptList {
        &self.accept
    }

    pub const fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

fn parse_target(
    target: &str,
    max_len: usize,
) -> Result<(String, Option<String>, Vec<String>), FrameError> {
    if target.len() > max_len {
        return Err(FrameError::UriTooLong);
    }
    if !target.starts_with('/') {
        return Err(FrameError::InvalidUrl);
    }

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query.to_string())),
        None => (target, None),
    };

    let raw = &path[1..];
    let mut segments = Vec::new();
    if !raw.is_empty() {
        let parts: Vec<&str> = raw.split('/').collect();
        for (index, part) in parts.iter().enumerate() {
            if part.is_empty() {
                // A single trailing slash is tolerated.
                if index + 1 == parts.len() {
                    continue;
                }
                return Err(FrameError::DoubleSlash);
            }
            segments.push((*part).to_string());
        }
    }

    Ok((path.to_string(), query, segments))
}

fn parse_header_line(line: &str) -> Result<(&str, &str), FrameError> {
    if line.bytes().any(|b| b == b'\r' || b == b'\n') {
        return Err(FrameError::InvalidHeader);
    }

    let (name, value) = line.split_once(':').ok_or(FrameError::InvalidHeader)?;
    if name.is_empty() || name.bytes().any(|b| b == b' ' || b == b'\t') {
        return Err(FrameError::InvalidHeader);
    }

    Ok((name, value.trim_matches(|c| c == ' ' || c == '\t')))
}

fn parse_connection(value: &str) -> Result<bool, FrameError> {
    if value.eq_ignore_ascii_case("keep-alive") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("close") {
        Ok(false)
    } else {
        Err(FrameError::InvalidConnection)
    }
}

#[cfg(test)]
mod request_self {
    use super::*;

    fn parse(block: &str) -> Result<Request, FrameError> {
        Request::parse(block.as_bytes(), &ReqLimits::default(), "fallback")
    }

    #[test]
    fn parse_valid_request() {
        #[rustfmt::skip]
        let cases = vec![
            (
                "GET / HTTP/1.1\r\nHost: x\r\n\r\n",
                (Method::Get, "/", Version::Http11, true),
            ),
            (
                "POST /api/users HTTP/1.1\r\nHost: x\r\n\r\n",
                (Method::Post, "/api/users", Version::Http11, true),
            ),
            (
                "DELETE /thing HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
                (Method::Delete, "/thing", Version::Http11, false),
            ),
            (
                "GET / HTTP/1.0\r\n\r\n",
                (Method::Get, "/", Version::Http10, false),
            ),
            (
                "GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n",
                (Method::Get, "/", Version::Http10, true),
            ),
        ];

        for (block, (method, target, version, keep_alive)) in cases {
            let request = parse(block).unwrap();
            assert_eq!(request.method(), method);
            assert_eq!(request.target(), target);
            assert_eq!(request.version(), version);
            assert_eq!(request.is_keep_alive(), keep_alive);
        }
    }

    #[test]
    fn parse_invalid_request() {
        #[rustfmt::skip]
        let cases = vec![
            ("GET /\r\n\r\n",                          FrameError::InvalidRequestLine),
            ("GET  / HTTP/1.1\r\n\r\n",                FrameError::InvalidRequestLine),
            ("get / HTTP/1.1\r\n\r\n",                 FrameError::InvalidMethod),
            ("GET qwe HTTP/1.1\r\n\r\n",               FrameError::InvalidUrl),
            ("GET / HTTP/2.0\r\n\r\n",                 FrameError::UnsupportedVersion),
            ("GET / HTTP/1.1 \r\n\r\n",                FrameError::InvalidRequestLine),
            ("GET //api HTTP/1.1\r\n\r\n",             FrameError::DoubleSlash),
            ("GET /a//b HTTP/1.1\r\n\r\n",             FrameError::DoubleSlash),
            ("GET / HTTP/1.1\r\nNo-Colon value\r\n\r\n", FrameError::InvalidHeader),
            ("GET / HTTP/1.1\r\n: empty\r\n\r\n",      FrameError::InvalidHeader),
            ("GET / HTTP/1.1\r\nBad Name: v\r\n\r\n",  FrameError::InvalidHeader),
            ("GET / HTTP/1.1\r\nHost: x\nQ: w\r\n\r\n", FrameError::InvalidHeader),
            ("GET / HTTP/1.1\r\n\r\n",                 FrameError::MissingHost),
            ("GET / HTTP/1.1\r\nHost: x\r\nHost: y\r\n\r\n", FrameError::InvalidHeader),
            ("GET / HTTP/1.1\r\nHost: x\r\nConnection: qwe\r\n\r\n", FrameError::InvalidConnection),
            ("GET / HTTP/1.1\r\nHost: x\r\nContent-Length: 12a\r\n\r\n", FrameError::InvalidContentLength),
            ("GET / HTTP/1.1\r\nHost: x\r\nContent-Length: -1\r\n\r\n", FrameError::InvalidContentLength),
            ("GET / HTTP/1.1\r\nHost: x\r\nContent-Length: 999999999\r\n\r\n", FrameError::BodyTooLarge),
            ("GET / HTTP/1.1\r\nHost: x\r\nContent-Type: nonsense\r\n\r\n", FrameError::InvalidHeader),
        ];

        for (block, expected) in cases {
            assert_eq!(parse(block), Err(expected), "{block:?}");
        }
    }

    #[test]
    fn target_components() {
        let request =
            parse("GET /api/users/123?sort=name&debug HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();

        assert_eq!(request.target(), "/api/users/123?sort=name&debug");
        assert_eq!(request.path(), "/api/users/123");
        assert_eq!(request.query(), Some("sort=name&debug"));
        assert_eq!(
            request.path_segments().collect::<Vec<_>>(),
            ["api", "users", "123"]
        );
        assert_eq!(
            request.query_pairs().collect::<Vec<_>>(),
            [("sort", "name"), ("debug", "")]
        );
    }

    #[test]
    fn trailing_slash_tolerated() {
        let request = parse("GET /api/users/ HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        assert_eq!(request.path_segments().collect::<Vec<_>>(), ["api", "users"]);

        let root = parse("GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        assert_eq!(root.path_segments().count(), 0);
    }

    #[test]
    fn typed_headers() {
        let request = parse(
            "POST /upload HTTP/1.1\r\n\
             Host: Api.Example.com:8080\r\n\
             Content-Type: multipart/form-data; boundary=frontier\r\n\
             Content-Length: 42\r\n\
             Accept: application/json;q=0.9, text/*\r\n\
             X-Custom: kept\r\n\r\n",
        )
        .unwrap();

        assert_eq!(request.host().name(), "api.example.com");
        assert_eq!(request.host().port(), Some(8080));
        let media = request.content_type().unwrap();
        assert_eq!(media.to_string(), "multipart/form-data");
        assert_eq!(media.boundary(), Some("frontier"));
        assert_eq!(request.content_length(), Some(42));
        assert!(request.accept().accepts(&MediaType::new("text", "html")));
        assert_eq!(request.header("x-custom"), Some("kept"));
        // Typed headers stay visible in the plain map.
        assert_eq!(request.header("content-length"), Some("42"));
    }

    #[test]
    fn header_value_whitespace_is_trimmed() {
        let request = parse("GET / HTTP/1.1\r\nHost: x\r\nX-Pad:   spaced out  \r\n\r\n")
            .unwrap();
        assert_eq!(request.header("x-pad"), Some("spaced out"));
    }

    #[test]
    fn http10_falls_back_to_default_host() {
        let request = parse("GET / HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(request.host().name(), "fallback");
        assert_eq!(request.host().port(), None);
    }

    #[test]
    fn too_many_headers() {
        let limits = ReqLimits::default();
        let mut block = String::from("GET / HTTP/1.1\r\nHost: x\r\n");
        for i in 0..limits.header_count {
            block.push_str(&format!("X-H{i}: v\r\n"));
        }
        block.push_str("\r\n");

        assert_eq!(
            Request::parse(block.as_bytes(), &limits, "fallback"),
            Err(FrameError::TooManyHeaders)
        );
    }

    #[test]
    fn non_utf8_head_is_rejected() {
        let block = b"GET /\xff HTTP/1.1\r\nHost: x\r\n\r\n";
        assert_eq!(
            Request::parse(block, &ReqLimits::default(), "fallback"),
            Err(FrameError::InvalidEncoding)
        );
    }

    #[test]
    fn rewrite_copy_changes_target_only() {
        let request = parse("GET /old/path?a=1 HTTP/1.1\r\nHost: x\r\nX-K: v\r\n\r\n").unwrap();
        let rewritten = request.with_target("/new/where").unwrap();

        assert_eq!(rewritten.path(), "/new/where");
        assert_eq!(rewritten.query(), None);
        assert_eq!(
            rewritten.path_segments().collect::<Vec<_>>(),
            ["new", "where"]
        );
        assert_eq!(rewritten.header("x-k"), Some("v"));
        assert_eq!(rewritten.method(), Method::Get);

        assert!(request.with_target("relative").is_err());
    }
}
