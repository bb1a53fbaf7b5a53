//! Core HTTP protocol types.

use crate::errors::FrameError;
use std::fmt;

#[inline(always)]
pub(crate) fn slice_to_usize(bytes: &[u8]) -> Option<usize> {
    if bytes.is_empty() {
        return None;
    }

    let mut result: usize = 0;
    for &byte in bytes {
        if !byte.is_ascii_digit() {
            return None;
        }

        result = result
            .checked_mul(10)?
            .checked_add((byte - b'0') as usize)?;
    }

    Some(result)
}

// METHOD

/// HTTP request methods
///
/// # Disabled methods
///
/// * `TRACE` - disabled for security reasons
/// * `CONNECT` - disabled because this engine does not tunnel
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
    Head,
    Patch,
    Delete,
    Options,
}

impl Method {
    #[inline(always)]
    pub(crate) fn from_bytes(src: &[u8]) -> Result<Self, FrameError> {
        match src {
            b"GET" => Ok(Method::Get),
            b"PUT" => Ok(Method::Put),
            b"POST" => Ok(Method::Post),
            b"HEAD" => Ok(Method::Head),
            b"PATCH" => Ok(Method::Patch),
            b"DELETE" => Ok(Method::Delete),
            b"OPTIONS" => Ok(Method::Options),
            _ => Err(FrameError::InvalidMethod),
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Head => "HEAD",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// VERSION

/// HTTP protocol version
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    /// HTTP/1.0, kept for legacy clients. Connections default to close.
    Http10,
    /// HTTP/1.1, the protocol this engine is built around.
    Http11,
}

impl Version {
    #[inline(always)]
    pub(crate) const fn from_bytes(src: &[u8]) -> Result<(Self, bool), FrameError> {
        match src {
            b"HTTP/1.1" => Ok((Self::Http11, true)),
            b"HTTP/1.0" => Ok((Self::Http10, false)),
            _ => Err(FrameError::UnsupportedVersion),
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// STATUS_CODE

macro_rules! set_status_codes {
    ($(
        $name:ident = ($num:expr, $str:expr);
    )+) => {
        /// HTTP status codes
        ///
        /// The common subset of [RFC 9110](https://datatracker.ietf.org/doc/html/rfc9110#section-15)
        /// codes this engine and its handlers use.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum StatusCode { $(
            #[doc = concat!(stringify!($num), " ", $str)]
            $name = $num,
        )+ }

        impl StatusCode {
            // Returns the HTTP first line as bytes (e.g., `b"HTTP/1.1 200 OK\r\n"`).
            #[inline]
            pub(crate) const fn into_first_line(self, version: Version) -> &'static [u8] {
                match (self, version) { $(
                    (StatusCode::$name, Version::Http11) => {
                        concat!("HTTP/1.1 ", $num, " ", $str, "\r\n").as_bytes()
                    },
                    (StatusCode::$name, Version::Http10) => {
                        concat!("HTTP/1.0 ", $num, " ", $str, "\r\n").as_bytes()
                    },
                )+ }
            }

            /// Numeric status code.
            #[inline]
            pub const fn code(self) -> u16 {
                self as u16
            }

            /// Canonical reason phrase.
            #[inline]
            pub const fn reason(self) -> &'static str {
                match self { $(
                    StatusCode::$name => $str,
                )+ }
            }

            /// True for 4xx and 5xx codes.
            #[inline]
            pub const fn is_error(self) -> bool {
                self.code() >= 400
            }
        }
    }
}

set_status_codes! {
    Continue = (100, "Continue");
    SwitchingProtocols = (101, "Switching Protocols");

    Ok = (200, "OK");
    Created = (201, "Created");
    Accepted = (202, "Accepted");
    NoContent = (204, "No Content");
    PartialContent = (206, "Partial Content");

    MovedPermanently = (301, "Moved Permanently");
    Found = (302, "Found");
    SeeOther = (303, "See Other");
    NotModified = (304, "Not Modified");
    TemporaryRedirect = (307, "Temporary Redirect");
    PermanentRedirect = (308, "Permanent Redirect");

    BadRequest = (400, "Bad Request");
    Unauthorized = (401, "Unauthorized");
    Forbidden = (403, "Forbidden");
    NotFound = (404, "Not Found");
    MethodNotAllowed = (405, "Method Not Allowed");
    NotAcceptable = (406, "Not Acceptable");
    RequestTimeout = (408, "Request Timeout");
    Conflict = (409, "Conflict");
    Gone = (410, "Gone");
    LengthRequired = (411, "Length Required");
    PreconditionFailed = (412, "Precondition Failed");
    PayloadTooLarge = (413, "Payload Too Large");
    UriTooLong = (414, "URI Too Long");
    UnsupportedMediaType = (415, "Unsupported Media Type");
    UnprocessableEntity = (422, "Unprocessable Entity");
    TooManyRequests = (429, "Too Many Requests");
    RequestHeaderFieldsTooLarge = (431, "Request Header Fields Too Large");

    InternalServerError = (500, "Internal Server Error");
    NotImplemented = (501, "Not Implemented");
    BadGateway = (502, "Bad Gateway");
    ServiceUnavailable = (503, "Service Unavailable");
    GatewayTimeout = (504, "Gateway Timeout");
    HttpVersionNotSupported = (505, "HTTP Version Not Supported");
}

// HOST

/// The authority a request was addressed to, from its `Host` header.
///
/// The name is normalized to lower case; the port stays `None` when the
/// client did not send one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Host {
    name: String,
    port: Option<u16>,
}

impl Host {
    pub fn new(name: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            port,
        }
    }

    /// Parses a `Host` header value. Handles `name`, `name:port` and
    /// bracketed IPv6 literals. Returns `None` on structural garbage.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        if let Some(rest) = value.strip_prefix('[') {
            let (addr, tail) = rest.split_once(']')?;
            if addr.is_empty() {
                return None;
            }
            let port = match tail.strip_prefix(':') {
                Some(port) => Some(port.parse().ok()?),
                None if tail.is_empty() => None,
                None => return None,
            };
            return Some(Self::new(format!("[{addr}]"), port));
        }

        match value.split_once(':') {
            Some((name, port)) if !name.is_empty() && !port.contains(':') => {
                Some(Self::new(name, Some(port.parse().ok()?)))
            }
            Some(_) => None,
            None => Some(Self::new(value, None)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn port(&self) -> Option<u16> {
        self.port
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{port}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

// MEDIA TYPE

/// A parsed media type, as carried by `Content-Type` headers and route
/// registrations.
///
/// Only the `boundary` parameter is retained (multipart framing needs it);
/// other parameters are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaType {
    primary: String,
    subtype: String,
    boundary: Option<String>,
}

impl MediaType {
    pub fn new(primary: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            primary: primary.into().to_ascii_lowercase(),
            subtype: subtype.into().to_ascii_lowercase(),
            boundary: None,
        }
    }

    /// Parses a `Content-Type` value such as
    /// `multipart/form-data; boundary=xyz`. Returns `None` on garbage.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split(';');
        let essence = parts.next()?.trim();
        let (primary, subtype) = essence.split_once('/')?;
        if primary.is_empty() || subtype.is_empty() {
            return None;
        }

        let mut media = Self::new(primary, subtype);
        for param in parts {
            if let Some((name, raw)) = param.split_once('=') {
                if name.trim().eq_ignore_ascii_case("boundary") {
                    media.boundary = Some(raw.trim().trim_matches('"').to_string());
                }
            }
        }

        Some(media)
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    pub fn boundary(&self) -> Option<&str> {
        self.boundary.as_deref()
    }

    pub(crate) fn matches_essence(&self, primary: &str, subtype: &str) -> bool {
        self.primary == primary && self.subtype == subtype
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.primary, self.subtype)
    }
}

// HEADERS

/// One header field, name case preserved as received.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Header {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered header collection with case-insensitive name lookup
/// (per [RFC 9110, Section 5.1](https://datatracker.ietf.org/doc/html/rfc9110#section-5.1)).
/// Lookup returns the first value; repeated names keep their order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderMap {
    headers: Vec<Header>,
}

impl HeaderMap {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            headers: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, header: Header) {
        self.headers.push(header);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.headers.iter()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}
