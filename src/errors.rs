use crate::http::{accept::AcceptList, response::Response, types::StatusCode};

macro_rules! frame_errors {
    ($($name:ident => $status:ident, $tag:literal, $message:literal;)*) => {
        /// A fault detected while turning raw bytes into a [`Request`](crate::Request).
        ///
        /// Every variant maps to a fixed HTTP status and a stable machine-readable
        /// code used in generated error pages.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
        pub enum FrameError {
            $( #[error($message)] $name, )*
        }

        impl FrameError {
            /// The HTTP status a generated error page carries for this fault.
            pub const fn status(&self) -> StatusCode {
                match self { $( Self::$name => StatusCode::$status, )* }
            }

            pub(crate) const fn tag(&self) -> &'static str {
                match self { $( Self::$name => $tag, )* }
            }
        }
    };
}

frame_errors! {
    InvalidEncoding => BadRequest, "INVALID_ENCODING", "invalid encoding";
    InvalidRequestLine => BadRequest, "INVALID_REQUEST_LINE", "invalid request line";
    InvalidMethod => BadRequest, "INVALID_METHOD", "invalid HTTP method";
    InvalidUrl => BadRequest, "INVALID_URL", "invalid URL format";
    DoubleSlash => BadRequest, "DOUBLE_SLASH", "empty path segment";
    UriTooLong => UriTooLong, "URI_TOO_LONG", "request target too long";
    UnsupportedVersion => HttpVersionNotSupported, "UNSUPPORTED_VERSION", "HTTP version not supported";
    InvalidHeader => BadRequest, "INVALID_HEADER", "invalid header format";
    TooManyHeaders => RequestHeaderFieldsTooLarge, "TOO_MANY_HEADERS", "too many headers";
    HeaderBlockTooLarge => RequestHeaderFieldsTooLarge, "HEADER_BLOCK_TOO_LARGE", "header block too large";
    MissingHost => BadRequest, "MISSING_HOST", "missing Host header";
    InvalidConnection => BadRequest, "INVALID_CONNECTION", "invalid Connection header";
    InvalidContentLength => BadRequest, "INVALID_CONTENT_LENGTH", "invalid Content-Length";
    BodyTooLarge => PayloadTooLarge, "BODY_TOO_LARGE", "request body too large";
    BodyMismatch => BadRequest, "BODY_MISMATCH", "body length mismatch";
}

/// A failure returned by an application handler.
///
/// Handlers are untrusted at the pipeline boundary: an `Err` never escapes the
/// engine, it is converted into a 500 page (or a matching custom error route).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{reason}")]
pub struct HandlerError {
    /// Short human-readable cause.
    pub reason: String,
    /// Optional diagnostic payload, only rendered into pages when detail
    /// exposure is enabled at construction.
    pub detail: Option<String>,
}

impl HandlerError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            detail: None,
        }
    }

    pub fn with_detail(reason: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            detail: Some(detail.into()),
        }
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        HandlerError::new(err.to_string())
    }
}

/// A resolved failure outcome, as seen by custom error routes and error-log
/// subscribers.
#[derive(Debug, Clone)]
pub struct Fault {
    pub status: StatusCode,
    /// Stable machine-readable code, e.g. `NOT_FOUND` or `INVALID_HEADER`.
    pub code: String,
    pub reason: String,
    pub detail: Option<String>,
}

impl Fault {
    pub fn new(status: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            status,
            code: status.reason().to_ascii_uppercase().replace(' ', "_"),
            reason: reason.into(),
            detail: None,
        }
    }

    pub fn with_detail(
        status: StatusCode,
        reason: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        let mut fault = Self::new(status, reason);
        fault.detail = Some(detail.into());
        fault
    }
}

impl From<&FrameError> for Fault {
    fn from(err: &FrameError) -> Self {
        Self {
            status: err.status(),
            code: err.tag().to_string(),
            reason: err.to_string(),
            detail: None,
        }
    }
}

/// Canned overload answer sent by the dedicated 503 tasks. Those tasks never
/// see a parsed request, so no negotiation happens here.
pub(crate) const OVERLOAD_PAGE: &[u8] = b"HTTP/1.1 503 Service Unavailable\r\n\
connection: close\r\n\
content-length: 72\r\n\
content-type: application/json\r\n\
\r\n\
{\"error\":\"Service temporarily unavailable\",\"code\":\"SERVICE_UNAVAILABLE\"}";

/// Builds the generated error page for a fault, negotiated against the
/// client's Accept list when one was parsed. JSON is the default
/// representation, plain text the fallback for clients that exclude it.
pub(crate) fn render(
    fault: &Fault,
    accept: Option<&AcceptList>,
    request_line: Option<&str>,
    expose_detail: bool,
) -> Response {
    let json = match accept {
        Some(list) if !list.is_empty() => list.accepts_essence("application", "json"),
        _ => true,
    };

    let detail = if expose_detail {
        fault.detail.as_deref()
    } else {
        None
    };

    let (content_type, body) = if json {
        let mut body = format!(
            "{{\"error\":\"{}\",\"code\":\"{}\"",
            escape_json(&fault.reason),
            escape_json(&fault.code),
        );
        if let Some(line) = request_line {
            body.push_str(",\"request\":\"");
            body.push_str(&escape_json(line));
            body.push('"');
        }
        if let Some(detail) = detail {
            body.push_str(",\"detail\":\"");
            body.push_str(&escape_json(detail));
            body.push('"');
        }
        body.push('}');
        ("application/json", body)
    } else {
        let mut body = format!(
            "{} {}\n{}\n",
            fault.status.code(),
            fault.status.reason(),
            fault.reason
        );
        if let Some(line) = request_line {
            body.push_str("request: ");
            body.push_str(line);
            body.push('\n');
        }
        if let Some(detail) = detail {
            body.push_str("detail: ");
            body.push_str(detail);
            body.push('\n');
        }
        ("text/plain", body)
    };

    Response::new(fault.status)
        .header("content-type", content_type)
        .body(body)
}

fn escape_json(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod page_tests {
    use super::*;

    #[test]
    fn frame_error_statuses() {
        #[rustfmt::skip]
        let cases = [
            (FrameError::InvalidEncoding,    400),
            (FrameError::InvalidMethod,      400),
            (FrameError::UriTooLong,         414),
            (FrameError::UnsupportedVersion, 505),
            (FrameError::TooManyHeaders,     431),
            (FrameError::BodyTooLarge,       413),
            (FrameError::BodyMismatch,       400),
        ];

        for (error, code) in cases {
            assert_eq!(error.status().code(), code);
        }
    }

    #[test]
    fn render_json_by_default() {
        let fault = Fault::new(StatusCode::NotFound, "no handler for request");
        let page = render(&fault, None, None, false);

        assert_eq!(page.status(), StatusCode::NotFound);
        let body = std::str::from_utf8(page.body_bytes().unwrap()).unwrap();
        assert_eq!(
            body,
            r#"{"error":"no handler for request","code":"NOT_FOUND"}"#
        );
    }

    #[test]
    fn render_plain_text_when_json_excluded() {
        let accept = AcceptList::parse("text/plain");
        let fault = Fault::new(StatusCode::BadRequest, "invalid header format");
        let page = render(&fault, Some(&accept), Some("GET /x HTTP/1.1"), false);

        let body = std::str::from_utf8(page.body_bytes().unwrap()).unwrap();
        assert!(body.starts_with("400 Bad Request\n"));
        assert!(body.contains("request: GET /x HTTP/1.1"));
    }

    #[test]
    fn detail_only_rendered_when_exposed() {
        let fault = Fault::with_detail(StatusCode::InternalServerError, "boom", "stack here");

        let hidden = render(&fault, None, None, false);
        let shown = render(&fault, None, None, true);

        let hidden = std::str::from_utf8(hidden.body_bytes().unwrap()).unwrap();
        let shown = std::str::from_utf8(shown.body_bytes().unwrap()).unwrap();
        assert!(!hidden.contains("stack here"));
        assert!(shown.contains("\"detail\":\"stack here\""));
    }

    #[test]
    fn json_escaping() {
        assert_eq!(escape_json(r#"a"b\c"#), r#"a\"b\\c"#);
        assert_eq!(escape_json("line\nbreak"), "line\\u000abreak");
    }

    #[test]
    fn overload_page_content_length_is_exact() {
        let text = std::str::from_utf8(OVERLOAD_PAGE).unwrap();
        let (head, body) = text.split_once("\r\n\r\n").unwrap();
        assert!(head.contains("content-length: 72"));
        assert_eq!(body.len(), 72);
    }
}
