use http::Method;
use may_minihttp::Request;
use std::collections::HashMap;
use std::io::Read;
use std::net::SocketAddr;
use tracing::debug;

/// Request data extracted from the transport.
///
/// Everything the dispatcher and handlers need is copied out of the
/// connection buffer up front, so a [`Session`](crate::session::Session) owns
/// its request outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    /// HTTP method (GET, POST, etc.)
    pub method: Method,
    /// Request path without the query string, exactly as received
    pub path: String,
    /// Peer address when the transport exposes it
    pub remote_addr: Option<SocketAddr>,
    /// HTTP headers (lowercase keys)
    pub headers: HashMap<String, String>,
    /// Parsed query string parameters; the first occurrence of a name wins
    pub query_params: HashMap<String, String>,
    /// Raw request body
    pub body: Vec<u8>,
}

impl ParsedRequest {
    /// Build a request from a method and a request target such as
    /// `/files/logs/nginx/access.log?lines=10`.
    pub fn from_target(method: Method, target: &str) -> Self {
        let path = target.split('?').next().unwrap_or("/").to_string();
        Self {
            method,
            path,
            remote_addr: None,
            headers: HashMap::new(),
            query_params: parse_query_params(target),
            body: Vec::new(),
        }
    }

    /// Add a header (name is lowercased)
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }
}

/// Parse query string parameters from a request target
///
/// Extracts everything after the `?` character and URL-decodes parameter names and values.
/// Repeated names keep their first value.
pub fn parse_query_params(target: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some((_, query_str)) = target.split_once('?') {
        for (k, v) in url::form_urlencoded::parse(query_str.as_bytes()) {
            params.entry(k.into_owned()).or_insert_with(|| v.into_owned());
        }
    }
    params
}

/// Extract method, path, headers, query and body from a `may_minihttp::Request`.
pub fn parse_request(req: Request) -> ParsedRequest {
    let method = Method::from_bytes(req.method().as_bytes()).unwrap_or_default();
    let raw_path = req.path().to_string();

    let headers: HashMap<String, String> = req
        .headers()
        .iter()
        .map(|h| {
            (
                h.name.to_ascii_lowercase(),
                String::from_utf8_lossy(h.value).to_string(),
            )
        })
        .collect();

    let mut parsed = ParsedRequest::from_target(method, &raw_path);
    parsed.headers = headers;

    // body() consumes the request, so it is read last
    let mut body = Vec::new();
    if let Err(e) = req.body().read_to_end(&mut body) {
        debug!(error = %e, path = %parsed.path, "request body read failed");
    }
    parsed.body = body;
    parsed
}
