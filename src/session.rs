//! Per-request session state.
//!
//! A [`Session`] is created by the dispatcher for every inbound request and
//! is owned exclusively by the coroutine serving that request. It carries the
//! parsed path segments, the caller's identity once authenticated, the
//! request data, and a buffered [`Reply`] that handlers write into. Nothing in
//! a session is shared with other requests; the configuration and parameter
//! store it references are read-only.

use crate::config::{Config, UserConfig};
use crate::error::{ServantError, SERVANT_ERR_HEADER};
use crate::params::{request_params, ParamStore};
use crate::server::request::ParsedRequest;
use crate::uri::UriSegments;
use http::{Method, StatusCode};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{info, warn};

/// Buffered response written by the dispatcher and handlers.
///
/// Flushed to the transport once the handler returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Default for Reply {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }
}

impl Reply {
    /// Get a header by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or replace a header
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), sanitize_header_value(value)));
    }
}

/// Header values must stay on one line.
fn sanitize_header_value(value: &str) -> String {
    value.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

/// Everything known about one request while it is being served.
///
/// Built by the dispatcher with a fresh id before any gate runs. The
/// authenticated user name is filled in once authentication succeeds, and the
/// handler built from the session writes its outcome into the buffered
/// [`Reply`] through [`Session::set_status`], [`Session::write_body`] and
/// [`Session::error_end`].
pub struct Session {
    id: u64,
    config: Arc<Config>,
    params: Arc<dyn ParamStore>,
    segments: UriSegments,
    username: String,
    request: ParsedRequest,
    reply: Reply,
}

impl Session {
    pub(crate) fn new(
        id: u64,
        config: Arc<Config>,
        params: Arc<dyn ParamStore>,
        segments: UriSegments,
        request: ParsedRequest,
    ) -> Self {
        Self {
            id,
            config,
            params,
            segments,
            username: String::new(),
            request,
            reply: Reply::default(),
        }
    }

    /// Correlation id, unique for the lifetime of the process
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// First path segment, selecting the handler family
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.segments.resource
    }

    #[must_use]
    pub fn group(&self) -> &str {
        &self.segments.group
    }

    #[must_use]
    pub fn item(&self) -> &str {
        &self.segments.item
    }

    /// Residual path after the item, with its leading `/`, or empty
    #[must_use]
    pub fn tail(&self) -> &str {
        &self.segments.tail
    }

    /// Authenticated user name; empty before authentication succeeds
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn set_username(&mut self, username: String) {
        self.username = username;
    }

    #[must_use]
    pub fn request(&self) -> &ParsedRequest {
        &self.request
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.request.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.request.path
    }

    /// Request header by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request
            .headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    #[must_use]
    pub fn query(&self) -> &HashMap<String, String> {
        &self.request.query_params
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.request.body
    }

    /// Configuration of the authenticated user, if the name is configured.
    #[must_use]
    pub fn user_config(&self) -> Option<&UserConfig> {
        self.config.users.get(&self.username)
    }

    /// Placeholder resolver bound to this request's query parameters.
    pub fn request_params(&self) -> impl Fn(&str) -> String + '_ {
        request_params(self.params.as_ref(), Some(&self.request.query_params))
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.reply.status = status;
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        self.reply.set_header(name, value);
    }

    pub fn write_body(&mut self, bytes: &[u8]) {
        self.reply.body.extend_from_slice(bytes);
    }

    #[must_use]
    pub fn reply(&self) -> &Reply {
        &self.reply
    }

    pub(crate) fn into_reply(self) -> Reply {
        self.reply
    }

    /// Report a caller-visible failure.
    ///
    /// Logs `- <msg>` at warn level, sets the `X-Servant-Err` header to the
    /// message and writes `code` as the response status.
    pub fn error_end(&mut self, code: StatusCode, msg: impl Display) {
        let msg = msg.to_string();
        warn!(session_id = self.id, "- {}", msg);
        self.reply.set_header(SERVANT_ERR_HEADER, &msg);
        self.reply.status = code;
    }

    /// [`Session::error_end`] for a [`ServantError`].
    pub fn fail(&mut self, err: &ServantError) {
        self.error_end(err.status, &err.message);
    }

    /// Log `- <msg>` at warn level without touching the response.
    pub fn bad_end(&self, msg: impl Display) {
        warn!(session_id = self.id, "- {}", msg);
    }

    /// Log `- <msg>` at info level without touching the response.
    pub fn good_end(&self, msg: impl Display) {
        info!(session_id = self.id, "- {}", msg);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::params::GlobalParams;
    use crate::uri::parse_uri_path;

    pub(crate) fn session_for(method: Method, target: &str, config: Config) -> Session {
        session_with(ParsedRequest::from_target(method, target), config)
    }

    pub(crate) fn session_with(request: ParsedRequest, config: Config) -> Session {
        let segments = parse_uri_path(&request.path);
        Session::new(
            1,
            Arc::new(config),
            Arc::new(GlobalParams::default()),
            segments,
            request,
        )
    }

    #[test]
    fn test_error_end_sets_status_and_header() {
        let mut sess = session_for(Method::GET, "/files/a/b", Config::default());
        sess.error_end(StatusCode::NOT_FOUND, format_args!("no file {}", "x.txt"));
        assert_eq!(sess.reply().status, StatusCode::NOT_FOUND);
        assert_eq!(sess.reply().header(SERVANT_ERR_HEADER), Some("no file x.txt"));
    }

    #[test]
    fn test_error_header_is_single_line() {
        let mut sess = session_for(Method::GET, "/files/a/b", Config::default());
        sess.error_end(StatusCode::INTERNAL_SERVER_ERROR, "line one\r\nInjected: yes");
        assert_eq!(
            sess.reply().header(SERVANT_ERR_HEADER),
            Some("line oneInjected: yes")
        );
    }

    #[test]
    fn test_bad_and_good_end_leave_response_alone() {
        let mut sess = session_for(Method::GET, "/files/a/b", Config::default());
        sess.set_status(StatusCode::CREATED);
        sess.bad_end("something odd");
        sess.good_end(format_args!("done in {}ms", 3));
        assert_eq!(sess.reply().status, StatusCode::CREATED);
        assert!(sess.reply().header(SERVANT_ERR_HEADER).is_none());
    }

    #[test]
    fn test_segments_and_query() {
        let sess = session_for(Method::POST, "/commands/sys/restart/now?service=nginx", Config::default());
        assert_eq!(sess.resource(), "commands");
        assert_eq!(sess.group(), "sys");
        assert_eq!(sess.item(), "restart");
        assert_eq!(sess.tail(), "/now");
        assert_eq!(sess.path(), "/commands/sys/restart/now");
        let resolve = sess.request_params();
        assert_eq!(resolve("service"), "nginx");
    }

    #[test]
    fn test_user_config_follows_username() {
        let config = Config::from_yaml("users:\n  ops:\n    key: k\n").unwrap();
        let mut sess = session_for(Method::GET, "/files/a/b", config);
        assert!(sess.user_config().is_none());
        sess.set_username("ops".to_string());
        assert_eq!(sess.user_config().and_then(|u| u.key.as_deref()), Some("k"));
    }

    #[test]
    fn test_set_header_replaces_existing() {
        let mut reply = Reply::default();
        reply.set_header("Content-Type", "text/plain");
        reply.set_header("content-type", "application/json");
        assert_eq!(reply.headers.len(), 1);
        assert_eq!(reply.header("CONTENT-TYPE"), Some("application/json"));
    }
}
