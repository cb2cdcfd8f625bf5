//! # Security Module
//!
//! Authentication and authorization gates consulted by the dispatcher before
//! any handler is built.
//!
//! ## Overview
//!
//! The dispatcher talks to two traits:
//! - [`Authenticator`] - establishes who the caller is
//! - [`PermissionChecker`] - decides whether that caller may touch the
//!   requested `resource/group/item`
//!
//! Both are injected at startup and shared by all requests, so implementations
//! must be `Send + Sync` and must not keep per-request state.
//!
//! ## Config-backed providers
//!
//! [`ConfigAuthenticator`] and [`ConfigPermissions`] implement the gates from
//! the `users` section of the configuration:
//!
//! ```yaml
//! users:
//!   ops:
//!     key: s3cret
//!     allow:
//!       - commands/sys/*
//!       - files
//! ```
//!
//! A caller identifies with `X-Servant-User: ops` and, when the user has a
//! key, proves it with `X-Servant-Key: s3cret`.

use crate::session::Session;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::debug;

/// Request header naming the caller
pub const USER_HEADER: &str = "X-Servant-User";
/// Request header carrying the caller's key
pub const KEY_HEADER: &str = "X-Servant-Key";

/// Why authentication was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    MissingUser,
    UnknownUser(String),
    BadKey(String),
    /// Free-form refusal from a custom authenticator
    Rejected(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingUser => write!(f, "missing {USER_HEADER} header"),
            AuthError::UnknownUser(user) => write!(f, "unknown user {user}"),
            AuthError::BadKey(user) => write!(f, "bad key for user {user}"),
            AuthError::Rejected(reason) => f.write_str(reason),
        }
    }
}

impl std::error::Error for AuthError {}

/// Establishes the caller's identity.
pub trait Authenticator: Send + Sync {
    /// Return the caller's user name, or why it could not be established.
    fn authenticate(&self, session: &Session) -> Result<String, AuthError>;
}

/// Per-user authorization of the requested path.
///
/// Called after authentication succeeded, so [`Session::username`] is set.
pub trait PermissionChecker: Send + Sync {
    fn check_permission(&self, session: &Session) -> bool;
}

/// Authenticates against the configured `users` table.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigAuthenticator;

impl Authenticator for ConfigAuthenticator {
    fn authenticate(&self, session: &Session) -> Result<String, AuthError> {
        let user = session
            .header(USER_HEADER)
            .filter(|u| !u.is_empty())
            .ok_or(AuthError::MissingUser)?;
        let user_config = session
            .config()
            .users
            .get(user)
            .ok_or_else(|| AuthError::UnknownUser(user.to_string()))?;
        if let Some(expected) = &user_config.key {
            let provided = session.header(KEY_HEADER).unwrap_or("");
            // compare digests so the comparison does not depend on key length
            if Sha256::digest(provided.as_bytes()) != Sha256::digest(expected.as_bytes()) {
                debug!(session_id = session.id(), user = %user, "key mismatch");
                return Err(AuthError::BadKey(user.to_string()));
            }
        }
        Ok(user.to_string())
    }
}

/// Authorizes against the `allow` patterns of the authenticated user.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigPermissions;

impl PermissionChecker for ConfigPermissions {
    fn check_permission(&self, session: &Session) -> bool {
        let Some(user) = session.user_config() else {
            return false;
        };
        let target = [session.resource(), session.group(), session.item()];
        user.allow.iter().any(|pattern| pattern_allows(pattern, &target))
    }
}

/// `true` when `pattern` covers `target`.
///
/// Patterns are `/`-separated; `*` matches any single segment and a pattern
/// shorter than the target covers everything beneath it.
#[must_use]
pub fn pattern_allows(pattern: &str, target: &[&str]) -> bool {
    let parts: Vec<&str> = pattern.trim_matches('/').split('/').collect();
    if parts.len() > target.len() {
        return false;
    }
    parts
        .iter()
        .zip(target)
        .all(|(p, t)| *p == "*" || p == t)
}

/// Accepts every caller as the anonymous user.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authenticator for AllowAll {
    fn authenticate(&self, _session: &Session) -> Result<String, AuthError> {
        Ok(String::new())
    }
}

impl PermissionChecker for AllowAll {
    fn check_permission(&self, _session: &Session) -> bool {
        true
    }
}
