use http::StatusCode;
use std::fmt;

/// Response header carrying the human-readable reason of a failed request.
///
/// Set on every error response produced through [`Session::error_end`], absent
/// on success.
///
/// [`Session::error_end`]: crate::session::Session::error_end
pub const SERVANT_ERR_HEADER: &str = "X-Servant-Err";

/// Caller-facing failure: an HTTP status plus a formatted message.
///
/// Terminal for the request that produced it; there is no retry semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServantError {
    /// HTTP status sent to the client
    pub status: StatusCode,
    /// Message placed in the `X-Servant-Err` header
    pub message: String,
}

impl ServantError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl fmt::Display for ServantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for ServantError {}

/// Build a [`ServantError`] from a status and a format string.
///
/// ```
/// use servant::servant_error;
/// use http::StatusCode;
///
/// let err = servant_error!(StatusCode::NOT_FOUND, "no such item {}", "x");
/// assert_eq!(err.to_string(), "404: no such item x");
/// ```
#[macro_export]
macro_rules! servant_error {
    ($status:expr, $($arg:tt)+) => {
        $crate::error::ServantError::new($status, format!($($arg)+))
    };
}
