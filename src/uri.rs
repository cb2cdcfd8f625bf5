//! Resource path parsing.
//!
//! Every resource request is addressed as `/<resource>/<group>/<item>[/<tail>]`
//! where the first three segments are identifiers (a letter followed by word
//! characters) and the optional tail is an arbitrary residual path handed to
//! the handler untouched.

use once_cell::sync::Lazy;
use regex::Regex;

static URI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/([a-zA-Z][a-zA-Z0-9_]*)/([a-zA-Z][a-zA-Z0-9_]*)/([a-zA-Z][a-zA-Z0-9_]*)((?:/.*)?)$")
        .expect("resource path regex should be valid")
});

/// The four segments of a resource path.
///
/// All fields empty is the "not a resource request" sentinel returned by
/// [`parse_uri_path`] on mismatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UriSegments {
    pub resource: String,
    pub group: String,
    pub item: String,
    /// Residual path including its leading `/`, or empty
    pub tail: String,
}

impl UriSegments {
    /// `true` when the path did not have the resource shape.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resource.is_empty() && self.group.is_empty() && self.item.is_empty() && self.tail.is_empty()
    }
}

/// Split a raw request path into its resource segments.
///
/// No percent-decoding or normalisation happens here. A path that does not
/// have the resource shape yields four empty strings rather than an error;
/// callers route that into the same "unknown resource" outcome as a valid
/// path naming an unregistered resource.
#[must_use]
pub fn parse_uri_path(path: &str) -> UriSegments {
    match URI_RE.captures(path) {
        Some(caps) => {
            let seg = |i: usize| caps.get(i).map_or_else(String::new, |m| m.as_str().to_owned());
            UriSegments {
                resource: seg(1),
                group: seg(2),
                item: seg(3),
                tail: seg(4),
            }
        }
        None => UriSegments::default(),
    }
}
