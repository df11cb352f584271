//! Request and response predicates that decide whether compression is attempted.
//!
//! Both kinds of filter are evaluated as an ordered list with short-circuit AND
//! semantics. A filter returning `false` is a policy outcome: the response is
//! simply passed through untouched.

use crate::codec::Codec;
use http::{HeaderMap, Method, Request, Uri, header, request};

/// The parts of an inbound request that admission filters look at.
#[derive(Debug, Clone, Copy)]
pub struct RequestHead<'a> {
    /// The request method.
    pub method: &'a Method,
    /// The request target.
    pub uri: &'a Uri,
    /// The request headers.
    pub headers: &'a HeaderMap,
}

impl<'a, B> From<&'a Request<B>> for RequestHead<'a> {
    fn from(req: &'a Request<B>) -> Self {
        Self {
            method: req.method(),
            uri: req.uri(),
            headers: req.headers(),
        }
    }
}

impl<'a> From<&'a request::Parts> for RequestHead<'a> {
    fn from(parts: &'a request::Parts) -> Self {
        Self {
            method: &parts.method,
            uri: &parts.uri,
            headers: &parts.headers,
        }
    }
}

/// Decides from request metadata whether compression should be attempted.
pub trait RequestFilter: Send + Sync {
    /// Returns `false` to leave the response for this request uncompressed.
    fn admit(&self, req: &RequestHead<'_>) -> bool;
}

impl<F> RequestFilter for F
where
    F: Fn(&RequestHead<'_>) -> bool + Send + Sync,
{
    fn admit(&self, req: &RequestHead<'_>) -> bool {
        self(req)
    }
}

/// Decides from response headers whether compression should proceed.
///
/// Evaluated once per response, at the first body write.
pub trait ResponseFilter: Send + Sync {
    /// Returns `false` to pass the response through uncompressed.
    fn admit(&self, headers: &HeaderMap) -> bool;
}

impl<F> ResponseFilter for F
where
    F: Fn(&HeaderMap) -> bool + Send + Sync,
{
    fn admit(&self, headers: &HeaderMap) -> bool {
        self(headers)
    }
}

/// The built-in request check.
///
/// Rejects `HEAD` and `OPTIONS` requests and protocol upgrades, and requires
/// `Accept-Encoding` to allow the codec.
#[derive(Debug, Clone, Copy)]
pub struct CommonRequestFilter {
    codec: Codec,
}

impl CommonRequestFilter {
    /// Creates the check for the given codec.
    pub fn new(codec: Codec) -> Self {
        Self { codec }
    }
}

impl RequestFilter for CommonRequestFilter {
    fn admit(&self, req: &RequestHead<'_>) -> bool {
        if req.method == Method::HEAD || req.method == Method::OPTIONS {
            return false;
        }
        if req.headers.contains_key(header::UPGRADE) {
            return false;
        }

        req.headers
            .get_all(header::ACCEPT_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| self.codec.accepted_by(v))
    }
}

/// Restricts compression to an explicit set of request paths.
///
/// An empty set admits every request.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    paths: Vec<String>,
}

impl PathFilter {
    /// Creates a filter admitting only the given paths.
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

impl RequestFilter for PathFilter {
    fn admit(&self, req: &RequestHead<'_>) -> bool {
        self.paths.is_empty() || self.paths.iter().any(|p| p == req.uri.path())
    }
}

/// Skips responses whose body is already encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipEncodedFilter;

impl ResponseFilter for SkipEncodedFilter {
    fn admit(&self, headers: &HeaderMap) -> bool {
        !headers.contains_key(header::CONTENT_ENCODING)
            && !headers.contains_key(header::TRANSFER_ENCODING)
    }
}

/// MIME prefixes compressed by [`ContentTypeFilter::default`].
pub const DEFAULT_CONTENT_TYPES: &[&str] = &[
    "text/plain",
    "application/x-javascript",
    "application/javascript",
    "application/json",
    "text/css",
    "application/xml",
];

/// Allows only responses whose `Content-Type` starts with one of a set of
/// MIME prefixes. A missing content type is rejected.
#[derive(Debug, Clone)]
pub struct ContentTypeFilter {
    prefixes: Vec<String>,
}

impl ContentTypeFilter {
    /// Creates a filter for the given MIME prefixes.
    pub fn new<I, P>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for ContentTypeFilter {
    fn default() -> Self {
        Self::new(DEFAULT_CONTENT_TYPES.iter().copied())
    }
}

impl ResponseFilter for ContentTypeFilter {
    fn admit(&self, headers: &HeaderMap) -> bool {
        let Some(content_type) = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::trim_start)
            .filter(|v| !v.is_empty())
        else {
            return false;
        };

        self.prefixes.iter().any(|prefix| {
            content_type
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        })
    }
}
