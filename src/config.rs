use crate::codec::Codec;
use crate::filter::{
    CommonRequestFilter, ContentTypeFilter, RequestFilter, ResponseFilter, SkipEncodedFilter,
};
use std::fmt;

/// Default minimum body size, in bytes, before compression is attempted.
pub const DEFAULT_MIN_LENGTH: usize = 1024;

/// Settings for a [`Compression`](crate::Compression) instance.
///
/// Every setting has a default, so `Config::default()` is a working setup:
/// Brotli at its default quality, a 1 KiB threshold, the built-in request check
/// and the built-in response checks.
pub struct Config {
    codec: Codec,
    level: Option<i32>,
    min_length: usize,
    request_filters: Option<Vec<Box<dyn RequestFilter>>>,
    response_filters: Option<Vec<Box<dyn ResponseFilter>>>,
}

impl Config {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self {
            codec: Codec::default(),
            level: None,
            min_length: DEFAULT_MIN_LENGTH,
            request_filters: None,
            response_filters: None,
        }
    }

    /// Sets the codec applied to admitted responses.
    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Sets the compression level.
    ///
    /// A level outside the codec's range falls back to the codec default.
    pub fn level(mut self, level: i32) -> Self {
        self.level = Some(level);
        self
    }

    /// Sets the minimum body size required for compression.
    ///
    /// Bodies of at most this many bytes are sent uncompressed. `0` restores
    /// [`DEFAULT_MIN_LENGTH`].
    pub fn min_length(mut self, bytes: usize) -> Self {
        self.min_length = bytes;
        self
    }

    /// Replaces the request filters. An empty list admits every request.
    pub fn request_filters(mut self, filters: Vec<Box<dyn RequestFilter>>) -> Self {
        self.request_filters = Some(filters);
        self
    }

    /// Appends a request filter, after the built-in check unless the list was
    /// replaced. The built-in check is created for the codec set so far, so
    /// call [`codec`](Self::codec) first.
    pub fn request_filter<F>(mut self, filter: F) -> Self
    where
        F: RequestFilter + 'static,
    {
        let codec = self.codec;
        self.request_filters
            .get_or_insert_with(|| default_request_filters(codec))
            .push(Box::new(filter));
        self
    }

    /// Replaces the response filters. An empty list lets every response
    /// through to the size check.
    pub fn response_filters(mut self, filters: Vec<Box<dyn ResponseFilter>>) -> Self {
        self.response_filters = Some(filters);
        self
    }

    /// Appends a response filter, after the built-in checks unless the list
    /// was replaced.
    pub fn response_filter<F>(mut self, filter: F) -> Self
    where
        F: ResponseFilter + 'static,
    {
        self.response_filters
            .get_or_insert_with(default_response_filters)
            .push(Box::new(filter));
        self
    }

    pub(crate) fn into_parts(self) -> Settings {
        let codec = self.codec;
        Settings {
            codec,
            level: codec.normalize_level(self.level.unwrap_or_else(|| codec.default_level())),
            min_length: if self.min_length == 0 {
                DEFAULT_MIN_LENGTH
            } else {
                self.min_length
            },
            request_filters: self
                .request_filters
                .unwrap_or_else(|| default_request_filters(codec)),
            response_filters: self
                .response_filters
                .unwrap_or_else(default_response_filters),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("codec", &self.codec)
            .field("level", &self.level)
            .field("min_length", &self.min_length)
            .field("request_filters", &self.request_filters.as_ref().map(Vec::len))
            .field("response_filters", &self.response_filters.as_ref().map(Vec::len))
            .finish()
    }
}

/// A normalized configuration.
pub(crate) struct Settings {
    pub(crate) codec: Codec,
    pub(crate) level: i32,
    pub(crate) min_length: usize,
    pub(crate) request_filters: Vec<Box<dyn RequestFilter>>,
    pub(crate) response_filters: Vec<Box<dyn ResponseFilter>>,
}

fn default_request_filters(codec: Codec) -> Vec<Box<dyn RequestFilter>> {
    vec![Box::new(CommonRequestFilter::new(codec))]
}

fn default_response_filters() -> Vec<Box<dyn ResponseFilter>> {
    vec![
        Box::new(SkipEncodedFilter),
        Box::new(ContentTypeFilter::default()),
    ]
}
