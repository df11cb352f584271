use crate::codec::Codec;
use crate::config::{Config, Settings};
use crate::filter::{RequestFilter, RequestHead, ResponseFilter};
use crate::pool::Pool;
use crate::sink::ResponseSink;
use crate::stream::CodecStream;
use crate::writer::{CompressWriter, WriterState};
use http::HeaderMap;
use std::fmt;
use std::io;
use std::sync::Arc;

/// State shared by every request handled through one [`Compression`].
pub(crate) struct Shared {
    pub(crate) codec: Codec,
    pub(crate) level: i32,
    pub(crate) min_length: usize,
    request_filters: Vec<Box<dyn RequestFilter>>,
    response_filters: Vec<Box<dyn ResponseFilter>>,
    pub(crate) streams: Arc<Pool<CodecStream>>,
    pub(crate) writers: Arc<Pool<WriterState>>,
}

impl Shared {
    pub(crate) fn admits_response(&self, headers: &HeaderMap) -> bool {
        self.response_filters.iter().all(|f| f.admit(headers))
    }
}

/// Response compression for one codec, with pooled writers and codec streams.
///
/// Cloning is cheap; clones share configuration and pools, so one instance can
/// serve every request of a server.
///
/// # Example
///
/// ```ignore
/// let compression = Compression::new(Config::new().min_length(512));
///
/// compression.intercept(&RequestHead::from(&request), &mut sink, |sink| {
///     sink.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
///     sink.write_all(&body)
/// })??;
/// ```
#[derive(Clone)]
pub struct Compression {
    shared: Arc<Shared>,
}

impl Compression {
    /// Creates a compression handler from the given configuration.
    pub fn new(config: Config) -> Self {
        let Settings {
            codec,
            level,
            min_length,
            request_filters,
            response_filters,
        } = config.into_parts();

        let streams = Arc::new(Pool::new(move || CodecStream::new(codec, level)));
        let writers = Arc::new(Pool::new(move || WriterState::new(min_length)));

        Self {
            shared: Arc::new(Shared {
                codec,
                level,
                min_length,
                request_filters,
                response_filters,
                streams,
                writers,
            }),
        }
    }

    /// Returns the codec applied to admitted responses.
    pub fn codec(&self) -> Codec {
        self.shared.codec
    }

    /// Returns the effective compression level.
    pub fn level(&self) -> i32 {
        self.shared.level
    }

    /// Returns the effective minimum body size for compression.
    pub fn min_length(&self) -> usize {
        self.shared.min_length
    }

    /// Runs the request filters; `false` means the response must not be
    /// compressed.
    pub fn admits(&self, req: &RequestHead<'_>) -> bool {
        self.shared.request_filters.iter().all(|f| f.admit(req))
    }

    /// Wraps `sink` in a pooled compressing writer.
    ///
    /// Pass `&mut sink` to keep ownership of the host's sink. The writer
    /// finishes itself when dropped, but calling
    /// [`finish`](CompressWriter::finish) explicitly surfaces errors.
    pub fn wrap<S: ResponseSink>(&self, sink: S) -> CompressWriter<S> {
        CompressWriter::new(sink, Arc::clone(&self.shared))
    }

    /// Runs `handler` for one request/response exchange.
    ///
    /// When the request is admitted the handler writes through a compressing
    /// writer; otherwise it receives `sink` itself. The writer is finished and
    /// returned to its pool on every exit path, including an unwinding panic.
    pub fn intercept<S, F, R>(&self, req: &RequestHead<'_>, sink: &mut S, handler: F) -> io::Result<R>
    where
        S: ResponseSink,
        F: FnOnce(&mut dyn ResponseSink) -> R,
    {
        if !self.admits(req) {
            tracing::trace!(method = %req.method, path = req.uri.path(), "request not admitted for compression");
            return Ok(handler(sink));
        }

        let mut writer = self.wrap(sink);
        let output = handler(&mut writer);
        writer.finish()?;
        Ok(output)
    }

    /// Returns how many writers are idle in the writer pool.
    pub fn idle_writers(&self) -> usize {
        self.shared.writers.idle()
    }

    /// Returns how many codec streams are idle in the stream pool.
    pub fn idle_streams(&self) -> usize {
        self.shared.streams.idle()
    }
}

impl Default for Compression {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl fmt::Debug for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compression")
            .field("codec", &self.shared.codec)
            .field("level", &self.shared.level)
            .field("min_length", &self.shared.min_length)
            .field("writers", &self.shared.writers)
            .field("streams", &self.shared.streams)
            .finish()
    }
}
