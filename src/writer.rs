//! The response writer that decides, per response, whether to compress.
//!
//! A [`CompressWriter`] sits between a handler and the host's [`ResponseSink`].
//! Body bytes are held back until either the response proves larger than the
//! configured threshold (compress) or something forces a decision earlier: a
//! content filter rejects, a non-200 status is set, or the handler flushes or
//! finishes (pass through untouched).

use crate::codec::Codec;
use crate::error::{Stage, WriterError, annotate};
use crate::handler::Shared;
use crate::pool::{Pooled, Recycle};
use crate::sink::{Hijacked, ResponseSink};
use crate::sniff::{SNIFF_LEN, detect_content_type};
use crate::stream::CodecStream;
use http::{HeaderMap, HeaderValue, StatusCode, header};
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

/// Where a response stands in the compression decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Body bytes are being buffered; nothing has been decided yet.
    Undecided,
    /// The response is forwarded unmodified.
    Passthrough,
    /// The response is encoded with the configured codec.
    Compressing,
}

/// Per-request state, recycled through the writer pool.
pub(crate) struct WriterState {
    mode: Mode,
    status: Option<StatusCode>,
    header_flushed: bool,
    response_checked: bool,
    filters_deferred: bool,
    sniffed_content_type: bool,
    finished: bool,
    bytes_written: u64,
    buffer: Vec<u8>,
    stream: Option<Pooled<CodecStream>>,
}

impl WriterState {
    pub(crate) fn new(min_length: usize) -> Self {
        Self {
            mode: Mode::Undecided,
            status: None,
            header_flushed: false,
            response_checked: false,
            filters_deferred: false,
            sniffed_content_type: false,
            finished: false,
            bytes_written: 0,
            buffer: Vec::with_capacity(min_length),
            stream: None,
        }
    }
}

impl Recycle for WriterState {
    fn recycle(&mut self) {
        self.mode = Mode::Undecided;
        self.status = None;
        self.header_flushed = false;
        self.response_checked = false;
        self.filters_deferred = false;
        self.sniffed_content_type = false;
        self.finished = false;
        self.bytes_written = 0;
        self.buffer.clear();
        // returns the codec stream to its own pool
        self.stream = None;
    }
}

/// A [`ResponseSink`] that compresses the body it is given when the response
/// qualifies, and forwards it untouched otherwise.
///
/// Created by [`Compression::wrap`](crate::Compression::wrap) or handed to the
/// handler by [`Compression::intercept`](crate::Compression::intercept).
pub struct CompressWriter<S: ResponseSink> {
    sink: S,
    shared: Arc<Shared>,
    state: Pooled<WriterState>,
}

impl<S: ResponseSink> CompressWriter<S> {
    pub(crate) fn new(sink: S, shared: Arc<Shared>) -> Self {
        let state = shared.writers.acquire();
        Self {
            sink,
            shared,
            state,
        }
    }

    /// Returns the current compression decision.
    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    /// Returns `true` once the writer has chosen to compress or pass through.
    pub fn is_decided(&self) -> bool {
        self.state.mode != Mode::Undecided
    }

    /// Returns the committed status, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.state.status
    }

    /// Returns the number of uncompressed body bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        self.state.bytes_written
    }

    /// Returns `true` once headers were flushed or body bytes are pending.
    pub fn is_written(&self) -> bool {
        self.state.header_flushed || !self.state.buffer.is_empty()
    }

    /// Returns `true` once the response head has been handed to the sink.
    pub fn headers_flushed(&self) -> bool {
        self.state.header_flushed
    }

    /// Returns `true` after [`finish`](Self::finish) or a successful hijack.
    pub fn is_finished(&self) -> bool {
        self.state.finished
    }

    /// Returns a reference to the wrapped sink.
    pub fn get_ref(&self) -> &S {
        &self.sink
    }

    /// Returns a mutable reference to the wrapped sink.
    ///
    /// Writing to the sink directly bypasses the compressor.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Hands the response head to the sink, rewriting it first when the body
    /// is compressed. Does nothing before a status is known or when already
    /// done.
    ///
    /// Flushing the head of an undecided response commits it to passthrough.
    pub fn flush_headers(&mut self) {
        let Some(status) = self.state.status else {
            return;
        };
        if self.state.header_flushed {
            return;
        }

        if self.state.mode == Mode::Undecided {
            self.resolve_passthrough();
        }
        if self.state.mode == Mode::Compressing {
            rewrite_headers(self.sink.headers_mut(), self.shared.codec);
        }
        self.sink.write_status(status);
        self.state.header_flushed = true;
    }

    /// Completes the response.
    ///
    /// An undecided response is sent as-is; a compressed one gets its codec
    /// trailer. Calling `finish` again does nothing.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.state.finished {
            return Ok(());
        }
        self.state.finished = true;

        self.settle()?;

        let state = &mut *self.state;
        if let Some(mut stream) = state.stream.take() {
            stream
                .close(&mut self.sink)
                .map_err(|e| annotate(Stage::Close, e))?;
        }
        Ok(())
    }

    /// Forces a decision: whatever is still undecided goes out uncompressed.
    fn settle(&mut self) -> io::Result<()> {
        if self.state.mode == Mode::Undecided {
            self.resolve_passthrough();
        }
        self.flush_headers();
        if self.state.mode == Mode::Passthrough {
            self.drain_buffer()?;
        }
        Ok(())
    }

    fn resolve_passthrough(&mut self) {
        self.state.mode = Mode::Passthrough;
        if self.state.sniffed_content_type {
            self.sink.headers_mut().remove(header::CONTENT_TYPE);
            self.state.sniffed_content_type = false;
        }
    }

    /// Runs the one-time response checks on the first body bytes.
    ///
    /// Without a `Content-Type` the content filters wait until the threshold
    /// is crossed, so the sniffed type sees the whole buffered prefix.
    fn admit_response(&mut self) -> bool {
        let headers = self.sink.headers();
        if declared_length(headers).is_some_and(|len| len <= self.shared.min_length as u64) {
            return false;
        }
        if !headers.contains_key(header::CONTENT_TYPE) {
            self.state.filters_deferred = true;
            return true;
        }
        self.shared.admits_response(headers)
    }

    /// Sniffs a missing `Content-Type` from the buffered prefix plus `data`,
    /// then runs the content filters that were put off at the first write.
    fn admit_sniffed(&mut self, data: &[u8]) -> bool {
        self.state.filters_deferred = false;
        if !self.sink.headers().contains_key(header::CONTENT_TYPE) {
            let state = &mut *self.state;
            let content_type = if state.buffer.len() >= SNIFF_LEN {
                detect_content_type(&state.buffer)
            } else {
                let take = data.len().min(SNIFF_LEN - state.buffer.len());
                let mark = state.buffer.len();
                state.buffer.extend_from_slice(&data[..take]);
                let content_type = detect_content_type(&state.buffer);
                state.buffer.truncate(mark);
                content_type
            };
            self.sink
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            self.state.sniffed_content_type = true;
        }
        self.shared.admits_response(self.sink.headers())
    }

    fn start_compressing(&mut self) -> io::Result<()> {
        self.state.mode = Mode::Compressing;
        // a sniffed content type is now part of the response
        self.state.sniffed_content_type = false;
        self.flush_headers();

        tracing::debug!(
            codec = %self.shared.codec,
            level = self.shared.level,
            buffered = self.state.buffer.len(),
            "compressing response"
        );

        let mut stream = self.shared.streams.acquire();
        let state = &mut *self.state;
        let drained = if state.buffer.is_empty() {
            Ok(())
        } else {
            stream.write(&state.buffer, &mut self.sink)
        };
        state.buffer.clear();
        state.stream = Some(stream);
        drained.map_err(|e| annotate(Stage::Buffer, e))
    }

    fn write_stream(&mut self, data: &[u8]) -> io::Result<()> {
        let state = &mut *self.state;
        match state.stream.as_mut() {
            Some(stream) => stream
                .write(data, &mut self.sink)
                .map_err(|e| annotate(Stage::Stream, e)),
            None => Err(WriterError::Finished.into()),
        }
    }

    fn write_passthrough(&mut self, data: &[u8]) -> io::Result<usize> {
        self.flush_headers();
        self.drain_buffer()?;
        self.sink.write(data)
    }

    fn drain_buffer(&mut self) -> io::Result<()> {
        if self.state.buffer.is_empty() {
            return Ok(());
        }
        let state = &mut *self.state;
        let drained = self.sink.write_all(&state.buffer);
        state.buffer.clear();
        drained.map_err(|e| annotate(Stage::Buffer, e))
    }
}

impl<S: ResponseSink> io::Write for CompressWriter<S> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.state.finished {
            return Err(WriterError::Finished.into());
        }
        self.state.bytes_written += data.len() as u64;
        if self.state.status.is_none() {
            self.write_status(StatusCode::OK);
        }

        match self.state.mode {
            Mode::Passthrough => return self.write_passthrough(data),
            Mode::Compressing => {
                self.write_stream(data)?;
                return Ok(data.len());
            }
            Mode::Undecided => {}
        }

        if data.is_empty() {
            return Ok(0);
        }

        if !self.state.response_checked {
            self.state.response_checked = true;
            if !self.admit_response() {
                tracing::debug!(status = ?self.state.status, "response filtered, passing through");
                self.resolve_passthrough();
                return self.write_passthrough(data);
            }
        }

        if self.state.buffer.len() + data.len() <= self.shared.min_length {
            self.state.buffer.extend_from_slice(data);
            tracing::trace!(buffered = self.state.buffer.len(), "buffering response body");
            return Ok(data.len());
        }

        if self.state.filters_deferred && !self.admit_sniffed(data) {
            tracing::debug!("sniffed content type filtered, passing through");
            self.resolve_passthrough();
            return self.write_passthrough(data);
        }

        self.start_compressing()?;
        self.write_stream(data)?;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.state.finished {
            self.settle()?;
            let state = &mut *self.state;
            if let Some(stream) = state.stream.as_mut() {
                stream
                    .flush(&mut self.sink)
                    .map_err(|e| annotate(Stage::Flush, e))?;
            }
        }
        self.sink.flush()
    }
}

impl<S: ResponseSink> ResponseSink for CompressWriter<S> {
    fn headers(&self) -> &HeaderMap {
        self.sink.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.sink.headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.state.header_flushed || self.state.finished {
            return;
        }
        self.state.status = Some(status);
        self.sink.write_status(status);

        if status != StatusCode::OK && self.state.mode == Mode::Undecided {
            tracing::debug!(%status, "non-success status, passing through");
            self.resolve_passthrough();
        }
    }

    fn hijack(&mut self) -> io::Result<Hijacked> {
        let conn = self.sink.hijack()?;
        self.state.finished = true;
        self.state.stream = None;
        Ok(conn)
    }
}

impl<S: ResponseSink> Drop for CompressWriter<S> {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            tracing::warn!(error = %err, "failed to finish response");
        }
    }
}

impl<S: ResponseSink + fmt::Debug> fmt::Debug for CompressWriter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressWriter")
            .field("sink", &self.sink)
            .field("mode", &self.state.mode)
            .field("status", &self.state.status)
            .field("bytes_written", &self.state.bytes_written)
            .field("finished", &self.state.finished)
            .finish()
    }
}

fn rewrite_headers(headers: &mut HeaderMap, codec: Codec) {
    headers.insert(
        header::CONTENT_ENCODING,
        HeaderValue::from_static(codec.content_encoding()),
    );
    // compressed size is unknown and byte ranges no longer line up
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::ACCEPT_RANGES);
    add_vary_accept_encoding(headers);
    weaken_etag(headers);
}

/// Adds Accept-Encoding to the Vary header if not already present.
fn add_vary_accept_encoding(headers: &mut HeaderMap) {
    let covered = headers
        .get_all(header::VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .any(|v| v == "*" || v.eq_ignore_ascii_case("accept-encoding"));

    if !covered {
        headers.append(header::VARY, HeaderValue::from_static("accept-encoding"));
    }
}

/// A compressed body is no longer byte-identical, so a strong validator
/// becomes weak.
fn weaken_etag(headers: &mut HeaderMap) {
    let Some(etag) = headers.get(header::ETAG) else {
        return;
    };
    if etag.as_bytes().starts_with(b"W/") {
        return;
    }

    let mut weak = Vec::with_capacity(etag.len() + 2);
    weak.extend_from_slice(b"W/");
    weak.extend_from_slice(etag.as_bytes());

    match HeaderValue::from_bytes(&weak) {
        Ok(value) => {
            headers.insert(header::ETAG, value);
        }
        Err(_) => {
            headers.remove(header::ETAG);
        }
    }
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}
