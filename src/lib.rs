//! Streaming HTTP response compression with a deferred decision.
//!
//! A handler writes its response through a [`CompressWriter`], which holds the
//! first bytes back until it knows whether compressing is worth it. The body is
//! compressed only when all of these hold:
//! - the request passes the request filters (by default: not `HEAD`/`OPTIONS`,
//!   no `Upgrade`, and `Accept-Encoding` allows the codec)
//! - the status is `200 OK`
//! - the response passes the response filters (by default: not already
//!   encoded, and a compressible `Content-Type`)
//! - the body grows past the minimum length (default 1024 bytes) before the
//!   handler flushes or finishes
//!
//! Otherwise the response goes out byte-for-byte with its headers untouched.
//!
//! # Example
//!
//! ```ignore
//! use http_compression_writer::{Compression, Config, RequestHead};
//!
//! let compression = Compression::new(Config::new().min_length(512));
//!
//! compression.intercept(&RequestHead::from(&request), &mut sink, |sink| {
//!     sink.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
//!     sink.write_all(&body)
//! })??;
//! ```
//!
//! The same writer also backs a Tower layer:
//!
//! ```ignore
//! use http_compression_writer::CompressionLayer;
//! use tower::ServiceBuilder;
//!
//! let service = ServiceBuilder::new()
//!     .layer(CompressionLayer::new())
//!     .service(my_service);
//! ```
//!
//! # Response Modifications
//!
//! When compression is applied:
//! - `Content-Encoding` header is set to the codec used
//! - `Content-Length` header is removed (compressed size is unknown)
//! - `Accept-Ranges` header is removed
//! - `Vary` header includes `Accept-Encoding`
//! - a strong `ETag` becomes weak
//!
//! Writers and codec streams are pooled per [`Compression`] instance, so a
//! busy server reuses compressor state instead of rebuilding it per request.

#![deny(missing_docs)]

mod body;
mod codec;
mod config;
mod error;
mod filter;
mod future;
mod handler;
mod layer;
mod pool;
mod service;
mod sink;
mod sniff;
mod stream;
mod writer;

#[cfg(test)]
mod test_util;

pub use body::CompressionBody;
pub use codec::{BROTLI_BEST_COMPRESSION, BROTLI_BEST_SPEED, BROTLI_DEFAULT_LEVEL, Codec};
pub use config::{Config, DEFAULT_MIN_LENGTH};
pub use error::{DrainError, Stage, WriterError, drain_stage};
pub use filter::{
    CommonRequestFilter, ContentTypeFilter, DEFAULT_CONTENT_TYPES, PathFilter, RequestFilter,
    RequestHead, ResponseFilter, SkipEncodedFilter,
};
pub use future::ResponseFuture;
pub use handler::Compression;
pub use layer::CompressionLayer;
pub use pool::{Pool, Pooled, Recycle};
pub use service::CompressionService;
pub use sink::{Hijacked, ResponseSink};
pub use sniff::{OCTET_STREAM, detect_content_type};
pub use writer::{CompressWriter, Mode};
