use crate::config::Config;
use crate::handler::Compression;
use crate::service::CompressionService;
use tower::Layer;

/// A Tower layer that compresses HTTP response bodies.
///
/// Every service built by one layer shares the same [`Compression`], and so
/// the same writer and codec pools.
#[derive(Debug, Clone, Default)]
pub struct CompressionLayer {
    compression: Compression,
}

impl CompressionLayer {
    /// Creates a new compression layer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a layer from the given configuration.
    pub fn with_config(config: Config) -> Self {
        Self {
            compression: Compression::new(config),
        }
    }
}

impl From<Compression> for CompressionLayer {
    fn from(compression: Compression) -> Self {
        Self { compression }
    }
}

impl<S> Layer<S> for CompressionLayer {
    type Service = CompressionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CompressionService::new(inner, self.compression.clone())
    }
}
