use crate::body::CompressionBody;
use crate::filter::RequestHead;
use crate::future::ResponseFuture;
use crate::handler::Compression;
use http::{Request, Response};
use http_body::Body;
use std::task::{Context, Poll};
use tower::Service;

/// A Tower service that compresses HTTP response bodies.
#[derive(Debug, Clone)]
pub struct CompressionService<S> {
    inner: S,
    compression: Compression,
}

impl<S> CompressionService<S> {
    /// Creates a new compression service wrapping the given inner service.
    pub fn new(inner: S, compression: Compression) -> Self {
        Self { inner, compression }
    }

    /// Returns a reference to the inner service.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns a mutable reference to the inner service.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consumes this service, returning the inner service.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CompressionService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ResBody: Body,
    ResBody::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Response = Response<CompressionBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future, ResBody>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let compression = self
            .compression
            .admits(&RequestHead::from(&req))
            .then(|| self.compression.clone());

        ResponseFuture::new(self.inner.call(req), compression)
    }
}

#[cfg(test)]
mod tests {
    use crate::codec::Codec;
    use crate::config::Config;
    use crate::layer::CompressionLayer;
    use crate::test_util::{decompress, json_payload};
    use bytes::Bytes;
    use http::{Method, Request, Response, StatusCode, header};
    use http_body_util::{BodyExt, Full};
    use std::convert::Infallible;
    use tower::{Layer, ServiceExt, service_fn};

    async fn call(
        layer: &CompressionLayer,
        req: Request<()>,
        response: Response<Full<Bytes>>,
    ) -> (http::response::Parts, Bytes) {
        let mut response = Some(response);
        let service = layer.layer(service_fn(move |_req: Request<()>| {
            let response = response.take().expect("service called once");
            async move { Ok::<_, Infallible>(response) }
        }));

        let response = service.oneshot(req).await.unwrap();
        let (parts, body) = response.into_parts();
        let body = body.collect().await.unwrap().to_bytes();
        (parts, body)
    }

    fn request(accept: &'static str) -> Request<()> {
        Request::builder()
            .uri("/items")
            .header(header::ACCEPT_ENCODING, accept)
            .body(())
            .unwrap()
    }

    fn json(status: StatusCode, body: Vec<u8>) -> Response<Full<Bytes>> {
        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, body.len())
            .body(Full::new(Bytes::from(body)))
            .unwrap()
    }

    #[tokio::test]
    #[cfg(feature = "brotli")]
    async fn test_large_json_is_compressed() {
        let layer = CompressionLayer::new();
        let payload = json_payload(2000);

        let (parts, body) = call(&layer, request("gzip, br"), json(StatusCode::OK, payload.clone())).await;

        assert_eq!(parts.status, StatusCode::OK);
        assert_eq!(parts.headers[header::CONTENT_ENCODING], "br");
        assert_eq!(parts.headers[header::VARY], "accept-encoding");
        assert!(parts.headers.get(header::CONTENT_LENGTH).is_none());
        assert_eq!(decompress(Codec::Brotli, &body), payload);
    }

    #[tokio::test]
    async fn test_small_text_is_untouched() {
        let layer = CompressionLayer::new();
        let response = Response::builder()
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Full::new(Bytes::from_static(b"0123456789")))
            .unwrap();

        let (parts, body) = call(&layer, request("br"), response).await;

        assert!(parts.headers.get(header::CONTENT_ENCODING).is_none());
        assert_eq!(body, "0123456789");
    }

    #[tokio::test]
    async fn test_not_found_is_untouched() {
        let layer = CompressionLayer::new();
        let payload = json_payload(5000);

        let (parts, body) = call(&layer, request("br"), json(StatusCode::NOT_FOUND, payload.clone())).await;

        assert_eq!(parts.status, StatusCode::NOT_FOUND);
        assert!(parts.headers.get(header::CONTENT_ENCODING).is_none());
        assert_eq!(parts.headers[header::CONTENT_LENGTH], "5000");
        assert_eq!(body, payload);
    }

    #[tokio::test]
    #[cfg(feature = "brotli")]
    async fn test_request_without_codec_is_untouched() {
        let layer = CompressionLayer::new();
        let payload = json_payload(5000);

        let (parts, body) = call(&layer, request("gzip, deflate"), json(StatusCode::OK, payload.clone())).await;
        assert!(parts.headers.get(header::CONTENT_ENCODING).is_none());
        assert_eq!(body, payload);

        let head = Request::builder()
            .method(Method::HEAD)
            .header(header::ACCEPT_ENCODING, "br")
            .body(())
            .unwrap();
        let (parts, _) = call(&layer, head, json(StatusCode::OK, payload)).await;
        assert!(parts.headers.get(header::CONTENT_ENCODING).is_none());
    }

    #[tokio::test]
    #[cfg(feature = "gzip")]
    async fn test_layer_with_config() {
        let layer = CompressionLayer::with_config(Config::new().codec(Codec::Gzip).min_length(64));
        let payload = json_payload(200);

        let (parts, body) = call(&layer, request("gzip"), json(StatusCode::OK, payload.clone())).await;

        assert_eq!(parts.headers[header::CONTENT_ENCODING], "gzip");
        assert_eq!(decompress(Codec::Gzip, &body), payload);
    }

    #[tokio::test]
    async fn test_already_encoded_is_untouched() {
        let layer = CompressionLayer::new();
        let response = Response::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_ENCODING, "gzip")
            .body(Full::new(Bytes::from(vec![0x1f; 4096])))
            .unwrap();

        let (parts, body) = call(&layer, request("br"), response).await;

        assert_eq!(parts.headers[header::CONTENT_ENCODING], "gzip");
        assert_eq!(body.len(), 4096);
    }
}
