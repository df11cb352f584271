use crate::handler::Compression;
use crate::sink::ResponseSink;
use crate::writer::CompressWriter;
use bytes::{Buf, Bytes, BytesMut};
use http::{HeaderMap, Response, StatusCode, header, response};
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::io::{self, Write};
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The sink a [`CompressWriter`] writes into when it runs inside the Tower
/// service. Its head is moved into the outgoing response once the writer has
/// decided, and its output is drained into body frames.
#[derive(Debug)]
pub(crate) struct BodySink {
    status: StatusCode,
    headers: HeaderMap,
    output: BytesMut,
}

impl io::Write for BodySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ResponseSink for BodySink {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        self.status = status;
    }
}

/// Pumps frames from an inner body through a compress writer.
pub(crate) struct Encoding<B> {
    inner: Pin<Box<B>>,
    writer: CompressWriter<BodySink>,
    always_flush: bool,
    trailers: Option<HeaderMap>,
    error: Option<io::Error>,
    ended: bool,
}

impl<B> Encoding<B> {
    /// Moves the response head into a writer. `parts` keeps everything but
    /// the status and headers until [`into_response`](Self::into_response).
    pub(crate) fn new(compression: &Compression, parts: &mut response::Parts, body: B) -> Self {
        let always_flush = parts
            .headers
            .get("x-accel-buffering")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("no"))
            || is_streaming_content_type(&parts.headers);

        let sink = BodySink {
            status: parts.status,
            headers: mem::take(&mut parts.headers),
            output: BytesMut::new(),
        };
        let mut writer = compression.wrap(sink);
        writer.write_status(parts.status);

        Self {
            inner: Box::pin(body),
            writer,
            always_flush,
            trailers: None,
            error: None,
            ended: false,
        }
    }

    pub(crate) fn into_response(mut self, mut parts: response::Parts) -> Response<CompressionBody<B>> {
        let sink = self.writer.get_mut();
        parts.status = sink.status;
        parts.headers = mem::take(&mut sink.headers);

        Response::from_parts(
            parts,
            CompressionBody {
                kind: Kind::Encoded { encoding: self },
            },
        )
    }

    fn fail(&mut self, err: io::Error) {
        self.error = Some(err);
        self.trailers = None;
        self.ended = true;
    }

    fn is_end_stream(&self) -> bool {
        self.ended
            && self.error.is_none()
            && self.trailers.is_none()
            && self.writer.get_ref().output.is_empty()
    }
}

impl<B> Encoding<B>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    /// Feeds one frame of the inner body to the writer.
    fn poll_pull(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let frame = match ready!(self.inner.as_mut().poll_frame(cx)) {
            None => {
                self.ended = true;
                return Poll::Ready(self.writer.finish());
            }
            Some(Err(err)) => return Poll::Ready(Err(body_error(err))),
            Some(Ok(frame)) => frame,
        };

        match frame.into_data() {
            Ok(mut data) => {
                while data.has_remaining() {
                    let len = {
                        let chunk = data.chunk();
                        self.writer.write_all(chunk)?;
                        chunk.len()
                    };
                    data.advance(len);
                }
                if self.always_flush {
                    self.writer.flush()?;
                }
            }
            Err(frame) => {
                // Emitted after the codec trailer
                if let Ok(trailers) = frame.into_trailers() {
                    self.trailers = Some(trailers);
                }
            }
        }
        Poll::Ready(Ok(()))
    }

    /// Reads the inner body until the writer has decided how to send it.
    pub(crate) fn poll_decide(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        while !self.writer.is_decided() && !self.ended {
            if let Err(err) = ready!(self.poll_pull(cx)) {
                self.fail(err);
            }
        }
        Poll::Ready(())
    }

    fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, io::Error>>> {
        loop {
            if let Some(err) = self.error.take() {
                return Poll::Ready(Some(Err(err)));
            }

            let output = self.writer.get_mut().output.split().freeze();
            if !output.is_empty() {
                return Poll::Ready(Some(Ok(Frame::data(output))));
            }

            if self.ended {
                return Poll::Ready(self.trailers.take().map(|t| Ok(Frame::trailers(t))));
            }

            if let Err(err) = ready!(self.poll_pull(cx)) {
                self.fail(err);
            }
        }
    }
}

pin_project! {
    /// A response body produced by [`CompressionService`](crate::CompressionService).
    ///
    /// Either the inner body unchanged, or the inner body streamed through a
    /// [`CompressWriter`], which may still have chosen to pass it through.
    pub struct CompressionBody<B> {
        #[pin]
        kind: Kind<B>,
    }
}

pin_project! {
    #[project = KindProj]
    enum Kind<B> {
        Passthrough {
            #[pin]
            inner: B,
        },
        Encoded {
            encoding: Encoding<B>,
        },
    }
}

impl<B> CompressionBody<B> {
    /// Creates a body that forwards `inner` untouched.
    pub(crate) fn passthrough(inner: B) -> Self {
        Self {
            kind: Kind::Passthrough { inner },
        }
    }
}

impl<B> Body for CompressionBody<B>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project().kind.project() {
            KindProj::Passthrough { inner } => match ready!(inner.poll_frame(cx)) {
                None => Poll::Ready(None),
                Some(Ok(frame)) => Poll::Ready(Some(Ok(
                    frame.map_data(|mut data| data.copy_to_bytes(data.remaining()))
                ))),
                Some(Err(err)) => Poll::Ready(Some(Err(body_error(err)))),
            },
            KindProj::Encoded { encoding } => encoding.poll_next(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.kind {
            Kind::Passthrough { inner } => inner.is_end_stream(),
            Kind::Encoded { encoding } => encoding.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.kind {
            Kind::Passthrough { inner } => inner.size_hint(),
            // Unknown once the writer is involved
            Kind::Encoded { .. } => SizeHint::default(),
        }
    }
}

fn body_error<E: Into<BoxError>>(err: E) -> io::Error {
    io::Error::other::<BoxError>(err.into())
}

/// Checks if the content type requires always flushing (e.g., streaming).
fn is_streaming_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| {
            ct.starts_with("text/event-stream") || ct.starts_with("application/grpc-web")
        })
}
