use crate::body::{CompressionBody, Encoding};
use crate::handler::Compression;
use http::{Response, response};
use http_body::Body;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

pin_project! {
    /// Future for compression service responses.
    ///
    /// Resolves once the inner response is available and, for admitted
    /// requests, once enough of its body has been read to decide whether to
    /// compress it.
    pub struct ResponseFuture<F, B> {
        #[pin]
        state: State<F, B>,
    }
}

pin_project! {
    #[project = StateProj]
    enum State<F, B> {
        Waiting {
            #[pin]
            inner: F,
            compression: Option<Compression>,
        },
        // `None` once the response has been returned
        Deciding {
            pending: Option<(response::Parts, Encoding<B>)>,
        },
    }
}

impl<F, B> ResponseFuture<F, B> {
    pub(crate) fn new(inner: F, compression: Option<Compression>) -> Self {
        Self {
            state: State::Waiting { inner, compression },
        }
    }
}

impl<F, B, E> Future for ResponseFuture<F, B>
where
    F: Future<Output = Result<Response<B>, E>>,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Output = Result<Response<CompressionBody<B>>, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            let mut state = self.as_mut().project().state;
            match state.as_mut().project() {
                StateProj::Waiting { inner, compression } => {
                    let response = ready!(inner.poll(cx))?;
                    let Some(compression) = compression.take() else {
                        state.set(State::Deciding { pending: None });
                        return Poll::Ready(Ok(response.map(CompressionBody::passthrough)));
                    };

                    let (mut parts, body) = response.into_parts();
                    let encoding = Encoding::new(&compression, &mut parts, body);
                    state.set(State::Deciding {
                        pending: Some((parts, encoding)),
                    });
                }
                StateProj::Deciding { pending } => {
                    if let Some((_, encoding)) = pending.as_mut() {
                        ready!(encoding.poll_decide(cx));
                    }
                    let Some((parts, encoding)) = pending.take() else {
                        panic!("ResponseFuture polled after completion");
                    };
                    return Poll::Ready(Ok(encoding.into_response(parts)));
                }
            }
        }
    }
}
