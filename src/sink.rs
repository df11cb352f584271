use http::{HeaderMap, StatusCode};
use std::any::Any;
use std::io;

/// Whatever a host hands back when a connection is taken over (for example an
/// upgraded socket). The compression layer never inspects it.
pub type Hijacked = Box<dyn Any + Send>;

/// The write side of an HTTP response, as seen by a request handler.
///
/// Body bytes go through [`io::Write`]. Headers stay mutable until the host
/// commits them together with the status, which sinks typically do on the first
/// body write or flush. [`CompressWriter`](crate::CompressWriter) implements this
/// trait too, so handlers cannot tell it apart from the raw sink.
pub trait ResponseSink: io::Write {
    /// Returns the response headers.
    fn headers(&self) -> &HeaderMap;

    /// Returns the response headers for modification.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Sets the response status. Hosts may accept repeated calls until the
    /// head is committed.
    fn write_status(&mut self, status: StatusCode);

    /// Takes over the underlying connection.
    ///
    /// Sinks that cannot be hijacked return [`io::ErrorKind::Unsupported`].
    fn hijack(&mut self) -> io::Result<Hijacked> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "response sink does not support hijacking",
        ))
    }
}

impl<S: ResponseSink + ?Sized> ResponseSink for &mut S {
    fn headers(&self) -> &HeaderMap {
        (**self).headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        (**self).headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        (**self).write_status(status)
    }

    fn hijack(&mut self) -> io::Result<Hijacked> {
        (**self).hijack()
    }
}

impl<S: ResponseSink + ?Sized> ResponseSink for Box<S> {
    fn headers(&self) -> &HeaderMap {
        (**self).headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        (**self).headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        (**self).write_status(status)
    }

    fn hijack(&mut self) -> io::Result<Hijacked> {
        (**self).hijack()
    }
}
