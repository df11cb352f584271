//! Helpers shared by the unit tests.

use crate::codec::Codec;
use crate::sink::{Hijacked, ResponseSink};
use http::{HeaderMap, StatusCode};
use std::io::{self, Read};

/// An in-memory sink that behaves like a host response writer: status and
/// headers stay mutable until the first body write or flush commits them.
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub committed: Option<(StatusCode, HeaderMap)>,
    pub body: Vec<u8>,
    pub status_calls: usize,
    pub flushes: usize,
    pub hijackable: bool,
}

impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers
            .insert(name, http::HeaderValue::from_static(value));
        self
    }

    fn commit(&mut self) {
        if self.committed.is_none() {
            let status = self.status.unwrap_or(StatusCode::OK);
            self.committed = Some((status, self.headers.clone()));
        }
    }

    /// The head a client would see once the host ends the response.
    pub(crate) fn head(&self) -> (StatusCode, HeaderMap) {
        match &self.committed {
            Some((status, headers)) => (*status, headers.clone()),
            None => (self.status.unwrap_or(StatusCode::OK), self.headers.clone()),
        }
    }

    pub(crate) fn header(&self, name: &str) -> Option<String> {
        self.head()
            .1
            .get(name)
            .map(|v| v.to_str().unwrap().to_owned())
    }
}

impl io::Write for RecordingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.commit();
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.commit();
        self.flushes += 1;
        Ok(())
    }
}

impl ResponseSink for RecordingSink {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        self.status_calls += 1;
        if self.committed.is_none() {
            self.status = Some(status);
        }
    }

    fn hijack(&mut self) -> io::Result<Hijacked> {
        if self.hijackable {
            Ok(Box::new("raw connection"))
        } else {
            Err(io::Error::from(io::ErrorKind::Unsupported))
        }
    }
}

/// A sink whose body writes fail once `budget` bytes have been accepted.
#[derive(Debug, Default)]
pub(crate) struct FailingSink {
    pub inner: RecordingSink,
    pub budget: usize,
}

impl io::Write for FailingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.inner.body.len() + buf.len() > self.budget {
            return Err(io::Error::from(io::ErrorKind::ConnectionReset));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl ResponseSink for FailingSink {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        self.inner.write_status(status)
    }
}

/// Decodes a complete compressed body.
pub(crate) fn decompress(codec: Codec, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    match codec {
        #[cfg(feature = "brotli")]
        Codec::Brotli => {
            brotli::Decompressor::new(data, 4096)
                .read_to_end(&mut out)
                .unwrap();
        }
        #[cfg(feature = "gzip")]
        Codec::Gzip => {
            flate2::read::GzDecoder::new(data)
                .read_to_end(&mut out)
                .unwrap();
        }
        #[cfg(feature = "zstd")]
        Codec::Zstd => {
            out = zstd::stream::decode_all(data).unwrap();
        }
        #[cfg(feature = "deflate")]
        Codec::Deflate => {
            flate2::read::ZlibDecoder::new(data)
                .read_to_end(&mut out)
                .unwrap();
        }
    }
    out
}

/// A JSON document of exactly `len` bytes.
pub(crate) fn json_payload(len: usize) -> Vec<u8> {
    let mut body = br#"{"items":["#.to_vec();
    let mut i = 0;
    while body.len() + 20 <= len {
        body.extend_from_slice(format!("\"item-{i:05}\",").as_bytes());
        i += 1;
    }
    body.extend_from_slice(br#""end"]}"#);
    while body.len() < len {
        body.insert(1, b' ');
    }
    body.truncate(len);
    body
}

#[test]
fn test_json_payload_length() {
    for len in [20, 1024, 1025, 2000, 5000] {
        assert_eq!(json_payload(len).len(), len);
    }
}
