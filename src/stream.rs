use crate::codec::Codec;
use crate::pool::Recycle;
use compression_codecs::EncodeV2;
use compression_core::util::{PartialBuffer, WriteBuffer};
use std::io::{self, Write};

const OUTPUT_BUFFER_SIZE: usize = 8 * 1024; // 8KB output buffer

/// A reusable compressor stream.
///
/// The stream holds no destination of its own: every call receives the writer
/// the compressed bytes go to, so a pooled instance never keeps a reference to
/// a previous request's sink.
pub(crate) struct CodecStream {
    codec: Codec,
    level: i32,
    encoder: Box<dyn EncodeV2 + Send>,
    output_buffer: Vec<u8>,
    /// Encoder state has been touched since it was (re)built.
    used: bool,
    /// The codec trailer has been written.
    closed: bool,
}

impl CodecStream {
    pub(crate) fn new(codec: Codec, level: i32) -> Self {
        Self {
            codec,
            level,
            encoder: codec.encoder(level),
            output_buffer: vec![0u8; OUTPUT_BUFFER_SIZE],
            used: false,
            closed: false,
        }
    }

    /// Compresses all of `input`, writing whatever the encoder emits to `dest`.
    pub(crate) fn write<W: Write + ?Sized>(&mut self, input: &[u8], dest: &mut W) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::other("codec stream is closed"));
        }
        self.used = true;

        let mut input_buf = PartialBuffer::new(input);

        // Keep encoding until all input is consumed
        while input_buf.written_len() < input.len() {
            let consumed = input_buf.written_len();
            let mut output = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());

            self.encoder.encode(&mut input_buf, &mut output)?;

            let written = output.written_len();
            if written > 0 {
                dest.write_all(&self.output_buffer[..written])?;
            }

            if written == 0 && input_buf.written_len() == consumed {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "encoder made no progress",
                ));
            }
        }

        Ok(())
    }

    /// Emits everything the encoder holds so the peer can decode it now.
    pub(crate) fn flush<W: Write + ?Sized>(&mut self, dest: &mut W) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.used = true;

        loop {
            let mut output = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());
            let done = self.encoder.flush(&mut output)?;

            let written = output.written_len();
            if written > 0 {
                dest.write_all(&self.output_buffer[..written])?;
            }
            if done {
                return Ok(());
            }
        }
    }

    /// Finishes the compressed stream, writing the codec trailer to `dest`.
    pub(crate) fn close<W: Write + ?Sized>(&mut self, dest: &mut W) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.used = true;

        loop {
            let mut output = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());
            let done = self.encoder.finish(&mut output)?;

            let written = output.written_len();
            if written > 0 {
                dest.write_all(&self.output_buffer[..written])?;
            }
            if done {
                self.closed = true;
                return Ok(());
            }
        }
    }
}

impl Recycle for CodecStream {
    fn recycle(&mut self) {
        if !self.used {
            return;
        }
        // Encoders cannot be rewound in place; the scratch buffer is what
        // survives between requests.
        if !self.closed {
            let _ = self.close(&mut io::sink());
        }
        self.encoder = self.codec.encoder(self.level);
        self.used = false;
        self.closed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Pool;
    use crate::test_util::decompress;
    use std::sync::Arc;

    #[test]
    #[cfg(feature = "brotli")]
    fn test_write_and_close_round_trip() {
        let mut stream = CodecStream::new(Codec::Brotli, 5);
        let mut out = Vec::new();

        stream.write(b"hello ", &mut out).unwrap();
        stream.write(b"world", &mut out).unwrap();
        stream.close(&mut out).unwrap();

        assert_eq!(decompress(Codec::Brotli, &out), b"hello world");
    }

    #[test]
    #[cfg(feature = "gzip")]
    fn test_large_input_spans_output_buffers() {
        let input: Vec<u8> = (0..200_000u32).flat_map(|i| i.to_le_bytes()).collect();
        let mut stream = CodecStream::new(Codec::Gzip, 1);
        let mut out = Vec::new();

        stream.write(&input, &mut out).unwrap();
        stream.close(&mut out).unwrap();

        assert_eq!(decompress(Codec::Gzip, &out), input);
    }

    #[test]
    #[cfg(feature = "zstd")]
    fn test_flush_emits_decodable_prefix() {
        let mut stream = CodecStream::new(Codec::Zstd, 3);
        let mut out = Vec::new();

        stream.write(b"first chunk", &mut out).unwrap();
        stream.flush(&mut out).unwrap();
        assert!(!out.is_empty());

        stream.write(b", second chunk", &mut out).unwrap();
        stream.close(&mut out).unwrap();
        assert_eq!(decompress(Codec::Zstd, &out), b"first chunk, second chunk");
    }

    #[test]
    #[cfg(feature = "brotli")]
    fn test_write_after_close_fails() {
        let mut stream = CodecStream::new(Codec::Brotli, 5);
        let mut out = Vec::new();
        stream.close(&mut out).unwrap();

        assert!(stream.write(b"late", &mut out).is_err());
        // closing twice is harmless
        let len = out.len();
        stream.close(&mut out).unwrap();
        assert_eq!(out.len(), len);
    }

    #[test]
    #[cfg(feature = "brotli")]
    fn test_recycled_stream_starts_fresh() {
        let pool = Arc::new(Pool::new(|| CodecStream::new(Codec::Brotli, 5)));

        {
            // abandoned mid-stream: the recycle must not leak these bytes
            let mut stream = pool.acquire();
            stream.write(b"stale data", &mut Vec::new()).unwrap();
        }

        let mut stream = pool.acquire();
        let mut out = Vec::new();
        stream.write(b"fresh", &mut out).unwrap();
        stream.close(&mut out).unwrap();
        assert_eq!(decompress(Codec::Brotli, &out), b"fresh");
    }

    #[test]
    #[cfg(feature = "brotli")]
    fn test_sink_error_is_returned() {
        struct Broken;

        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::from(io::ErrorKind::ConnectionAborted))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut stream = CodecStream::new(Codec::Brotli, 5);
        stream.write(b"data", &mut Broken).ok();
        let err = stream.close(&mut Broken).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
    }
}
