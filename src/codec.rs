#[cfg(feature = "brotli")]
use compression_codecs::brotli::{BrotliEncoder, params::EncoderParams as BrotliParams};
#[cfg(feature = "deflate")]
use compression_codecs::zlib::ZlibEncoder;
#[cfg(feature = "gzip")]
use compression_codecs::gzip::GzipEncoder;
#[cfg(feature = "zstd")]
use compression_codecs::zstd::ZstdEncoder;
use compression_codecs::EncodeV2;
#[cfg(any(feature = "brotli", feature = "gzip", feature = "deflate"))]
use compression_core::Level;
use std::fmt;
use std::ops::RangeInclusive;

#[cfg(not(any(
    feature = "brotli",
    feature = "gzip",
    feature = "deflate",
    feature = "zstd"
)))]
compile_error!("at least one of the `brotli`, `gzip`, `deflate` or `zstd` features must be enabled");

/// Fastest Brotli quality.
pub const BROTLI_BEST_SPEED: i32 = 0;
/// Smallest-output Brotli quality.
pub const BROTLI_BEST_COMPRESSION: i32 = 11;
/// Brotli quality used when none (or an out-of-range one) is configured.
pub const BROTLI_DEFAULT_LEVEL: i32 = 6;

/// The compression codec a [`Compression`](crate::Compression) instance applies.
///
/// Only one codec is active per instance; requests that do not advertise its
/// token in `Accept-Encoding` are left uncompressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Zstd compression.
    #[cfg(feature = "zstd")]
    Zstd,
    /// Brotli compression.
    #[cfg(feature = "brotli")]
    Brotli,
    /// Gzip compression.
    #[cfg(feature = "gzip")]
    Gzip,
    /// Deflate compression.
    #[cfg(feature = "deflate")]
    Deflate,
}

impl Codec {
    /// Returns the Content-Encoding header value for this codec.
    pub fn content_encoding(&self) -> &'static str {
        match self {
            #[cfg(feature = "zstd")]
            Codec::Zstd => "zstd",
            #[cfg(feature = "brotli")]
            Codec::Brotli => "br",
            #[cfg(feature = "gzip")]
            Codec::Gzip => "gzip",
            #[cfg(feature = "deflate")]
            Codec::Deflate => "deflate",
        }
    }

    /// Returns the range of compression levels this codec accepts.
    pub fn level_range(&self) -> RangeInclusive<i32> {
        match self {
            #[cfg(feature = "zstd")]
            Codec::Zstd => 1..=22,
            #[cfg(feature = "brotli")]
            Codec::Brotli => BROTLI_BEST_SPEED..=BROTLI_BEST_COMPRESSION,
            #[cfg(feature = "gzip")]
            Codec::Gzip => 0..=9,
            #[cfg(feature = "deflate")]
            Codec::Deflate => 0..=9,
        }
    }

    /// Returns the level used when none is configured.
    pub fn default_level(&self) -> i32 {
        match self {
            #[cfg(feature = "zstd")]
            Codec::Zstd => 3,
            #[cfg(feature = "brotli")]
            Codec::Brotli => BROTLI_DEFAULT_LEVEL,
            #[cfg(feature = "gzip")]
            Codec::Gzip => 6,
            #[cfg(feature = "deflate")]
            Codec::Deflate => 6,
        }
    }

    /// Returns `level` if the codec supports it, otherwise the default level.
    pub fn normalize_level(&self, level: i32) -> i32 {
        if self.level_range().contains(&level) {
            level
        } else {
            self.default_level()
        }
    }

    /// Creates a new encoder for this codec at the given level.
    ///
    /// The level is expected to be normalized already.
    pub(crate) fn encoder(&self, level: i32) -> Box<dyn EncodeV2 + Send> {
        match self {
            #[cfg(feature = "zstd")]
            Codec::Zstd => Box::new(ZstdEncoder::new(level)),
            #[cfg(feature = "brotli")]
            Codec::Brotli => Box::new(BrotliEncoder::new(
                BrotliParams::default().quality(Level::Precise(level)),
            )),
            #[cfg(feature = "gzip")]
            Codec::Gzip => Box::new(GzipEncoder::new(Level::Precise(level).into())),
            #[cfg(feature = "deflate")]
            // zlib-wrapped, as `Content-Encoding: deflate` requires
            Codec::Deflate => Box::new(ZlibEncoder::new(Level::Precise(level).into())),
        }
    }

    /// Whether `encoding` (a single Accept-Encoding token) names this codec.
    fn matches_token(&self, encoding: &str) -> bool {
        match self {
            #[cfg(feature = "zstd")]
            Codec::Zstd => encoding.eq_ignore_ascii_case("zstd"),
            #[cfg(feature = "brotli")]
            Codec::Brotli => {
                encoding.eq_ignore_ascii_case("br") || encoding.eq_ignore_ascii_case("brotli")
            }
            #[cfg(feature = "gzip")]
            Codec::Gzip => {
                encoding.eq_ignore_ascii_case("gzip") || encoding.eq_ignore_ascii_case("x-gzip")
            }
            #[cfg(feature = "deflate")]
            Codec::Deflate => encoding.eq_ignore_ascii_case("deflate"),
        }
    }

    /// Checks whether an Accept-Encoding header value allows this codec.
    ///
    /// The header value is expected to be comma-separated encodings with optional
    /// quality values (e.g., "gzip, br;q=1.0, zstd;q=0.8"). An explicit entry for
    /// the codec wins over a `*` wildcard, and `q=0` means "not acceptable".
    pub fn accepted_by(&self, accept_encoding: &str) -> bool {
        let mut wildcard = false;

        for part in accept_encoding.split(',') {
            let (encoding, quality) = parse_encoding_with_quality(part.trim());

            if self.matches_token(encoding) {
                return quality > 0.0;
            }
            if encoding == "*" {
                wildcard = quality > 0.0;
            }
        }

        wildcard
    }
}

impl Default for Codec {
    fn default() -> Self {
        #[cfg(feature = "brotli")]
        let codec = Codec::Brotli;
        #[cfg(all(not(feature = "brotli"), feature = "gzip"))]
        let codec = Codec::Gzip;
        #[cfg(all(not(feature = "brotli"), not(feature = "gzip"), feature = "zstd"))]
        let codec = Codec::Zstd;
        #[cfg(all(
            not(feature = "brotli"),
            not(feature = "gzip"),
            not(feature = "zstd"),
            feature = "deflate"
        ))]
        let codec = Codec::Deflate;
        codec
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.content_encoding())
    }
}

/// Parses an encoding entry like "gzip" or "br;q=0.8" into (encoding, quality).
fn parse_encoding_with_quality(s: &str) -> (&str, f32) {
    let mut parts = s.splitn(2, ';');
    let encoding = parts.next().unwrap_or("").trim();

    let quality = parts
        .next()
        .and_then(|q| {
            let q = q.trim();
            if q.starts_with("q=") || q.starts_with("Q=") {
                q[2..].trim().parse::<f32>().ok()
            } else {
                None
            }
        })
        .unwrap_or(1.0);

    (encoding, quality)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(all(feature = "zstd", feature = "brotli", feature = "gzip", feature = "deflate"))]
    fn test_content_encoding() {
        assert_eq!(Codec::Zstd.content_encoding(), "zstd");
        assert_eq!(Codec::Brotli.content_encoding(), "br");
        assert_eq!(Codec::Gzip.content_encoding(), "gzip");
        assert_eq!(Codec::Deflate.content_encoding(), "deflate");
    }

    #[test]
    #[cfg(feature = "brotli")]
    fn test_default_is_brotli() {
        assert_eq!(Codec::default(), Codec::Brotli);
        assert_eq!(Codec::default().to_string(), "br");
    }

    #[test]
    #[cfg(feature = "brotli")]
    fn test_accepted_by_simple() {
        assert!(Codec::Brotli.accepted_by("br"));
        assert!(Codec::Brotli.accepted_by("gzip, deflate, br"));
        assert!(Codec::Brotli.accepted_by("BR"));
        assert!(!Codec::Brotli.accepted_by("gzip, deflate"));
        assert!(!Codec::Brotli.accepted_by(""));
    }

    #[test]
    #[cfg(feature = "gzip")]
    fn test_accepted_by_alias() {
        assert!(Codec::Gzip.accepted_by("x-gzip"));
        assert!(Codec::Gzip.accepted_by("identity, x-gzip;q=0.5"));
    }

    #[test]
    #[cfg(feature = "brotli")]
    fn test_accepted_by_quality_zero() {
        assert!(!Codec::Brotli.accepted_by("br;q=0"));
        assert!(!Codec::Brotli.accepted_by("gzip, br;q=0.0"));
        assert!(Codec::Brotli.accepted_by("gzip;q=0, br;q=0.1"));
    }

    #[test]
    #[cfg(feature = "brotli")]
    fn test_accepted_by_wildcard() {
        assert!(Codec::Brotli.accepted_by("*"));
        assert!(Codec::Brotli.accepted_by("gzip, *;q=0.2"));
        assert!(!Codec::Brotli.accepted_by("*;q=0"));
        // An explicit refusal beats the wildcard.
        assert!(!Codec::Brotli.accepted_by("br;q=0, *"));
    }

    #[test]
    #[cfg(feature = "brotli")]
    fn test_accepted_by_substring_is_not_a_match() {
        // "brx" merely contains "br"
        assert!(!Codec::Brotli.accepted_by("brx, gzip"));
    }

    #[test]
    #[cfg(feature = "brotli")]
    fn test_normalize_level() {
        assert_eq!(Codec::Brotli.normalize_level(5), 5);
        assert_eq!(Codec::Brotli.normalize_level(0), 0);
        assert_eq!(Codec::Brotli.normalize_level(11), 11);
        assert_eq!(Codec::Brotli.normalize_level(-4), BROTLI_DEFAULT_LEVEL);
        assert_eq!(Codec::Brotli.normalize_level(12), BROTLI_DEFAULT_LEVEL);
    }

    #[test]
    #[cfg(feature = "zstd")]
    fn test_zstd_level_range() {
        assert_eq!(Codec::Zstd.normalize_level(0), 3);
        assert_eq!(Codec::Zstd.normalize_level(19), 19);
    }

    #[test]
    fn test_parse_encoding_with_quality() {
        assert_eq!(parse_encoding_with_quality("gzip"), ("gzip", 1.0));
        assert_eq!(parse_encoding_with_quality("br;q=0.8"), ("br", 0.8));
        assert_eq!(parse_encoding_with_quality("br; Q=0.5"), ("br", 0.5));
        assert_eq!(parse_encoding_with_quality("br;level=3"), ("br", 1.0));
    }
}
