//! Magic-byte format sniffing.
//!
//! Only formats with a known signature are let through to the pixel engine.
//! Anything else is [`ImageFormat::Other`] and must be rejected by the caller.
//!
//! Signatures are tested in a fixed priority order:
//!
//! | Format | Bytes |
//! |---|---|
//! | JPEG | `FF D8` |
//! | GIF | `GIF8` |
//! | PNG | `89 'PNG'` |
//! | WebP | `'RIFF' ???? 'WEBP'` |
//! | BMP | `'BM'` |
//! | HEIC | `00 00 00 ?? 'ftyp'` + brand `heic`, `heix` or `mif1` |

use serde::Serialize;
use std::fmt;

/// Number of leading bytes needed to classify a stream.
pub const SNIFF_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Gif,
    Png,
    Webp,
    Bmp,
    Heic,
    Other,
}

impl ImageFormat {
    /// Whether the format can carry an alpha channel in its encoded form.
    pub fn is_transparent(self) -> bool {
        matches!(self, Self::Png | Self::Webp | Self::Gif)
    }

    pub fn is_supported(self) -> bool {
        self != Self::Other
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Jpeg => "jpeg",
            Self::Gif => "gif",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
            Self::Heic => "heic",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Requested output format (`fo` parameter).
///
/// An empty token means "same as the input" and parses to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Webp,
    Png,
    Gif,
    Heic,
}

impl OutputFormat {
    /// Parse an `fo` token. Unknown tokens are `Err` with the token back.
    pub fn parse(token: &str) -> Result<Option<Self>, String> {
        match token.to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "jpg" | "jpeg" => Ok(Some(Self::Jpeg)),
            "webp" => Ok(Some(Self::Webp)),
            "png" => Ok(Some(Self::Png)),
            "gif" => Ok(Some(Self::Gif)),
            "heic" | "heif" => Ok(Some(Self::Heic)),
            _ => Err(token.to_string()),
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Webp => ImageFormat::Webp,
            Self::Png => ImageFormat::Png,
            Self::Gif => ImageFormat::Gif,
            Self::Heic => ImageFormat::Heic,
        }
    }
}

impl ImageFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Bmp => "image/bmp",
            Self::Heic => "image/heic",
            Self::Other => "application/octet-stream",
        }
    }

    /// Format actually written when `output` is requested for an input of
    /// this format.
    pub fn resolve_output(self, output: Option<OutputFormat>) -> ImageFormat {
        output.map_or(self, OutputFormat::image_format)
    }
}

const HEIF_BRANDS: [&[u8; 4]; 3] = [b"heic", b"heix", b"mif1"];

fn is_jpeg(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xFF, 0xD8])
}

fn is_gif(bytes: &[u8]) -> bool {
    bytes.starts_with(b"GIF8")
}

fn is_png(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0x89, b'P', b'N', b'G'])
}

fn is_webp(bytes: &[u8]) -> bool {
    bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP"
}

fn is_bmp(bytes: &[u8]) -> bool {
    bytes.starts_with(b"BM")
}

fn is_heic(bytes: &[u8]) -> bool {
    // An ftyp box this early is never larger than 16 MiB
    if bytes[0..3] != [0, 0, 0] {
        return false;
    }
    if &bytes[4..8] != b"ftyp" {
        return false;
    }
    HEIF_BRANDS.iter().any(|brand| &bytes[8..12] == *brand)
}

/// Classify a byte stream by its first [`SNIFF_LEN`] bytes.
///
/// Fewer than [`SNIFF_LEN`] bytes always yields [`ImageFormat::Other`].
pub fn detect_format(bytes: &[u8]) -> ImageFormat {
    if bytes.len() < SNIFF_LEN {
        return ImageFormat::Other;
    }

    if is_jpeg(bytes) {
        ImageFormat::Jpeg
    } else if is_gif(bytes) {
        ImageFormat::Gif
    } else if is_png(bytes) {
        ImageFormat::Png
    } else if is_webp(bytes) {
        ImageFormat::Webp
    } else if is_bmp(bytes) {
        ImageFormat::Bmp
    } else if is_heic(bytes) {
        ImageFormat::Heic
    } else {
        ImageFormat::Other
    }
}
