//! Thumbnail request parameters.
//!
//! A request arrives as a path like
//!
//! ```text
//! /url=photo.jpg,io=logo.png?w=200&h=100&cm=1&g=5
//! ```
//!
//! Segments before `?` are separated by `,`, segments after it by `&`. Every
//! non-empty segment must be `name=value`; values are form-url-decoded.
//!
//! | Key | Type | Meaning |
//! |---|---|---|
//! | `w`, `h` | int | Target width / height, 0 = derive |
//! | `q` | int | Quality 0-100 |
//! | `u` | int | Upscale when non-zero |
//! | `a` | int | Force aspect (fit mode) when non-zero |
//! | `g` | int | Gravity 0-9 |
//! | `cm` | int | Crop mode 0 fit, 1 crop, 2 margin |
//! | `cal` | ratio | Crop area limitation |
//! | `url` | string | Source image URL |
//! | `io` | string | Overlay image URL |
//! | `iow`, `ioh` | ratio | Overlay size relative to the image |
//! | `iox`, `ioy` | ratio | Overlay position |
//! | `iog` | int | Overlay gravity, overrides `iox`/`ioy` |
//! | `t` | string | Annotation text |
//! | `tg` | int | Text gravity (default 9) |
//! | `tm` | int | Text margin |
//! | `ts` | float | Font size (default 10) |
//! | `tc` | color | Text color; unset draws white text with a black outline |
//! | `tf` | list | Comma-separated font names |
//! | `bg` | color | Background |
//! | `fo` | token | Output format: jpg, jpeg, webp, png, gif, heic, heif |
//!
//! Ratios must parse as floats no greater than 1. Unknown keys are ignored.
//! Defaults come from [`ServiceConfig`].

use crate::config::ServiceConfig;
use crate::imaging::{CropMode, Gravity, ImageFormat, OutputFormat, OverlayOptions, Quality};
use crate::imaging::text::DEFAULT_FONT_SIZE;
use serde::Serialize;
use std::net::IpAddr;
use thiserror::Error;

const DEFAULT_SCHEME: &str = "http";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("Path should start with /")]
    MissingLeadingSlash,
    #[error("Arguments must have the form name=value: {0:?}")]
    MalformedArgument(String),
    #[error("Invalid integer value for {0}")]
    InvalidInteger(String),
    #[error("Invalid float value for {0}")]
    InvalidFloat(String),
    #[error("Value for {0} must not be greater than 1")]
    RatioTooLarge(String),
    #[error("Invalid gravity for {key}: {value} (expected 0-9)")]
    InvalidGravity { key: String, value: i64 },
    #[error("Unknown output format {0:?}")]
    UnknownOutputFormat(String),
    #[error("Width (w) invalid: {0} exceeds {1}")]
    WidthTooLarge(u32, u32),
    #[error("Height (h) invalid: {0} exceeds {1}")]
    HeightTooLarge(u32, u32),
    #[error("Image dimensions are insane: {0} pixels exceeds {1}")]
    TooManyPixels(u64, u64),
    #[error("Quality must be between 0 and 100, got {0}")]
    InvalidQuality(i64),
    #[error("Invalid color for {key}: {value:?}")]
    InvalidColor { key: String, value: String },
}

/// One thumbnail request, fully defaulted and validated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThumbnailRequest {
    pub url: String,
    /// Target width, 0 = derive from height (or keep source size).
    pub width: u32,
    /// Target height, 0 = derive from width (or keep source size).
    pub height: u32,
    pub quality: Quality,
    pub upscale: bool,
    pub force_aspect: bool,
    pub crop_mode: CropMode,
    pub gravity: Option<Gravity>,
    /// Floor in `[0, 1]` for crop-to-source aspect ratio; 0 disables it.
    pub crop_area_limitation: f64,
    pub overlay_url: Option<String>,
    pub overlay: OverlayOptions,
    pub text: String,
    pub text_gravity: Option<Gravity>,
    pub text_font_size: f64,
    pub text_margin: i64,
    /// Empty means outlined white text.
    pub text_color: String,
    pub text_fonts: Vec<String>,
    pub background: String,
    pub output_format: Option<OutputFormat>,
    /// Source images larger than this many pixels are refused.
    pub max_pixels: u64,
}

impl Default for ThumbnailRequest {
    fn default() -> Self {
        Self::from_config(&ServiceConfig::default())
    }
}

impl ThumbnailRequest {
    /// A request with no parameters applied yet.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            url: String::new(),
            width: 0,
            height: 0,
            quality: Quality::new(config.image.compression_quality),
            upscale: false,
            force_aspect: false,
            crop_mode: CropMode::from_code(config.image.crop_mode),
            gravity: Gravity::from_code(config.image.gravity),
            crop_area_limitation: 0.0,
            overlay_url: None,
            overlay: OverlayOptions::default(),
            text: String::new(),
            text_gravity: Some(Gravity::SouthEast),
            text_font_size: DEFAULT_FONT_SIZE,
            text_margin: 0,
            text_color: String::new(),
            text_fonts: config.font.names.clone(),
            background: config.image.background_color.clone(),
            output_format: None,
            max_pixels: config.limits.max_pixels,
        }
    }

    /// Background to use for an input of `input` format: `#RRGGBBAA` loses
    /// its alpha when the output cannot carry transparency.
    pub fn effective_background(&self, input: ImageFormat) -> &str {
        let output = input.resolve_output(self.output_format);
        let bg = self.background.as_str();
        match bg.strip_prefix('#') {
            Some(hex) if !output.is_transparent() && hex.len() == 8 && is_hex_color(hex) => {
                &bg[..7]
            }
            _ => bg,
        }
    }

    /// Whether text is drawn with the default outline.
    pub fn outlined_text(&self) -> bool {
        self.text_color.is_empty()
    }
}

/// Request path for a parameter string, adding the leading `/?` a bare
/// query string lacks.
pub fn request_path(params: &str) -> String {
    if params.starts_with('/') {
        params.to_string()
    } else {
        format!("/?{params}")
    }
}

/// Split a request path into raw `name=value` segments.
fn segments(path: &str) -> Result<Vec<(String, String)>, RequestError> {
    let rest = path
        .strip_prefix('/')
        .ok_or(RequestError::MissingLeadingSlash)?;
    let (head, query) = match rest.split_once('?') {
        Some((head, query)) => (head, Some(query)),
        None => (rest, None),
    };

    let pieces = head.split(',').chain(query.into_iter().flat_map(|q| q.split('&')));
    let mut out = Vec::new();
    for piece in pieces.filter(|p| !p.is_empty()) {
        if !piece.contains('=') {
            return Err(RequestError::MalformedArgument(piece.to_string()));
        }
        // A literal `&` before the `?` belongs to the value
        let escaped = piece.replace('&', "%26");
        if let Some((name, value)) = form_urlencoded::parse(escaped.as_bytes()).next() {
            out.push((name.into_owned(), value.into_owned()));
        }
    }
    Ok(out)
}

fn parse_int(key: &str, value: &str) -> Result<i64, RequestError> {
    value
        .trim()
        .parse()
        .map_err(|_| RequestError::InvalidInteger(key.to_string()))
}

fn parse_float(key: &str, value: &str) -> Result<f64, RequestError> {
    value
        .trim()
        .parse()
        .map_err(|_| RequestError::InvalidFloat(key.to_string()))
}

fn parse_ratio(key: &str, value: &str) -> Result<f64, RequestError> {
    let ratio = parse_float(key, value)?;
    if ratio > 1.0 {
        return Err(RequestError::RatioTooLarge(key.to_string()));
    }
    Ok(ratio)
}

fn parse_gravity(key: &str, code: i64) -> Result<Option<Gravity>, RequestError> {
    match code {
        0 => Ok(None),
        1..=9 => Ok(Gravity::from_code(code)),
        _ => Err(RequestError::InvalidGravity {
            key: key.to_string(),
            value: code,
        }),
    }
}

fn dimension(key: &str, value: i64) -> Result<u32, RequestError> {
    u32::try_from(value).map_err(|_| RequestError::InvalidInteger(key.to_string()))
}

/// Parse a request path against `config` defaults and validate it.
pub fn parse_params(path: &str, config: &ServiceConfig) -> Result<ThumbnailRequest, RequestError> {
    let mut request = ThumbnailRequest::from_config(config);
    let mut quality = config.image.compression_quality as i64;

    for (key, value) in segments(path)? {
        match key.as_str() {
            "w" | "h" | "q" | "u" | "a" | "g" | "tg" | "tm" | "cm" | "iog" => {
                let n = parse_int(&key, &value)?;
                match key.as_str() {
                    "w" => request.width = dimension(&key, n)?,
                    "h" => request.height = dimension(&key, n)?,
                    "q" => quality = n,
                    "u" => request.upscale = n != 0,
                    "a" => request.force_aspect = n != 0,
                    "g" => request.gravity = parse_gravity(&key, n)?,
                    "tg" => request.text_gravity = parse_gravity(&key, n)?,
                    "tm" => request.text_margin = n,
                    "cm" => request.crop_mode = CropMode::from_code(n),
                    _ => request.overlay.gravity = parse_gravity(&key, n)?,
                }
            }
            "iow" | "ioh" | "iox" | "ioy" | "cal" => {
                let ratio = parse_ratio(&key, &value)?;
                match key.as_str() {
                    "iow" => request.overlay.width_ratio = ratio,
                    "ioh" => request.overlay.height_ratio = ratio,
                    "iox" => request.overlay.x_ratio = ratio,
                    "ioy" => request.overlay.y_ratio = ratio,
                    _ => request.crop_area_limitation = ratio,
                }
            }
            "ts" => request.text_font_size = parse_float(&key, &value)?,
            "t" => request.text = value,
            "url" => request.url = value,
            "io" => request.overlay_url = Some(value),
            "bg" => request.background = value,
            "tf" => request.text_fonts = value.split(',').map(str::to_string).collect(),
            "tc" => request.text_color = value,
            "fo" => {
                request.output_format =
                    OutputFormat::parse(&value).map_err(RequestError::UnknownOutputFormat)?
            }
            _ => {}
        }
    }

    request.background = canonical_color(&request.background);
    request.text_color = canonical_color(&request.text_color);
    check_color("bg", &request.background)?;
    check_color("tc", &request.text_color)?;

    if !(0..=100).contains(&quality) {
        return Err(RequestError::InvalidQuality(quality));
    }
    request.quality = Quality::new(quality as u32);

    validate_dimensions(&request, config)?;
    Ok(request)
}

/// Check the target size against the configured ceilings.
pub fn validate_dimensions(
    request: &ThumbnailRequest,
    config: &ServiceConfig,
) -> Result<(), RequestError> {
    let max = config.limits.max_dimension;
    if request.width > max {
        return Err(RequestError::WidthTooLarge(request.width, max));
    }
    if request.height > max {
        return Err(RequestError::HeightTooLarge(request.height, max));
    }
    let pixels = request.width as u64 * request.height as u64;
    if pixels > config.limits.max_pixels {
        return Err(RequestError::TooManyPixels(pixels, config.limits.max_pixels));
    }
    Ok(())
}

/// A `#` value must be followed by 3, 4, 6 or 8 hex digits. Named colors
/// are left for the engine to resolve.
fn check_color(key: &str, color: &str) -> Result<(), RequestError> {
    match color.strip_prefix('#') {
        Some(hex) if !is_hex_color(hex) => Err(RequestError::InvalidColor {
            key: key.to_string(),
            value: color.to_string(),
        }),
        _ => Ok(()),
    }
}

fn is_hex_color(color: &str) -> bool {
    matches!(color.len(), 3 | 4 | 6 | 8) && color.bytes().all(|c| c.is_ascii_hexdigit())
}

/// Prefix `#` to a value that looks like bare hex (3, 4, 6 or 8 digits).
pub fn canonical_color(color: &str) -> String {
    if !color.starts_with('#') && is_hex_color(color) {
        format!("#{color}")
    } else {
        color.to_string()
    }
}

fn scheme_of(referer: &str) -> &str {
    match referer.split_once(':') {
        Some((scheme, _))
            if !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) =>
        {
            scheme
        }
        _ => DEFAULT_SCHEME,
    }
}

/// Normalize an image URL.
///
/// - `//host/x` takes the referer's scheme (`http` when there is none).
/// - `http:`/`https:` followed by any number of slashes becomes `scheme://`.
/// - Anything else is treated as scheme-less and gets `http://`.
///
/// Provided for the serving layer, which fetches `url` and `io`; the CLI
/// reads local files and never calls it.
pub fn canonical_url(url: &str, referer: &str) -> String {
    if url.starts_with("//") {
        return format!("{}:{url}", scheme_of(referer));
    }
    match url.split_once(':') {
        Some((scheme @ ("http" | "https"), rest)) => {
            format!("{scheme}://{}", rest.trim_start_matches('/'))
        }
        _ => format!("http://{url}"),
    }
}

/// Whether a canonical URL points at this machine.
///
/// The serving layer refuses to fetch from these. Like [`canonical_url`]
/// this is API for a server embedding the crate, not used by the CLI.
pub fn is_forbidden_host(url: &str) -> bool {
    let after_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = after_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = if let Some(bracketed) = host_port.strip_prefix('[') {
        bracketed.split(']').next().unwrap_or_default()
    } else {
        host_port.split(':').next().unwrap_or_default()
    };

    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.parse::<IpAddr>()
        .map(|ip| ip.is_loopback() || ip.is_unspecified())
        .unwrap_or(false)
}
