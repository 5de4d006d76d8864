//! Pure Rust pixel engine on top of the `image` crate.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Probe | `ImageReader::with_guessed_format` + `into_dimensions` |
//! | Probe HEIC | primary item `ispe` via [`heif`](super::heif) |
//! | Decode (JPEG, PNG, GIF, WebP, BMP) | `image` crate (pure Rust decoders) |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Crop | `DynamicImage::crop_imm` |
//! | Extent / flatten / composite | `imageops::overlay` onto a filled `RgbaImage` |
//! | Encode JPEG | `JpegEncoder::new_with_quality` |
//! | Encode WebP | `WebPEncoder::new_lossless` (quality is ignored) |
//! | Encode PNG / GIF / BMP | `image` crate encoders |
//!
//! HEIC pixels and text rasterization are not available; those operations
//! return [`EngineError::Unsupported`].

use super::backend::{CropBox, Dimensions, EngineError, ImageEngine, Probe, TextPass};
use super::format::{ImageFormat, detect_format};
use super::heif::primary_image_size;
use super::params::Quality;
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Frame, ImageReader, Rgba, RgbaImage};
use log::debug;
use std::io::Cursor;

/// Pure Rust engine using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustEngine;

impl RustEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn hex_digit(c: u8) -> Option<u8> {
    (c as char).to_digit(16).map(|d| d as u8)
}

/// Parse `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa` or a few color names.
pub fn parse_color(color: &str) -> Result<Rgba<u8>, EngineError> {
    let invalid = || EngineError::InvalidColor(color.to_string());
    match color.to_ascii_lowercase().as_str() {
        "white" => return Ok(Rgba([255, 255, 255, 255])),
        "black" => return Ok(Rgba([0, 0, 0, 255])),
        "transparent" | "none" => return Ok(Rgba([0, 0, 0, 0])),
        _ => {}
    }

    let hex = color.strip_prefix('#').ok_or_else(invalid)?.as_bytes();
    let digits: Vec<u8> = hex
        .iter()
        .map(|&c| hex_digit(c))
        .collect::<Option<_>>()
        .ok_or_else(invalid)?;

    let channels: Vec<u8> = match digits.len() {
        3 | 4 => digits.iter().map(|d| d * 17).collect(),
        6 | 8 => digits.chunks(2).map(|p| p[0] * 16 + p[1]).collect(),
        _ => return Err(invalid()),
    };
    let alpha = channels.get(3).copied().unwrap_or(255);
    Ok(Rgba([channels[0], channels[1], channels[2], alpha]))
}

fn filled(size: Dimensions, background: &str) -> Result<RgbaImage, EngineError> {
    let color = parse_color(background)?;
    Ok(RgbaImage::from_pixel(size.width, size.height, color))
}

fn codec_error(context: &str, e: image::ImageError) -> EngineError {
    EngineError::ProcessingFailed(format!("{context}: {e}"))
}

impl ImageEngine for RustEngine {
    type Image = DynamicImage;

    fn probe(&self, bytes: &[u8]) -> Result<Probe, EngineError> {
        let format = detect_format(bytes);
        if format == ImageFormat::Heic {
            // Size comes from the primary item's ispe box; pixels stay undecodable
            let (width, height) = primary_image_size(bytes)
                .map_err(|e| EngineError::ProcessingFailed(format!("HEIF: {e}")))?
                .ok_or_else(|| {
                    EngineError::ProcessingFailed("HEIF primary item has no ispe".to_string())
                })?;
            return Ok(Probe {
                dimensions: Dimensions { width, height },
                format,
            });
        }
        let (width, height) = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .into_dimensions()
            .map_err(|e| codec_error("Failed to read dimensions", e))?;
        Ok(Probe {
            dimensions: Dimensions { width, height },
            format,
        })
    }

    fn decode(&self, bytes: &[u8], hint: Option<Dimensions>) -> Result<DynamicImage, EngineError> {
        if let Some(hint) = hint {
            // The image crate has no scaled decode; the hint only saves work
            // for engines that do.
            debug!("Ignoring decode hint {}x{}", hint.width, hint.height);
        }
        if detect_format(bytes) == ImageFormat::Heic {
            return Err(EngineError::Unsupported("HEIC decoding".to_string()));
        }
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .decode()
            .map_err(|e| codec_error("Failed to decode", e))
    }

    fn dimensions(&self, image: &DynamicImage) -> Dimensions {
        Dimensions {
            width: image.width(),
            height: image.height(),
        }
    }

    fn resize(&self, image: &mut DynamicImage, size: Dimensions) -> Result<(), EngineError> {
        if size.width == 0 || size.height == 0 {
            return Err(EngineError::ProcessingFailed(format!(
                "Cannot resize to {}x{}",
                size.width, size.height
            )));
        }
        *image = image.resize_exact(size.width, size.height, FilterType::Lanczos3);
        Ok(())
    }

    fn crop(&self, image: &mut DynamicImage, rect: CropBox) -> Result<(), EngineError> {
        if rect.x >= image.width() || rect.y >= image.height() {
            return Err(EngineError::ProcessingFailed(format!(
                "Crop origin ({}, {}) outside {}x{} image",
                rect.x,
                rect.y,
                image.width(),
                image.height()
            )));
        }
        *image = image.crop_imm(rect.x, rect.y, rect.width, rect.height);
        Ok(())
    }

    fn extent(
        &self,
        image: &mut DynamicImage,
        canvas: Dimensions,
        x: u32,
        y: u32,
        background: &str,
    ) -> Result<(), EngineError> {
        let mut base = filled(canvas, background)?;
        imageops::overlay(&mut base, &image.to_rgba8(), x as i64, y as i64);
        *image = DynamicImage::ImageRgba8(base);
        Ok(())
    }

    fn composite(
        &self,
        image: &mut DynamicImage,
        overlay: &DynamicImage,
        x: i32,
        y: i32,
    ) -> Result<(), EngineError> {
        let mut base = image.to_rgba8();
        imageops::overlay(&mut base, &overlay.to_rgba8(), x as i64, y as i64);
        *image = DynamicImage::ImageRgba8(base);
        Ok(())
    }

    fn annotate(&self, _image: &mut DynamicImage, _pass: &TextPass) -> Result<(), EngineError> {
        Err(EngineError::Unsupported("text annotation".to_string()))
    }

    fn flatten(&self, image: &mut DynamicImage, background: &str) -> Result<(), EngineError> {
        let size = self.dimensions(image);
        let mut base = filled(size, background)?;
        imageops::overlay(&mut base, &image.to_rgba8(), 0, 0);
        *image = DynamicImage::ImageRgba8(base);
        Ok(())
    }

    fn encode(
        &self,
        image: &DynamicImage,
        format: ImageFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, EngineError> {
        let mut buf = Vec::new();
        match format {
            ImageFormat::Jpeg => {
                let q = quality.value().clamp(1, 100) as u8;
                DynamicImage::ImageRgb8(image.to_rgb8())
                    .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, q))
                    .map_err(|e| codec_error("JPEG encode failed", e))?;
            }
            ImageFormat::Webp => {
                DynamicImage::ImageRgba8(image.to_rgba8())
                    .write_with_encoder(WebPEncoder::new_lossless(&mut buf))
                    .map_err(|e| codec_error("WebP encode failed", e))?;
            }
            ImageFormat::Png => {
                image
                    .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
                    .map_err(|e| codec_error("PNG encode failed", e))?;
            }
            ImageFormat::Gif => {
                let mut encoder = GifEncoder::new(&mut buf);
                encoder
                    .encode_frame(Frame::new(image.to_rgba8()))
                    .map_err(|e| codec_error("GIF encode failed", e))?;
            }
            ImageFormat::Bmp => {
                DynamicImage::ImageRgba8(image.to_rgba8())
                    .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Bmp)
                    .map_err(|e| codec_error("BMP encode failed", e))?;
            }
            ImageFormat::Heic => return Err(EngineError::Unsupported("HEIC encoding".to_string())),
            ImageFormat::Other => {
                return Err(EngineError::Unsupported("unknown output format".to_string()));
            }
        }
        Ok(buf)
    }
}
