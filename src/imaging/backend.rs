//! Pixel engine trait and shared types.
//!
//! The planners decide *what* to do; an [`ImageEngine`] does the pixel work.
//! Every engine must support the same set of operations so the render
//! pipeline stays engine-agnostic:
//!
//! | Operation | Purpose |
//! |---|---|
//! | `probe` | Header-only size and format |
//! | `decode` | Full decode, optionally with a size hint |
//! | `resize` | Exact resize (aspect is the planner's job) |
//! | `crop` | Cut a source-space rectangle |
//! | `extent` | Grow to a canvas filled with a background, image at an offset |
//! | `composite` | Draw an overlay at a (possibly negative) offset |
//! | `annotate` | Draw one text pass |
//! | `flatten` | Merge transparency onto a background |
//! | `encode` | Serialize in a format at a quality |
//!
//! The production implementation is
//! [`RustEngine`](super::rust_backend::RustEngine), built on the `image` crate.

use super::format::ImageFormat;
use super::gravity::Gravity;
use super::params::Quality;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("Unsupported by this engine: {0}")]
    Unsupported(String),
    #[error("Invalid color: {0:?}")]
    InvalidColor(String),
}

/// Pixel size of an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn pixels(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Result of a probe: size and container format, no pixels decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Probe {
    pub dimensions: Dimensions,
    pub format: ImageFormat,
}

/// Integer crop rectangle handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Outline drawn around text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stroke {
    pub color: String,
    pub width: f64,
}

/// One text drawing pass.
///
/// `x`/`y` are offsets from the gravity anchor, pointing inward.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextPass {
    pub text: String,
    /// Candidate font names; the first one the engine knows wins.
    pub fonts: Vec<String>,
    pub font_size: f64,
    pub gravity: Gravity,
    pub x: f64,
    pub y: f64,
    pub fill: String,
    pub stroke: Option<Stroke>,
}

/// Trait for pixel engines.
///
/// Images are opaque handles owned by the caller; every mutating operation
/// takes the handle by `&mut`. Engines must be `Sync` so one instance can
/// serve a rayon pool.
pub trait ImageEngine: Sync {
    type Image;

    /// Read size and format from the header.
    fn probe(&self, bytes: &[u8]) -> Result<Probe, EngineError>;

    /// Decode the first frame. `hint` is a lower bound on the size the
    /// caller needs; engines may decode smaller than full size down to it.
    fn decode(&self, bytes: &[u8], hint: Option<Dimensions>) -> Result<Self::Image, EngineError>;

    fn dimensions(&self, image: &Self::Image) -> Dimensions;

    /// Resize to exactly `size`, ignoring aspect ratio.
    fn resize(&self, image: &mut Self::Image, size: Dimensions) -> Result<(), EngineError>;

    fn crop(&self, image: &mut Self::Image, rect: CropBox) -> Result<(), EngineError>;

    /// Grow the image to `canvas`, placing the current pixels at (`x`, `y`)
    /// and filling the rest with `background`.
    fn extent(
        &self,
        image: &mut Self::Image,
        canvas: Dimensions,
        x: u32,
        y: u32,
        background: &str,
    ) -> Result<(), EngineError>;

    /// Alpha-blend `overlay` onto `image` at (`x`, `y`); may hang off any edge.
    fn composite(
        &self,
        image: &mut Self::Image,
        overlay: &Self::Image,
        x: i32,
        y: i32,
    ) -> Result<(), EngineError>;

    fn annotate(&self, image: &mut Self::Image, pass: &TextPass) -> Result<(), EngineError>;

    /// Replace transparency with `background`.
    fn flatten(&self, image: &mut Self::Image, background: &str) -> Result<(), EngineError>;

    fn encode(
        &self,
        image: &Self::Image,
        format: ImageFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, EngineError>;
}
