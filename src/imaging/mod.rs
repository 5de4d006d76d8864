//! Image processing: container parsing, geometry planning and the pixel engine.
//!
//! | Concern | Module |
//! |---|---|
//! | **Sniff** | [`format`]: magic-byte classification |
//! | **GIF** | [`gif`]: cut an animation down to its first frame |
//! | **HEIF** | [`heif`]: box tree parsing, `ispe` size patching |
//! | **Plan** | `calculations`: fit / crop / margin geometry |
//! | **Overlay** | [`overlay`]: overlay scale and offset |
//! | **Text** | [`text`]: text anchor and halo offsets |
//! | **Pixels** | [`backend`]: [`ImageEngine`] trait, [`RustEngine`] |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageEngine`] trait + [`RustEngine`]
//! - **Operations**: [`render`], combining calculations + backend

pub mod backend;
mod calculations;
pub mod format;
pub mod gif;
pub mod gravity;
pub mod heif;
pub mod operations;
pub mod overlay;
mod params;
pub mod rust_backend;
pub mod text;

pub use backend::{Dimensions, EngineError, ImageEngine};
pub use calculations::{complete_size, plan_transform};
pub use format::{ImageFormat, OutputFormat, detect_format};
pub use gravity::Gravity;
pub use operations::{RenderOutcome, Rendered, ThumbnailError, prepare, render};
pub use overlay::{OverlayOptions, plan_overlay};
pub use params::{
    CropMode, CropRect, Layout, OverlayPlacement, PlanOutcome, Quality, Size, SkipReason,
    TextPlacement, TransformPlan,
};
pub use rust_backend::RustEngine;
pub use text::plan_text;
