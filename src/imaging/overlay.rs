//! Overlay image scaling and placement.
//!
//! The overlay is composited onto the resized base image before any margin
//! is added, so every ratio here is relative to the *mapped* region.

use super::backend::Dimensions;
use super::gravity::Gravity;
use super::params::{OverlayPlacement, Size, round_i32, round_u32};
use serde::Serialize;

/// Overlay knobs from the request (`iow`, `ioh`, `iox`, `ioy`, `iog`).
///
/// A ratio of 0 means "unset".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OverlayOptions {
    pub width_ratio: f64,
    pub height_ratio: f64,
    pub x_ratio: f64,
    pub y_ratio: f64,
    /// Overrides `x_ratio`/`y_ratio` when set.
    pub gravity: Option<Gravity>,
}

/// Scale factors for the overlay on each axis.
///
/// - Neither ratio: follow the base image's own scale (`mapped / source`).
/// - One ratio: size that axis relative to the mapped region and scale the
///   other uniformly.
/// - Both ratios: each axis independently. The overlay's aspect ratio is
///   intentionally not preserved in this case.
fn scale_factors(
    options: &OverlayOptions,
    mapped: Size,
    source: Size,
    overlay: Size,
) -> (f64, f64) {
    match (options.width_ratio != 0.0, options.height_ratio != 0.0) {
        (false, false) => {
            let scale = mapped.width / source.width;
            (scale, scale)
        }
        (true, false) => {
            let scale = options.width_ratio * mapped.width / overlay.width;
            (scale, scale)
        }
        (false, true) => {
            let scale = options.height_ratio * mapped.height / overlay.height;
            (scale, scale)
        }
        (true, true) => (
            options.width_ratio * mapped.width / overlay.width,
            options.height_ratio * mapped.height / overlay.height,
        ),
    }
}

/// Size and position the overlay on a base image whose visible region is
/// `mapped`, scaled down from `source`.
///
/// Offsets are `ratio * (mapped - overlay)` per axis and are not clamped; a
/// ratio outside `[0, 1]` or an overlay larger than the base places it
/// partly off-canvas.
pub fn plan_overlay(
    options: &OverlayOptions,
    mapped: Size,
    source: Dimensions,
    overlay: Dimensions,
) -> OverlayPlacement {
    let source = Size::from(source);
    let overlay = Size::from(overlay);
    let (x_scale, y_scale) = scale_factors(options, mapped, source, overlay);

    let width = round_u32(x_scale * overlay.width);
    let height = round_u32(y_scale * overlay.height);

    let (x_ratio, y_ratio) = match options.gravity {
        Some(gravity) => (gravity.horizontal(), gravity.vertical()),
        None => (options.x_ratio, options.y_ratio),
    };
    let x = round_i32(x_ratio * (mapped.width - width as f64));
    let y = round_i32(y_ratio * (mapped.height - height as f64));

    let decode_hint = if (width as f64) < overlay.width / 2.0
        && (height as f64) < overlay.height / 2.0
    {
        Some(Dimensions {
            width: width * 2,
            height: height * 2,
        })
    } else {
        None
    };

    OverlayPlacement {
        width,
        height,
        x,
        y,
        decode_hint,
    }
}
