//! Geometry planning for a thumbnail request.
//!
//! All functions here are pure and testable without any I/O or images.
//! [`plan_transform`] turns a [`ThumbnailRequest`] and the probed source size
//! into a [`TransformPlan`]: the final canvas and exactly one of
//! fit / crop / margin layouts.
//!
//! Fractional sizes are kept until the engine boundary so the aspect math
//! never accumulates rounding error; only crop and margin offsets are rounded
//! here, half up.

use super::backend::Dimensions;
use super::gravity::{Gravity, horizontal_ratio, vertical_ratio};
use super::params::{
    CropMode, CropRect, Layout, PlanOutcome, Size, SkipReason, TransformPlan, round_u32,
};
use crate::request::ThumbnailRequest;
use log::warn;

/// Fill in a missing target axis from the source aspect ratio.
///
/// Neither axis given means "keep source size".
pub fn complete_size(width: u32, height: u32, source: Size) -> Size {
    match (width, height) {
        (0, 0) => source,
        (w, 0) => Size::new(w as f64, w as f64 / source.width * source.height),
        (0, h) => Size::new(h as f64 / source.height * source.width, h as f64),
        (w, h) => Size::new(w as f64, h as f64),
    }
}

/// Largest box with the source aspect ratio that fits inside `dest`.
fn fit_within(source_aspect: f64, dest: Size) -> Size {
    if source_aspect < dest.aspect() {
        Size::new(dest.height * source_aspect, dest.height)
    } else {
        Size::new(dest.width, dest.width / source_aspect)
    }
}

/// Decoder hint for a visible region under half the source on both axes.
fn decode_hint(mapped: Size, source: Size) -> Option<Dimensions> {
    if mapped.width < source.width / 2.0 && mapped.height < source.height / 2.0 {
        Some(Dimensions {
            width: round_u32(mapped.width) * 2,
            height: round_u32(mapped.height) * 2,
        })
    } else {
        None
    }
}

/// Plan the transform for `request` applied to an image of `source` size.
///
/// Parameter combinations that produce no transform (crop without gravity,
/// an unknown crop mode) come back as [`PlanOutcome::Skip`] rather than an
/// error; the caller decides what a skip means.
pub fn plan_transform(request: &ThumbnailRequest, source: Dimensions) -> PlanOutcome {
    let src = Size::from(source);
    let dest = complete_size(request.width, request.height, src);

    match request.crop_mode {
        CropMode::Fit => PlanOutcome::Transform(plan_fit(request, src, dest)),
        CropMode::Crop => match plan_crop(request, src, dest) {
            Ok(plan) => PlanOutcome::Transform(plan),
            Err(reason) => PlanOutcome::Skip { reason },
        },
        CropMode::Margin => PlanOutcome::Transform(plan_margin(request, src, dest)),
        CropMode::Unknown(mode) => {
            warn!("Invalid crop mode {mode}, no transform applied");
            PlanOutcome::Skip {
                reason: SkipReason::UnknownCropMode(mode),
            }
        }
    }
}

fn plan_fit(request: &ThumbnailRequest, src: Size, mut dest: Size) -> TransformPlan {
    let src_aspect = src.aspect();

    if !request.upscale && src.width < dest.width && src.height < dest.height {
        dest = src;
    }
    if !request.force_aspect {
        dest = fit_within(src_aspect, dest);
    }

    TransformPlan {
        canvas: dest,
        layout: Layout::Fit { resize: dest },
        decode_hint: decode_hint(dest, src),
    }
}

fn plan_crop(
    request: &ThumbnailRequest,
    src: Size,
    mut dest: Size,
) -> Result<TransformPlan, SkipReason> {
    let src_aspect = src.aspect();
    let dest_aspect = dest.aspect();

    if !request.upscale && src.width <= dest.width && src.height <= dest.height {
        let crop = CropRect {
            x: 0,
            y: 0,
            width: src.width,
            height: src.height,
        };
        return Ok(TransformPlan {
            canvas: src,
            layout: Layout::Crop { crop, resize: src },
            decode_hint: None,
        });
    }

    let limit = request.crop_area_limitation;
    let (crop_width, crop_height) = if src_aspect < dest_aspect {
        // Box is wider than the source: keep full width, cut height
        let mut crop_height = src.width / dest_aspect;
        if src_aspect / dest_aspect < limit {
            let requested = dest.height;
            crop_height = src.width / src_aspect * limit;
            dest.height = dest.width / src_aspect * limit;
            warn!(
                "Required height is below crop area limitation ({}, {}) -> ({}, {})",
                dest.width, requested, dest.width, dest.height
            );
        }
        (src.width, crop_height)
    } else {
        // Box is taller than the source: keep full height, cut width
        let mut crop_width = src.height * dest_aspect;
        if dest_aspect / src_aspect < limit {
            let requested = dest.width;
            crop_width = src.height * src_aspect * limit;
            dest.width = dest.height * src_aspect * limit;
            warn!(
                "Required width is below crop area limitation ({}, {}) -> ({}, {})",
                requested, dest.height, dest.width, dest.height
            );
        }
        (crop_width, src.height)
    };

    let Some(gravity) = request.gravity else {
        warn!("Crop mode 1 with gravity 0 is invalid, no transform applied");
        return Err(SkipReason::CropWithoutGravity);
    };

    let (x, y) = crop_origin(src, crop_width, crop_height, src_aspect < dest_aspect, gravity);
    let crop = CropRect {
        x,
        y,
        width: crop_width,
        height: crop_height,
    };

    Ok(TransformPlan {
        canvas: dest,
        layout: Layout::Crop { crop, resize: dest },
        decode_hint: None,
    })
}

/// Place the crop rectangle along the axis that was cut.
fn crop_origin(
    src: Size,
    crop_width: f64,
    crop_height: f64,
    cut_height: bool,
    gravity: Gravity,
) -> (u32, u32) {
    if cut_height {
        (0, round_u32((src.height - crop_height) * gravity.vertical()))
    } else {
        (round_u32((src.width - crop_width) * gravity.horizontal()), 0)
    }
}

fn plan_margin(request: &ThumbnailRequest, src: Size, dest: Size) -> TransformPlan {
    let mapped = if !request.upscale && src.width < dest.width && src.height < dest.height {
        src
    } else {
        fit_within(src.aspect(), dest)
    };

    let canvas_px = dest.rounded();
    let mapped_px = mapped.rounded();
    // Offsets never push the rounded image past the rounded canvas
    let x = round_u32((dest.width - mapped.width) * horizontal_ratio(request.gravity))
        .min(canvas_px.width.saturating_sub(mapped_px.width));
    let y = round_u32((dest.height - mapped.height) * vertical_ratio(request.gravity))
        .min(canvas_px.height.saturating_sub(mapped_px.height));

    TransformPlan {
        canvas: dest,
        layout: Layout::Margin {
            mapped,
            x,
            y,
            background: request.background.clone(),
        },
        decode_hint: decode_hint(mapped, src),
    }
}
