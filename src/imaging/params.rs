//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the planners ([`calculations`](super::calculations),
//! [`overlay`](super::overlay), [`text`](super::text)) and the
//! [`backend`](super::backend) that does the pixel work, so the planning math
//! can be tested without touching a single pixel.
//!
//! ## Types
//!
//! - [`Quality`]: lossy encoding quality (0-100, default 90). Clamped on construction.
//! - [`CropMode`]: fit, crop or margin, keeping unknown codes for the planner to reject.
//! - [`Size`]: fractional width/height; rounded only when handed to the engine.
//! - [`TransformPlan`]: canvas size plus exactly one [`Layout`] branch.
//! - [`PlanOutcome`]: a plan, or a [`SkipReason`] for parameter combinations that produce no transform.
//! - [`OverlayPlacement`] / [`TextPlacement`]: where composited layers go.

use super::backend::Dimensions;
use super::gravity::Gravity;
use serde::Serialize;
use std::fmt;

/// Quality setting for lossy image encoding (0-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.min(100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Resizing policy selected by the `cm` parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CropMode {
    /// 0: scale to fit inside the box, no crop, no margin.
    #[default]
    Fit,
    /// 1: crop to the box aspect, then scale.
    Crop,
    /// 2: scale to fit and pad the rest with the background color.
    Margin,
    /// Any other code. Accepted by the parser, skipped by the planner.
    Unknown(i64),
}

impl CropMode {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Fit,
            1 => Self::Crop,
            2 => Self::Margin,
            other => Self::Unknown(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Fit => 0,
            Self::Crop => 1,
            Self::Margin => 2,
            Self::Unknown(code) => code,
        }
    }
}

/// Round half up, the way the pixel engine expects integer geometry.
///
/// Differs from [`f64::round`] for negative halves: `-2.5` becomes `-2`.
pub fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

pub(crate) fn round_u32(value: f64) -> u32 {
    round_half_up(value).max(0.0) as u32
}

pub(crate) fn round_i32(value: f64) -> i32 {
    round_half_up(value) as i32
}

/// A width/height pair that may still carry fractional pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn aspect(self) -> f64 {
        self.width / self.height
    }

    /// Integer pixel size for the engine.
    pub fn rounded(self) -> Dimensions {
        Dimensions {
            width: round_u32(self.width),
            height: round_u32(self.height),
        }
    }
}

impl From<Dimensions> for Size {
    fn from(d: Dimensions) -> Self {
        Self::new(d.width as f64, d.height as f64)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}x{:.2}", self.width, self.height)
    }
}

/// Source-space crop rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    pub fn size(self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// The one layout branch a plan carries, selected by crop mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Layout {
    /// Resize the whole source to `resize`; the canvas is exactly that size.
    Fit { resize: Size },
    /// Cut `crop` out of the source, then resize it to `resize` ignoring aspect.
    Crop { crop: CropRect, resize: Size },
    /// Resize the source to `mapped` and place it at (`x`, `y`) on a canvas
    /// filled with `background`.
    Margin {
        mapped: Size,
        x: u32,
        y: u32,
        background: String,
    },
}

/// Output of the geometry planner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformPlan {
    /// Final canvas size.
    pub canvas: Size,
    pub layout: Layout,
    /// Decoder size hint (e.g. JPEG DCT scaling) when the visible region is
    /// under half the source on both axes.
    pub decode_hint: Option<Dimensions>,
}

impl TransformPlan {
    /// The part of the canvas covered by image pixels.
    pub fn mapped(&self) -> Size {
        match &self.layout {
            Layout::Fit { resize } => *resize,
            Layout::Crop { resize, .. } => *resize,
            Layout::Margin { mapped, .. } => *mapped,
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self.layout {
            Layout::Fit { .. } => "fit",
            Layout::Crop { .. } => "crop",
            Layout::Margin { .. } => "margin",
        }
    }
}

/// Why a request produced no transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// Crop mode needs a gravity to place the crop rectangle.
    CropWithoutGravity,
    UnknownCropMode(i64),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CropWithoutGravity => f.write_str("crop mode 1 requires a gravity (g=1..9)"),
            Self::UnknownCropMode(mode) => write!(f, "unknown crop mode {mode}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum PlanOutcome {
    Transform(TransformPlan),
    Skip { reason: SkipReason },
}

impl PlanOutcome {
    pub fn plan(&self) -> Option<&TransformPlan> {
        match self {
            Self::Transform(plan) => Some(plan),
            Self::Skip { .. } => None,
        }
    }
}

/// Scaled overlay size and its offset on the base canvas.
///
/// Offsets are not clamped: an overlay may hang off any edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OverlayPlacement {
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
    pub decode_hint: Option<Dimensions>,
}

/// A pixel nudge applied to a text anchor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Offset {
    pub x: f64,
    pub y: f64,
}

/// Where and how to draw annotation text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TextPlacement {
    pub gravity: Gravity,
    /// Horizontal/vertical anchor ratios in `{0, 0.5, 1}`.
    pub anchor_x: f64,
    pub anchor_y: f64,
    /// Offset of the fill pass.
    pub fill: Offset,
    /// Offset of the outline pass; `None` when the text has an explicit color
    /// and is drawn without a halo.
    pub stroke: Option<Offset>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 0);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_90() {
        assert_eq!(Quality::default().value(), 90);
    }

    #[test]
    fn crop_mode_codes() {
        assert_eq!(CropMode::from_code(0), CropMode::Fit);
        assert_eq!(CropMode::from_code(1), CropMode::Crop);
        assert_eq!(CropMode::from_code(2), CropMode::Margin);
        assert_eq!(CropMode::from_code(3), CropMode::Unknown(3));
        assert_eq!(CropMode::Unknown(-1).code(), -1);
        assert_eq!(CropMode::Margin.code(), 2);
        assert_eq!(CropMode::default(), CropMode::Fit);
    }

    #[test]
    fn round_half_up_matches_engine_rounding() {
        assert_eq!(round_half_up(2.5), 3.0);
        assert_eq!(round_half_up(2.49), 2.0);
        assert_eq!(round_half_up(-2.5), -2.0);
        assert_eq!(round_half_up(-2.51), -3.0);
    }

    #[test]
    fn size_rounds_to_dimensions() {
        let size = Size::new(199.5, 149.49);
        assert_eq!(
            size.rounded(),
            Dimensions {
                width: 200,
                height: 149
            }
        );
    }

    #[test]
    fn negative_size_rounds_to_zero() {
        assert_eq!(round_u32(-3.0), 0);
    }

    #[test]
    fn mapped_region_per_layout() {
        let fit = TransformPlan {
            canvas: Size::new(200.0, 150.0),
            layout: Layout::Fit {
                resize: Size::new(200.0, 150.0),
            },
            decode_hint: None,
        };
        assert_eq!(fit.mapped(), Size::new(200.0, 150.0));
        assert_eq!(fit.mode_name(), "fit");

        let margin = TransformPlan {
            canvas: Size::new(100.0, 200.0),
            layout: Layout::Margin {
                mapped: Size::new(100.0, 50.0),
                x: 0,
                y: 150,
                background: "#ffffff".into(),
            },
            decode_hint: None,
        };
        assert_eq!(margin.mapped(), Size::new(100.0, 50.0));
    }

    #[test]
    fn skip_reason_messages() {
        assert_eq!(
            SkipReason::UnknownCropMode(7).to_string(),
            "unknown crop mode 7"
        );
        assert!(SkipReason::CropWithoutGravity.to_string().contains("gravity"));
    }

    #[test]
    fn skip_outcome_has_no_plan() {
        let outcome = PlanOutcome::Skip {
            reason: SkipReason::CropWithoutGravity,
        };
        assert!(outcome.plan().is_none());
    }
}
