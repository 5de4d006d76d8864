//! High-level thumbnail rendering.
//!
//! [`render`] ties the pure planners to an [`ImageEngine`]:
//!
//! 1. sniff the container, refuse unknown formats
//! 2. probe the header for the source size
//! 3. cut animated GIFs down to their first frame
//! 4. enforce the source pixel ceiling
//! 5. plan the geometry (a skip ends the render here)
//! 6. decode, then resize / crop+resize / resize-to-mapped per layout
//! 7. composite the overlay, draw the text passes
//! 8. flatten (fit, crop) or extend to the canvas (margin)
//! 9. encode, then patch the HEIF `ispe` size for HEIC output

use super::backend::{CropBox, Dimensions, EngineError, ImageEngine, Stroke, TextPass};
use super::calculations::plan_transform;
use super::format::{ImageFormat, detect_format};
use super::gif::extract_first_frame;
use super::heif::set_primary_image_size;
use super::overlay::plan_overlay;
use super::params::{Layout, PlanOutcome, SkipReason, TransformPlan};
use super::text::{STROKE_WIDTH, plan_text};
use crate::request::ThumbnailRequest;
use log::{debug, warn};
use thiserror::Error;

const STROKE_COLOR: &str = "black";
const OUTLINED_FILL: &str = "white";

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("Unsupported image format")]
    UnsupportedFormat,
    #[error("Source image has no pixels ({}x{})", .0.width, .0.height)]
    EmptyImage(Dimensions),
    #[error("Source image too large: {pixels} pixels exceeds {max}")]
    TooManyPixels { pixels: u64, max: u64 },
    #[error("Overlay image: {0}")]
    Overlay(EngineError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, ThumbnailError>;

/// An encoded thumbnail.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub plan: TransformPlan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Rendered(Rendered),
    /// The request made sense syntactically but yields no transform.
    Skipped(SkipReason),
}

/// What the pipeline learned about a source before touching pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    pub format: ImageFormat,
    pub dimensions: Dimensions,
    pub outcome: PlanOutcome,
}

/// Sniff, probe, isolate the first GIF frame and plan.
///
/// `bytes` may be truncated in place (GIF). No pixels are decoded.
pub fn prepare<E: ImageEngine>(
    engine: &E,
    bytes: &mut Vec<u8>,
    request: &ThumbnailRequest,
) -> Result<Prepared> {
    let format = detect_format(bytes);
    if !format.is_supported() {
        return Err(ThumbnailError::UnsupportedFormat);
    }

    let probe = engine.probe(bytes)?;
    let dimensions = probe.dimensions;

    if format == ImageFormat::Gif {
        match extract_first_frame(bytes) {
            Ok(len) => bytes.truncate(len),
            Err(e) => warn!("GIF first-frame extraction failed, using full stream: {e}"),
        }
    }

    if dimensions.width == 0 || dimensions.height == 0 {
        return Err(ThumbnailError::EmptyImage(dimensions));
    }
    if dimensions.pixels() > request.max_pixels {
        return Err(ThumbnailError::TooManyPixels {
            pixels: dimensions.pixels(),
            max: request.max_pixels,
        });
    }

    let outcome = plan_transform(request, dimensions);
    Ok(Prepared {
        format,
        dimensions,
        outcome,
    })
}

/// Render `bytes` (and optionally an `overlay` image) per `request`.
pub fn render<E: ImageEngine>(
    engine: &E,
    mut bytes: Vec<u8>,
    overlay: Option<&[u8]>,
    request: &ThumbnailRequest,
) -> Result<RenderOutcome> {
    let Prepared {
        format,
        dimensions,
        outcome,
    } = prepare(engine, &mut bytes, request)?;

    let plan = match outcome {
        PlanOutcome::Transform(plan) => plan,
        PlanOutcome::Skip { reason } => {
            debug!("No transform for {}: {reason}", request.url);
            return Ok(RenderOutcome::Skipped(reason));
        }
    };
    debug!(
        "{} {}x{} -> {} canvas {}",
        format,
        dimensions.width,
        dimensions.height,
        plan.mode_name(),
        plan.canvas
    );

    let background = request.effective_background(format);
    let mut image = engine.decode(&bytes, plan.decode_hint)?;

    match &plan.layout {
        Layout::Fit { resize } => engine.resize(&mut image, resize.rounded())?,
        Layout::Crop { crop, resize } => {
            let size = crop.size().rounded();
            engine.crop(
                &mut image,
                CropBox {
                    x: crop.x,
                    y: crop.y,
                    width: size.width,
                    height: size.height,
                },
            )?;
            engine.resize(&mut image, resize.rounded())?;
        }
        Layout::Margin { mapped, .. } => engine.resize(&mut image, mapped.rounded())?,
    }

    if let Some(overlay_bytes) = overlay {
        composite_overlay(engine, &mut image, overlay_bytes, &plan, dimensions, request)
            .map_err(ThumbnailError::Overlay)?;
    }

    if !request.text.is_empty() {
        annotate_text(engine, &mut image, request)?;
    }

    match &plan.layout {
        Layout::Margin { x, y, .. } => {
            engine.extent(&mut image, plan.canvas.rounded(), *x, *y, background)?
        }
        _ => engine.flatten(&mut image, background)?,
    }

    let output = format.resolve_output(request.output_format);
    let mut encoded = engine.encode(&image, output, request.quality)?;

    if output == ImageFormat::Heic {
        let canvas = plan.canvas.rounded();
        if let Err(e) = set_primary_image_size(&mut encoded, canvas.width, canvas.height) {
            warn!("Could not patch HEIF image size: {e}");
        }
    }

    Ok(RenderOutcome::Rendered(Rendered {
        bytes: encoded,
        format: output,
        plan,
    }))
}

fn composite_overlay<E: ImageEngine>(
    engine: &E,
    image: &mut E::Image,
    overlay_bytes: &[u8],
    plan: &TransformPlan,
    source: Dimensions,
    request: &ThumbnailRequest,
) -> std::result::Result<(), EngineError> {
    let probe = engine.probe(overlay_bytes)?;
    let placement = plan_overlay(&request.overlay, plan.mapped(), source, probe.dimensions);
    let mut overlay = engine.decode(overlay_bytes, placement.decode_hint)?;
    engine.resize(
        &mut overlay,
        Dimensions {
            width: placement.width,
            height: placement.height,
        },
    )?;
    engine.composite(image, &overlay, placement.x, placement.y)
}

/// Text drawing passes for `request`: outline then fill, or a single
/// colored fill.
pub fn text_passes(request: &ThumbnailRequest) -> Vec<TextPass> {
    let outlined = request.outlined_text();
    let placement = plan_text(request.text_gravity, request.text_margin as f64, outlined);
    let pass = |x: f64, y: f64, fill: &str, stroke: Option<Stroke>| TextPass {
        text: request.text.clone(),
        fonts: request.text_fonts.clone(),
        font_size: request.text_font_size,
        gravity: placement.gravity,
        x,
        y,
        fill: fill.to_string(),
        stroke,
    };

    let mut passes = Vec::with_capacity(2);
    if let Some(offset) = placement.stroke {
        passes.push(pass(
            offset.x,
            offset.y,
            STROKE_COLOR,
            Some(Stroke {
                color: STROKE_COLOR.to_string(),
                width: STROKE_WIDTH,
            }),
        ));
    }
    let fill = if outlined {
        OUTLINED_FILL
    } else {
        request.text_color.as_str()
    };
    passes.push(pass(placement.fill.x, placement.fill.y, fill, None));
    passes
}

fn annotate_text<E: ImageEngine>(
    engine: &E,
    image: &mut E::Image,
    request: &ThumbnailRequest,
) -> Result<()> {
    for pass in text_passes(request) {
        engine.annotate(image, &pass)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockEngine, RecordedOp, probe};
    use crate::imaging::gif::tests::animated_gif;
    use crate::imaging::gravity::Gravity;
    use crate::imaging::heif::{primary_image_size, tests::sample_heif};
    use crate::imaging::params::{CropMode, Size};
    use crate::imaging::{OutputFormat, OverlayOptions};

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F', 0, 1, 1];
    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

    fn request(width: u32, height: u32) -> ThumbnailRequest {
        ThumbnailRequest {
            url: "a.jpg".into(),
            width,
            height,
            ..ThumbnailRequest::default()
        }
    }

    fn rendered(outcome: RenderOutcome) -> Rendered {
        match outcome {
            RenderOutcome::Rendered(r) => r,
            RenderOutcome::Skipped(reason) => panic!("unexpected skip: {reason}"),
        }
    }

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    // =========================================================================
    // Format gate and probing
    // =========================================================================

    #[test]
    fn unknown_format_is_rejected_before_probe() {
        let engine = MockEngine::with_probes(vec![probe(10, 10, ImageFormat::Jpeg)]);
        let result = render(&engine, b"not an image at all".to_vec(), None, &request(5, 5));
        assert!(matches!(result, Err(ThumbnailError::UnsupportedFormat)));
        assert!(engine.get_operations().is_empty());
    }

    #[test]
    fn short_input_is_rejected() {
        let engine = MockEngine::new();
        let result = render(&engine, vec![0xFF, 0xD8], None, &request(5, 5));
        assert!(matches!(result, Err(ThumbnailError::UnsupportedFormat)));
    }

    #[test]
    fn probe_failure_propagates() {
        let engine = MockEngine::new();
        let result = render(&engine, JPEG.to_vec(), None, &request(5, 5));
        assert!(matches!(result, Err(ThumbnailError::Engine(_))));
    }

    #[test]
    fn pixel_ceiling_enforced() {
        let engine = MockEngine::with_probes(vec![probe(5000, 3000, ImageFormat::Jpeg)]);
        let result = render(&engine, JPEG.to_vec(), None, &request(100, 100));
        assert!(matches!(
            result,
            Err(ThumbnailError::TooManyPixels {
                pixels: 15_000_000,
                max: 10_000_000
            })
        ));
    }

    #[test]
    fn zero_sized_source_is_rejected() {
        let engine = MockEngine::with_probes(vec![probe(0, 10, ImageFormat::Png)]);
        let result = render(&engine, PNG.to_vec(), None, &request(5, 5));
        assert!(matches!(result, Err(ThumbnailError::EmptyImage(_))));
    }

    // =========================================================================
    // Layouts
    // =========================================================================

    #[test]
    fn fit_resize_flatten_encode() {
        let engine = MockEngine::with_probes(vec![probe(800, 600, ImageFormat::Jpeg)]);
        let out = rendered(render(&engine, JPEG.to_vec(), None, &request(200, 200)).unwrap());

        assert_eq!(out.format, ImageFormat::Jpeg);
        assert_eq!(out.bytes, b"encoded");
        assert_eq!(out.plan.canvas, Size::new(200.0, 150.0));

        let ops = engine.get_operations();
        assert_eq!(
            ops,
            vec![
                RecordedOp::Probe(JPEG.len()),
                RecordedOp::Decode {
                    len: JPEG.len(),
                    hint: Some(dims(400, 300)),
                },
                RecordedOp::Resize(dims(200, 150)),
                RecordedOp::Flatten("#ffffff".into()),
                RecordedOp::Encode {
                    format: ImageFormat::Jpeg,
                    quality: 90,
                },
            ]
        );
    }

    #[test]
    fn crop_then_exact_resize() {
        let engine = MockEngine::with_probes(vec![probe(800, 600, ImageFormat::Jpeg)]);
        let req = ThumbnailRequest {
            crop_mode: CropMode::Crop,
            gravity: Some(Gravity::Center),
            ..request(200, 200)
        };
        let out = rendered(render(&engine, JPEG.to_vec(), None, &req).unwrap());
        assert_eq!(out.plan.canvas, Size::new(200.0, 200.0));

        let ops = engine.get_operations();
        assert_eq!(
            ops[1],
            RecordedOp::Decode {
                len: JPEG.len(),
                hint: None,
            }
        );
        assert_eq!(
            ops[2],
            RecordedOp::Crop(CropBox {
                x: 100,
                y: 0,
                width: 600,
                height: 600,
            })
        );
        assert_eq!(ops[3], RecordedOp::Resize(dims(200, 200)));
        assert_eq!(ops[4], RecordedOp::Flatten("#ffffff".into()));
    }

    #[test]
    fn crop_without_gravity_is_skipped() {
        let engine = MockEngine::with_probes(vec![probe(800, 600, ImageFormat::Jpeg)]);
        let req = ThumbnailRequest {
            crop_mode: CropMode::Crop,
            gravity: None,
            ..request(200, 200)
        };
        let outcome = render(&engine, JPEG.to_vec(), None, &req).unwrap();
        assert_eq!(outcome, RenderOutcome::Skipped(SkipReason::CropWithoutGravity));
        assert_eq!(engine.get_operations(), vec![RecordedOp::Probe(JPEG.len())]);
    }

    #[test]
    fn unknown_crop_mode_is_skipped() {
        let engine = MockEngine::with_probes(vec![probe(800, 600, ImageFormat::Jpeg)]);
        let req = ThumbnailRequest {
            crop_mode: CropMode::Unknown(5),
            ..request(200, 200)
        };
        let outcome = render(&engine, JPEG.to_vec(), None, &req).unwrap();
        assert_eq!(outcome, RenderOutcome::Skipped(SkipReason::UnknownCropMode(5)));
    }

    #[test]
    fn margin_resizes_then_extends() {
        let engine = MockEngine::with_probes(vec![probe(800, 600, ImageFormat::Png)]);
        let req = ThumbnailRequest {
            crop_mode: CropMode::Margin,
            background: "#00000080".into(),
            ..request(200, 200)
        };
        rendered(render(&engine, PNG.to_vec(), None, &req).unwrap());

        let ops = engine.get_operations();
        assert_eq!(ops[2], RecordedOp::Resize(dims(200, 150)));
        assert_eq!(
            ops[3],
            RecordedOp::Extent {
                canvas: dims(200, 200),
                x: 0,
                y: 25,
                background: "#00000080".into(),
            }
        );
    }

    #[test]
    fn background_trimmed_for_jpeg_output() {
        let engine = MockEngine::with_probes(vec![probe(800, 600, ImageFormat::Png)]);
        let req = ThumbnailRequest {
            background: "#ff000080".into(),
            output_format: Some(OutputFormat::Jpeg),
            ..request(200, 200)
        };
        let out = rendered(render(&engine, PNG.to_vec(), None, &req).unwrap());
        assert_eq!(out.format, ImageFormat::Jpeg);

        let ops = engine.get_operations();
        assert!(ops.contains(&RecordedOp::Flatten("#ff0000".into())));
        assert!(ops.contains(&RecordedOp::Encode {
            format: ImageFormat::Jpeg,
            quality: 90,
        }));
    }

    // =========================================================================
    // GIF and HEIF handling
    // =========================================================================

    #[test]
    fn animated_gif_truncated_to_first_frame() {
        let gif = animated_gif(3);
        let single = extract_first_frame(&mut animated_gif(3)).unwrap();
        assert!(single < gif.len());

        let engine = MockEngine::with_probes(vec![probe(2, 2, ImageFormat::Gif)]);
        let req = ThumbnailRequest {
            upscale: true,
            ..request(4, 4)
        };
        rendered(render(&engine, gif.clone(), None, &req).unwrap());

        let ops = engine.get_operations();
        assert_eq!(ops[0], RecordedOp::Probe(gif.len()));
        assert_eq!(
            ops[1],
            RecordedOp::Decode {
                len: single,
                hint: None,
            }
        );
    }

    #[test]
    fn broken_gif_falls_back_to_full_stream() {
        let mut gif = animated_gif(2);
        gif.truncate(20);
        let engine = MockEngine::with_probes(vec![probe(2, 2, ImageFormat::Gif)]);
        rendered(render(&engine, gif.clone(), None, &request(2, 2)).unwrap());

        let ops = engine.get_operations();
        assert_eq!(
            ops[1],
            RecordedOp::Decode {
                len: gif.len(),
                hint: None,
            }
        );
    }

    #[test]
    fn heic_output_gets_canvas_size_patched() {
        let engine = MockEngine::with_probes(vec![probe(800, 600, ImageFormat::Jpeg)])
            .with_encoded(sample_heif(800, 600));
        let req = ThumbnailRequest {
            output_format: Some(OutputFormat::Heic),
            ..request(200, 200)
        };
        let out = rendered(render(&engine, JPEG.to_vec(), None, &req).unwrap());
        assert_eq!(out.format, ImageFormat::Heic);
        assert_eq!(primary_image_size(&out.bytes).unwrap(), Some((200, 150)));
    }

    #[test]
    fn heic_patch_failure_is_not_fatal() {
        let engine = MockEngine::with_probes(vec![probe(800, 600, ImageFormat::Jpeg)])
            .with_encoded(b"garbage".to_vec());
        let req = ThumbnailRequest {
            output_format: Some(OutputFormat::Heic),
            ..request(200, 200)
        };
        let out = rendered(render(&engine, JPEG.to_vec(), None, &req).unwrap());
        assert_eq!(out.bytes, b"garbage");
    }

    // =========================================================================
    // Overlay and text
    // =========================================================================

    #[test]
    fn overlay_is_scaled_and_composited() {
        let engine = MockEngine::with_probes(vec![
            probe(800, 600, ImageFormat::Jpeg),
            probe(100, 100, ImageFormat::Png),
        ]);
        let req = ThumbnailRequest {
            overlay: OverlayOptions {
                gravity: Some(Gravity::SouthEast),
                ..OverlayOptions::default()
            },
            ..request(400, 300)
        };
        rendered(render(&engine, JPEG.to_vec(), Some(PNG), &req).unwrap());

        let ops = engine.get_operations();
        assert_eq!(ops[3], RecordedOp::Probe(PNG.len()));
        assert_eq!(
            ops[4],
            RecordedOp::Decode {
                len: PNG.len(),
                hint: None,
            }
        );
        assert_eq!(ops[5], RecordedOp::Resize(dims(50, 50)));
        assert_eq!(
            ops[6],
            RecordedOp::Composite {
                width: 50,
                height: 50,
                x: 350,
                y: 250,
            }
        );
        assert_eq!(ops[7], RecordedOp::Flatten("#ffffff".into()));
    }

    #[test]
    fn overlay_failure_is_reported_as_overlay_error() {
        let engine = MockEngine::with_probes(vec![probe(800, 600, ImageFormat::Jpeg)]);
        let result = render(&engine, JPEG.to_vec(), Some(PNG), &request(400, 300));
        assert!(matches!(result, Err(ThumbnailError::Overlay(_))));
    }

    #[test]
    fn outlined_text_draws_two_passes() {
        let req = ThumbnailRequest {
            text: "hello".into(),
            text_gravity: Some(Gravity::NorthWest),
            text_fonts: vec!["Noto".into()],
            ..request(200, 200)
        };
        let passes = text_passes(&req);
        assert_eq!(passes.len(), 2);

        assert_eq!(passes[0].fill, "black");
        assert_eq!(
            passes[0].stroke,
            Some(Stroke {
                color: "black".into(),
                width: 2.5,
            })
        );
        assert_eq!((passes[0].x, passes[0].y), (3.0, 3.0));

        assert_eq!(passes[1].fill, "white");
        assert_eq!(passes[1].stroke, None);
        assert_eq!((passes[1].x, passes[1].y), (3.5, 3.5));
        assert_eq!(passes[1].fonts, vec!["Noto"]);
        assert_eq!(passes[1].font_size, 10.0);
    }

    #[test]
    fn colored_text_draws_one_pass() {
        let req = ThumbnailRequest {
            text: "hello".into(),
            text_color: "#ff0000".into(),
            ..request(200, 200)
        };
        let passes = text_passes(&req);
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].fill, "#ff0000");
        assert_eq!(passes[0].gravity, Gravity::SouthEast);
        assert_eq!((passes[0].x, passes[0].y), (2.5, 2.6));
    }

    #[test]
    fn text_drawn_before_flatten() {
        let engine = MockEngine::with_probes(vec![probe(800, 600, ImageFormat::Jpeg)]);
        let req = ThumbnailRequest {
            text: "hi".into(),
            ..request(200, 200)
        };
        rendered(render(&engine, JPEG.to_vec(), None, &req).unwrap());

        let ops = engine.get_operations();
        assert!(matches!(ops[3], RecordedOp::Annotate(_)));
        assert!(matches!(ops[4], RecordedOp::Annotate(_)));
        assert_eq!(ops[5], RecordedOp::Flatten("#ffffff".into()));
    }

    #[test]
    fn annotate_failure_propagates() {
        let engine = MockEngine {
            fail_annotate: true,
            ..MockEngine::with_probes(vec![probe(800, 600, ImageFormat::Jpeg)])
        };
        let req = ThumbnailRequest {
            text: "hi".into(),
            ..request(200, 200)
        };
        let result = render(&engine, JPEG.to_vec(), None, &req);
        assert!(matches!(
            result,
            Err(ThumbnailError::Engine(EngineError::Unsupported(_)))
        ));
    }

    #[test]
    fn prepare_reports_plan_without_decoding() {
        let engine = MockEngine::with_probes(vec![probe(800, 600, ImageFormat::Jpeg)]);
        let mut bytes = JPEG.to_vec();
        let prepared = prepare(&engine, &mut bytes, &request(200, 0)).unwrap();
        assert_eq!(prepared.format, ImageFormat::Jpeg);
        assert_eq!(prepared.dimensions, dims(800, 600));
        assert_eq!(
            prepared.outcome.plan().map(|p| p.canvas),
            Some(Size::new(200.0, 150.0))
        );
        assert_eq!(engine.get_operations().len(), 1);
    }
}
