//! Annotation text placement.
//!
//! Text is anchored with the same gravity grid as everything else. Outlined
//! text (the default, white fill over a black stroke) drifts visibly
//! relative to its outline, so each pass gets a small tuned nudge depending
//! on which column and row the anchor sits in. The numbers are empirical.
//!
//! | Axis ratio | Fill x | Fill y | Stroke x | Stroke y |
//! |---|---|---|---|---|
//! | 0 (west / north) | 3.5 | 3.5 | 3 | 3 |
//! | 0.5 (center) | 0.5 | 0.4 | 0 | 0 |
//! | 1 (east / south) | 2.5 | 2.6 | 3 | 3 |

use super::gravity::Gravity;
use super::params::{Offset, TextPlacement};

/// Stroke width of the outline pass.
pub const STROKE_WIDTH: f64 = 2.5;

/// Default font size when the request does not give one.
pub const DEFAULT_FONT_SIZE: f64 = 10.0;

fn fill_x(ratio: f64) -> f64 {
    if ratio == 0.0 {
        3.5
    } else if ratio == 0.5 {
        0.5
    } else {
        2.5
    }
}

fn fill_y(ratio: f64) -> f64 {
    if ratio == 0.0 {
        3.5
    } else if ratio == 0.5 {
        0.4
    } else {
        2.6
    }
}

fn stroke_offset(ratio: f64) -> f64 {
    if ratio == 0.5 { 0.0 } else { 3.0 }
}

/// Margin only applies to an axis anchored at an edge.
fn edge_margin(ratio: f64, margin: f64) -> f64 {
    if ratio == 0.5 { 0.0 } else { margin }
}

/// Place text for `gravity` (unset means south-east).
///
/// `margin` pushes edge-anchored axes further inward. With `outlined` the
/// placement carries a stroke pass offset as well as the fill offset.
pub fn plan_text(gravity: Option<Gravity>, margin: f64, outlined: bool) -> TextPlacement {
    let gravity = gravity.unwrap_or(Gravity::SouthEast);
    let h = gravity.horizontal();
    let v = gravity.vertical();
    let mx = edge_margin(h, margin);
    let my = edge_margin(v, margin);

    let fill = Offset {
        x: fill_x(h) + mx,
        y: fill_y(v) + my,
    };
    let stroke = outlined.then(|| Offset {
        x: stroke_offset(h) + mx,
        y: stroke_offset(v) + my,
    });

    TextPlacement {
        gravity,
        anchor_x: h,
        anchor_y: v,
        fill,
        stroke,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offsets(p: &TextPlacement) -> ((f64, f64), Option<(f64, f64)>) {
        ((p.fill.x, p.fill.y), p.stroke.map(|s| (s.x, s.y)))
    }

    #[test]
    fn corner_offsets() {
        let nw = plan_text(Some(Gravity::NorthWest), 0.0, true);
        assert_eq!(offsets(&nw), ((3.5, 3.5), Some((3.0, 3.0))));

        let se = plan_text(Some(Gravity::SouthEast), 0.0, true);
        assert_eq!(offsets(&se), ((2.5, 2.6), Some((3.0, 3.0))));

        let ne = plan_text(Some(Gravity::NorthEast), 0.0, true);
        assert_eq!(offsets(&ne), ((2.5, 3.5), Some((3.0, 3.0))));

        let sw = plan_text(Some(Gravity::SouthWest), 0.0, true);
        assert_eq!(offsets(&sw), ((3.5, 2.6), Some((3.0, 3.0))));
    }

    #[test]
    fn edge_center_offsets() {
        let n = plan_text(Some(Gravity::North), 0.0, true);
        assert_eq!(offsets(&n), ((0.5, 3.5), Some((0.0, 3.0))));

        let w = plan_text(Some(Gravity::West), 0.0, true);
        assert_eq!(offsets(&w), ((3.5, 0.4), Some((3.0, 0.0))));

        let c = plan_text(Some(Gravity::Center), 0.0, true);
        assert_eq!(offsets(&c), ((0.5, 0.4), Some((0.0, 0.0))));
    }

    #[test]
    fn unset_gravity_is_south_east() {
        let p = plan_text(None, 0.0, true);
        assert_eq!(p.gravity, Gravity::SouthEast);
        assert_eq!((p.anchor_x, p.anchor_y), (1.0, 1.0));
    }

    #[test]
    fn colored_text_has_no_stroke_pass() {
        let p = plan_text(Some(Gravity::Center), 0.0, false);
        assert_eq!(p.stroke, None);
        assert_eq!((p.fill.x, p.fill.y), (0.5, 0.4));
    }

    #[test]
    fn margin_pushes_edges_only() {
        let p = plan_text(Some(Gravity::North), 10.0, true);
        assert_eq!(offsets(&p), ((0.5, 13.5), Some((0.0, 13.0))));

        let e = plan_text(Some(Gravity::East), 4.0, false);
        assert_eq!(offsets(&e), ((6.5, 0.4), None));

        let c = plan_text(Some(Gravity::Center), 10.0, true);
        assert_eq!(offsets(&c), ((0.5, 0.4), Some((0.0, 0.0))));
    }

    #[test]
    fn anchors_follow_gravity_grid() {
        for gravity in Gravity::ALL {
            let p = plan_text(Some(gravity), 0.0, false);
            assert_eq!(p.anchor_x, gravity.horizontal());
            assert_eq!(p.anchor_y, gravity.vertical());
        }
    }
}
