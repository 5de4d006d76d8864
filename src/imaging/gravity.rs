//! Numpad-style gravity codes.
//!
//! ```text
//! 1 2 3      NW  N  NE
//! 4 5 6  =>   W  C  E
//! 7 8 9      SW  S  SE
//! ```
//!
//! Each gravity resolves to a horizontal and a vertical ratio in
//! `{0, 0.5, 1}`: the fraction of the free space placed before the anchored
//! item. Code 0 means "unset" and is represented as `None` throughout.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Gravity {
    NorthWest = 1,
    North = 2,
    NorthEast = 3,
    West = 4,
    Center = 5,
    East = 6,
    SouthWest = 7,
    South = 8,
    SouthEast = 9,
}

impl Gravity {
    pub const ALL: [Gravity; 9] = [
        Gravity::NorthWest,
        Gravity::North,
        Gravity::NorthEast,
        Gravity::West,
        Gravity::Center,
        Gravity::East,
        Gravity::SouthWest,
        Gravity::South,
        Gravity::SouthEast,
    ];

    /// Map a numeric code to a gravity. `0` and anything outside `1..=9` is `None`.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1..=9 => Some(Self::ALL[(code - 1) as usize]),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// 0 for the west column, 0.5 for the center column, 1 for the east column.
    pub fn horizontal(self) -> f64 {
        match self {
            Self::NorthWest | Self::West | Self::SouthWest => 0.0,
            Self::North | Self::Center | Self::South => 0.5,
            Self::NorthEast | Self::East | Self::SouthEast => 1.0,
        }
    }

    /// 0 for the north row, 0.5 for the center row, 1 for the south row.
    pub fn vertical(self) -> f64 {
        match self {
            Self::NorthWest | Self::North | Self::NorthEast => 0.0,
            Self::West | Self::Center | Self::East => 0.5,
            Self::SouthWest | Self::South | Self::SouthEast => 1.0,
        }
    }
}

/// Horizontal ratio of an optional gravity; unset anchors to the west edge.
pub fn horizontal_ratio(gravity: Option<Gravity>) -> f64 {
    gravity.map_or(0.0, Gravity::horizontal)
}

/// Vertical ratio of an optional gravity; unset anchors to the north edge.
pub fn vertical_ratio(gravity: Option<Gravity>) -> f64 {
    gravity.map_or(0.0, Gravity::vertical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in 1..=9 {
            assert_eq!(Gravity::from_code(code).unwrap().code() as i64, code);
        }
    }

    #[test]
    fn zero_and_out_of_range_are_unset() {
        assert_eq!(Gravity::from_code(0), None);
        assert_eq!(Gravity::from_code(10), None);
        assert_eq!(Gravity::from_code(-1), None);
    }

    #[test]
    fn horizontal_columns() {
        let west: Vec<f64> = [1, 4, 7]
            .iter()
            .map(|&c| Gravity::from_code(c).unwrap().horizontal())
            .collect();
        let center: Vec<f64> = [2, 5, 8]
            .iter()
            .map(|&c| Gravity::from_code(c).unwrap().horizontal())
            .collect();
        let east: Vec<f64> = [3, 6, 9]
            .iter()
            .map(|&c| Gravity::from_code(c).unwrap().horizontal())
            .collect();
        assert_eq!(west, vec![0.0; 3]);
        assert_eq!(center, vec![0.5; 3]);
        assert_eq!(east, vec![1.0; 3]);
    }

    #[test]
    fn vertical_rows() {
        for (codes, expected) in [([1, 2, 3], 0.0), ([4, 5, 6], 0.5), ([7, 8, 9], 1.0)] {
            for code in codes {
                assert_eq!(Gravity::from_code(code).unwrap().vertical(), expected);
            }
        }
    }

    #[test]
    fn unset_gravity_anchors_top_left() {
        assert_eq!(horizontal_ratio(None), 0.0);
        assert_eq!(vertical_ratio(None), 0.0);
        assert_eq!(horizontal_ratio(Some(Gravity::SouthEast)), 1.0);
        assert_eq!(vertical_ratio(Some(Gravity::Center)), 0.5);
    }
}
