//! Axis-aligned rectangles in screen coordinates.
//!
//! Bounds cross the wire in the compact string form `"left, top, right, bottom"`,
//! matching what agents already parse out of accessibility dumps.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An axis-aligned rectangle. Coordinates are absolute screen pixels;
/// `right`/`bottom` are exclusive edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    #[must_use]
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    #[must_use]
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    #[must_use]
    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// A rectangle with non-positive width or height encloses no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Translate by `(dx, dy)`, returning the shifted rectangle.
    ///
    /// Offsetting is exact and invertible: `r.offset(0, o).offset(0, -o) == r`.
    /// The overlay registry relies on this to restitch stored coordinates
    /// when the vertical correction offset changes.
    #[must_use]
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self {
            left: self.left + dx,
            top: self.top + dy,
            right: self.right + dx,
            bottom: self.bottom + dy,
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}, {}", self.left, self.top, self.right, self.bottom)
    }
}

impl FromStr for Rect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(format!(
                "expected 'left, top, right, bottom', got '{}'",
                s
            ));
        }
        let parse = |part: &str| {
            part.parse::<i32>()
                .map_err(|e| format!("invalid coordinate '{}': {}", part, e))
        };
        Ok(Self {
            left: parse(parts[0])?,
            top: parse(parts[1])?,
            right: parse(parts[2])?,
            bottom: parse(parts[3])?,
        })
    }
}

impl Serialize for Rect {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Rect {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_and_height() {
        let r = Rect::new(10, 20, 110, 70);
        assert_eq!(r.width(), 100);
        assert_eq!(r.height(), 50);
        assert!(!r.is_empty());
    }

    #[test]
    fn degenerate_rects_are_empty() {
        assert!(Rect::new(5, 5, 5, 50).is_empty());
        assert!(Rect::new(5, 5, 50, 5).is_empty());
        assert!(Rect::new(50, 5, 5, 100).is_empty());
    }

    #[test]
    fn offset_is_invertible() {
        let r = Rect::new(0, 100, 200, 400);
        for o in [-250, -1, 0, 1, 42] {
            assert_eq!(r.offset(0, o).offset(0, -o), r);
        }
    }

    #[test]
    fn offset_shifts_both_edges() {
        let r = Rect::new(1, 2, 3, 4).offset(10, -20);
        assert_eq!(r, Rect::new(11, -18, 13, -16));
    }

    #[test]
    fn display_round_trips_through_from_str() {
        let r = Rect::new(-5, 0, 1080, 2400);
        let parsed: Rect = r.to_string().parse().unwrap();
        assert_eq!(parsed, r);
    }

    #[test]
    fn from_str_rejects_malformed_input() {
        assert!("1, 2, 3".parse::<Rect>().is_err());
        assert!("a, b, c, d".parse::<Rect>().is_err());
        assert!("".parse::<Rect>().is_err());
    }

    #[test]
    fn serializes_as_bounds_string() {
        let json = serde_json::to_string(&Rect::new(0, 0, 100, 50)).unwrap();
        assert_eq!(json, "\"0, 0, 100, 50\"");

        let back: Rect = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Rect::new(0, 0, 100, 50));
    }
}
