//! Counting line geometry: signed perpendicular distance and segment projection.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Default perpendicular tolerance band around the counting line, in pixels.
pub const DEFAULT_BAND_PX: f64 = 12.0;

/// Integer pixel coordinate in full-frame space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    #[inline]
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn translate(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Euclidean distance to another point.
    #[inline]
    pub fn distance(self, other: Point) -> f64 {
        (Vector2::from(self) - Vector2::from(other)).norm()
    }
}

impl From<[i32; 2]> for Point {
    fn from([x, y]: [i32; 2]) -> Self {
        Self::new(x, y)
    }
}

impl From<Point> for [i32; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

impl From<Point> for Vector2<f64> {
    fn from(p: Point) -> Self {
        Vector2::new(p.x as f64, p.y as f64)
    }
}

/// How a counting line is placed when none has been drawn by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineType {
    #[default]
    Manual,
    Horizontal,
    Vertical,
}

/// The user-defined line that vehicles are counted against.
///
/// The line is directed from `start` to `end`; which side is "up" and which is
/// "down" follows from that direction (see [`LineGeometry::normal`]), so the
/// labels are only as meaningful as the order the endpoints were drawn in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountingLine {
    pub start: Point,
    pub end: Point,
    /// Half-width of the tolerance band, in pixels.
    pub band_px: f64,
    pub invert_direction: bool,
}

impl CountingLine {
    pub fn new(start: Point, end: Point) -> Self {
        Self {
            start,
            end,
            band_px: DEFAULT_BAND_PX,
            invert_direction: false,
        }
    }

    pub fn with_band(mut self, band_px: f64) -> Self {
        self.band_px = band_px;
        self
    }

    pub fn with_invert_direction(mut self, invert: bool) -> Self {
        self.invert_direction = invert;
        self
    }

    /// Build a line across the middle of a `width` x `height` frame.
    ///
    /// Returns `None` for [`LineType::Manual`], which has no automatic placement.
    pub fn auto(line_type: LineType, width: u32, height: u32) -> Option<Self> {
        let (w, h) = (width as i32, height as i32);
        match line_type {
            LineType::Manual => None,
            LineType::Horizontal => Some(Self::new(Point::new(0, h / 2), Point::new(w, h / 2))),
            LineType::Vertical => Some(Self::new(Point::new(w / 2, 0), Point::new(w / 2, h))),
        }
    }

    /// Both endpoints coincide; no side of the line is defined.
    pub fn is_degenerate(&self) -> bool {
        self.start == self.end
    }

    pub fn midpoint(&self) -> Vector2<f64> {
        (Vector2::from(self.start) + Vector2::from(self.end)) * 0.5
    }

    pub fn geometry(&self) -> LineGeometry {
        LineGeometry::new(self.start, self.end)
    }
}

/// Precomputed vectors for a directed segment A -> B.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineGeometry {
    origin: Vector2<f64>,
    direction: Vector2<f64>,
    length: f64,
    length_sq: f64,
}

impl LineGeometry {
    pub fn new(start: Point, end: Point) -> Self {
        let origin = Vector2::from(start);
        let direction = Vector2::from(end) - origin;
        let length_sq = direction.norm_squared();
        // A zero-length line normalizes by 1 so nothing divides by zero.
        let length = if length_sq > 0.0 { length_sq.sqrt() } else { 1.0 };
        Self {
            origin,
            direction,
            length,
            length_sq,
        }
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    /// Unit vector along A -> B (the zero vector for a degenerate line).
    pub fn unit_direction(&self) -> Vector2<f64> {
        self.direction / self.length
    }

    /// Unit normal `(-dy, dx) / L`, pointing to the left of A -> B.
    pub fn normal(&self) -> Vector2<f64> {
        Vector2::new(-self.direction.y, self.direction.x) / self.length
    }

    /// Signed perpendicular distance of `p` to the infinite line through A -> B.
    ///
    /// Positive values lie on the left of the directed line (positive 2D cross
    /// product of the line direction with `p - A`).
    pub fn signed_distance(&self, p: Vector2<f64>) -> f64 {
        self.direction.perp(&(p - self.origin)) / self.length
    }

    /// Projection parameter of `p` along the segment: 0 at A, 1 at B.
    pub fn projection(&self, p: Vector2<f64>) -> f64 {
        if self.length_sq == 0.0 {
            return 0.0;
        }
        (p - self.origin).dot(&self.direction) / self.length_sq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn horizontal() -> LineGeometry {
        LineGeometry::new(Point::new(100, 300), Point::new(500, 300))
    }

    #[test]
    fn test_signed_distance_sign_convention() {
        let geom = horizontal();
        // In image coordinates +y is the left-hand side of a left-to-right line.
        assert_eq!(geom.signed_distance(Vector2::new(300.0, 310.0)), 10.0);
        assert_eq!(geom.signed_distance(Vector2::new(300.0, 288.0)), -12.0);
        assert_eq!(geom.signed_distance(Vector2::new(42.0, 300.0)), 0.0);
    }

    #[test]
    fn test_signed_distance_diagonal() {
        let geom = LineGeometry::new(Point::new(0, 0), Point::new(100, 100));
        let d = geom.signed_distance(Vector2::new(100.0, 0.0));
        assert!((d + 100.0 / 2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_projection() {
        let geom = horizontal();
        assert_eq!(geom.projection(Vector2::new(100.0, 0.0)), 0.0);
        assert_eq!(geom.projection(Vector2::new(300.0, 50.0)), 0.5);
        assert_eq!(geom.projection(Vector2::new(500.0, 300.0)), 1.0);
        assert!(geom.projection(Vector2::new(60.0, 300.0)) < 0.0);
    }

    #[test]
    fn test_normal_is_unit_and_perpendicular() {
        let geom = LineGeometry::new(Point::new(10, 20), Point::new(70, 100));
        let n = geom.normal();
        assert!((n.norm() - 1.0).abs() < 1e-12);
        assert!(n.dot(&geom.unit_direction()).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_line_does_not_divide_by_zero() {
        let geom = LineGeometry::new(Point::new(5, 5), Point::new(5, 5));
        assert_eq!(geom.length(), 1.0);
        assert_eq!(geom.signed_distance(Vector2::new(50.0, 50.0)), 0.0);
        assert_eq!(geom.projection(Vector2::new(50.0, 50.0)), 0.0);
        assert_eq!(geom.normal(), Vector2::zeros());
    }

    #[test]
    fn test_auto_lines() {
        let h = CountingLine::auto(LineType::Horizontal, 1280, 720).unwrap();
        assert_eq!((h.start, h.end), (Point::new(0, 360), Point::new(1280, 360)));
        let v = CountingLine::auto(LineType::Vertical, 1280, 720).unwrap();
        assert_eq!((v.start, v.end), (Point::new(640, 0), Point::new(640, 720)));
        assert!(CountingLine::auto(LineType::Manual, 1280, 720).is_none());
    }
}
