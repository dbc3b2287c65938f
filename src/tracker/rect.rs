use serde::{Deserialize, Serialize};

use crate::tracker::geometry::Point;

/// Axis-aligned bounding box in integer pixel coordinates (TLBR format).
///
/// Serialized as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rect {
    /// Create a Rect from TLBR coordinates.
    #[inline]
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Create a square box of side `2 * half` centred on `center`.
    #[inline]
    pub fn around(center: Point, half: i32) -> Self {
        Self::new(
            center.x - half,
            center.y - half,
            center.x + half,
            center.y + half,
        )
    }

    #[inline]
    pub fn to_tlbr(&self) -> [i32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    #[inline]
    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// Integer centre point, rounded toward negative infinity.
    #[inline]
    pub fn centroid(&self) -> Point {
        Point::new(
            (self.x1 + self.x2).div_euclid(2),
            (self.y1 + self.y2).div_euclid(2),
        )
    }

    #[inline]
    pub fn area(&self) -> i64 {
        self.width().max(0) as i64 * self.height().max(0) as i64
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x1 + dx, self.y1 + dy, self.x2 + dx, self.y2 + dy)
    }

    /// Clamp into a `width` x `height` frame, swapping corners if inverted.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let max_x = (width as i32 - 1).max(0);
        let max_y = (height as i32 - 1).max(0);
        let (mut x1, mut y1) = (self.x1.clamp(0, max_x), self.y1.clamp(0, max_y));
        let (mut x2, mut y2) = (self.x2.clamp(0, max_x), self.y2.clamp(0, max_y));
        if x2 < x1 {
            std::mem::swap(&mut x1, &mut x2);
        }
        if y2 < y1 {
            std::mem::swap(&mut y1, &mut y2);
        }
        Self::new(x1, y1, x2, y2)
    }

    /// Calculate Intersection over Union (IoU) with another bounding box.
    pub fn iou(&self, other: &Rect) -> f64 {
        let inter = Rect::new(
            self.x1.max(other.x1),
            self.y1.max(other.y1),
            self.x2.min(other.x2),
            self.y2.min(other.y2),
        )
        .area();

        let union_area = self.area() + other.area() - inter;

        if union_area > 0 {
            inter as f64 / union_area as f64
        } else {
            0.0
        }
    }
}

impl From<[i32; 4]> for Rect {
    fn from([x1, y1, x2, y2]: [i32; 4]) -> Self {
        Self::new(x1, y1, x2, y2)
    }
}

impl From<Rect> for [i32; 4] {
    fn from(r: Rect) -> Self {
        r.to_tlbr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centroid_floors() {
        assert_eq!(Rect::new(10, 20, 41, 61).centroid(), Point::new(25, 40));
        assert_eq!(Rect::new(-3, -3, 0, 0).centroid(), Point::new(-2, -2));
    }

    #[test]
    fn test_clamp_to_frame() {
        let r = Rect::new(-10, 5, 700, 500).clamp_to(640, 480);
        assert_eq!(r.to_tlbr(), [0, 5, 639, 479]);

        let inverted = Rect::new(50, 60, 10, 20).clamp_to(640, 480);
        assert_eq!(inverted.to_tlbr(), [10, 20, 50, 60]);
    }

    #[test]
    fn test_iou() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 15, 15);

        // Intersection: 5x5 = 25
        // Union: 100 + 100 - 25 = 175
        assert!((a.iou(&b) - 25.0 / 175.0).abs() < 1e-9);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(20, 20, 30, 30);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_same_box() {
        let a = Rect::new(0, 0, 10, 10);
        assert!((a.iou(&a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_serde_as_array() {
        let r: Rect = serde_json::from_str("[1, 2, 30, 40]").unwrap();
        assert_eq!(r, Rect::new(1, 2, 30, 40));
        assert_eq!(serde_json::to_string(&r).unwrap(), "[1,2,30,40]");
    }
}
