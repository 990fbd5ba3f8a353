/// An axis-aligned face bounding box in the pixel space of one image.
///
/// Stored positions keep the geometry of whatever resolution the image had
/// when they were written; comparisons against a fresh detection rescale the
/// stored box first (see [`FaceBox::overlap_percentage`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct FaceBox {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl FaceBox {
    pub fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Right edge; widened so boxes near `i32::MAX` cannot overflow.
    pub fn right(&self) -> i64 {
        i64::from(self.left) + i64::from(self.width)
    }

    pub fn bottom(&self) -> i64 {
        i64::from(self.top) + i64::from(self.height)
    }

    pub fn area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }

    /// Intersection area between `self` and `other` after multiplying every
    /// coordinate of `other` by `other_scale`.
    pub fn intersection_area(&self, other: &FaceBox, other_scale: f64) -> f64 {
        let [ol, ot, or, ob] = other.scaled_edges(other_scale);

        let dx = (self.right() as f64).min(or) - (self.left as f64).max(ol);
        let dy = (self.bottom() as f64).min(ob) - (self.top as f64).max(ot);
        if dx < 0.0 || dy < 0.0 {
            return 0.0;
        }
        dx * dy
    }

    /// Percentage (0-100) of this box's area covered by the scaled `other`.
    ///
    /// Normalized by `self` only, so the metric is asymmetric: a small
    /// `other` fully inside a large `self` scores low.
    pub fn overlap_percentage(&self, other: &FaceBox, other_scale: f64) -> f64 {
        let area = self.area();
        if area <= 0.0 {
            return 0.0;
        }
        self.intersection_area(other, other_scale) / area * 100.0
    }

    fn scaled_edges(&self, scale: f64) -> [f64; 4] {
        [
            self.left as f64 * scale,
            self.top as f64 * scale,
            self.right() as f64 * scale,
            self.bottom() as f64 * scale,
        ]
    }
}
