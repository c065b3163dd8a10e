//! Two-dimensional work regions.
//!
//! An [`Area`] is the full pixel region of one scheduling run. It is carved
//! into [`Segment`]s by an [`AreaPartitioner`], each segment being one unit
//! of work handed to a single device.

pub mod partitioner;

pub use partitioner::AreaPartitioner;

use std::fmt;

/// Total width and height of the region computed in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Area {
    pub width: usize,
    pub height: usize,
}

impl Area {
    /// A `width x height` pixel region.
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Total pixel count.
    pub fn pixels(&self) -> usize {
        self.width * self.height
    }

    /// True when there is nothing to compute.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether `segment` lies completely inside this area.
    pub fn contains(&self, segment: &Segment) -> bool {
        segment.x + segment.width <= self.width && segment.y + segment.height <= self.height
    }
}

/// Axis-aligned rectangle inside an [`Area`].
///
/// An empty segment (zero width or height) is the exhaustion sentinel
/// returned by [`AreaPartitioner::partition`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Segment {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Segment {
    /// The `width x height` rectangle whose top-left pixel is `(x, y)`.
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The exhaustion sentinel.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True for zero width or height, including the sentinel.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixels(&self) -> usize {
        self.width * self.height
    }

    /// One past the last column.
    pub fn right(&self) -> usize {
        self.x + self.width
    }

    /// One past the last row.
    pub fn bottom(&self) -> usize {
        self.y + self.height
    }

    /// Whether the two share at least one pixel. Empty segments never do.
    pub fn overlaps(&self, other: &Segment) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}x{} at ({}, {})]",
            self.width, self.height, self.x, self.y
        )
    }
}

/// Full-area image assembled from per-segment results.
///
/// Tracks how many times each pixel was written so callers can verify a run
/// covered the area exactly once.
#[derive(Debug, Clone)]
pub struct Canvas {
    area: Area,
    pixels: Vec<f32>,
    coverage: Vec<u8>,
}

impl Canvas {
    /// A zeroed canvas with no pixel written yet.
    pub fn new(area: Area) -> Self {
        Self {
            area,
            pixels: vec![0.0; area.pixels()],
            coverage: vec![0; area.pixels()],
        }
    }

    /// The area this canvas covers.
    pub fn area(&self) -> Area {
        self.area
    }

    /// Copy a row-major `segment` result into place.
    pub fn blit(&mut self, segment: &Segment, data: &[f32]) {
        debug_assert!(self.area.contains(segment));
        debug_assert_eq!(data.len(), segment.pixels());

        for (row, src) in data.chunks_exact(segment.width).enumerate() {
            let start = (segment.y + row) * self.area.width + segment.x;
            self.pixels[start..start + segment.width].copy_from_slice(src);
            for hits in &mut self.coverage[start..start + segment.width] {
                *hits = hits.saturating_add(1);
            }
        }
    }

    /// Row-major pixel values.
    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// Value at `(x, y)`, or `None` outside the area.
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x >= self.area.width || y >= self.area.height {
            return None;
        }
        Some(self.pixels[y * self.area.width + x])
    }

    /// True when every pixel was written exactly once.
    pub fn is_exactly_covered(&self) -> bool {
        self.coverage.iter().all(|&hits| hits == 1)
    }

    /// Number of pixels never written.
    pub fn gaps(&self) -> usize {
        self.coverage.iter().filter(|&&hits| hits == 0).count()
    }

    /// Number of pixels written more than once.
    pub fn overlaps(&self) -> usize {
        self.coverage.iter().filter(|&&hits| hits > 1).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sentinel() {
        assert!(Segment::empty().is_empty());
        assert!(Segment::new(3, 4, 0, 7).is_empty());
        assert!(!Segment::new(0, 0, 1, 1).is_empty());
    }

    #[test]
    fn test_overlap() {
        let a = Segment::new(0, 0, 10, 4);
        let b = Segment::new(10, 0, 10, 4);
        let c = Segment::new(9, 3, 2, 2);

        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(b.overlaps(&c));
        assert!(!a.overlaps(&Segment::empty()));
    }

    #[test]
    fn test_canvas_coverage() {
        let mut canvas = Canvas::new(Area::new(4, 2));
        canvas.blit(&Segment::new(0, 0, 4, 1), &[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(canvas.gaps(), 4);

        canvas.blit(&Segment::new(0, 1, 2, 1), &[0.5, 0.6]);
        canvas.blit(&Segment::new(2, 1, 2, 1), &[0.7, 0.8]);
        assert!(canvas.is_exactly_covered());
        assert_eq!(canvas.get(3, 1), Some(0.8));

        canvas.blit(&Segment::new(1, 1, 1, 1), &[0.9]);
        assert_eq!(canvas.overlaps(), 1);
    }
}
