//! Row-major partitioning of an [`Area`] into non-overlapping segments.

use super::{Area, Segment};
use crate::error::{Error, Result};

/// Stateful generator of successive segments covering an [`Area`].
///
/// Segments advance along the current row band at the previous segment's
/// right edge, then wrap to column 0 of the next band. Nothing is revisited,
/// and once the area is exhausted every further call yields
/// [`Segment::empty`] until [`reset`](Self::reset).
#[derive(Debug, Clone)]
pub struct AreaPartitioner {
    area: Area,
    fragment_width: usize,
    fragment_height: usize,
    last: Option<Segment>,
    exhausted: bool,
}

impl AreaPartitioner {
    pub fn new(area: Area, fragment_width: usize, fragment_height: usize) -> Result<Self> {
        if fragment_width == 0 || fragment_height == 0 {
            return Err(Error::config("fragment dimensions must be > 0"));
        }
        if fragment_width > area.width || fragment_height > area.height {
            return Err(Error::config(format!(
                "fragment {}x{} exceeds area {}x{}",
                fragment_width, fragment_height, area.width, area.height
            )));
        }

        Ok(Self {
            area,
            fragment_width,
            fragment_height,
            last: None,
            exhausted: false,
        })
    }

    /// The area being carved up.
    pub fn area(&self) -> Area {
        self.area
    }

    /// Fragment width and height in pixels.
    pub fn fragment_size(&self) -> (usize, usize) {
        (self.fragment_width, self.fragment_height)
    }

    /// Produce the next segment, `preferred_fragment_count` fragments wide.
    ///
    /// A count of zero is treated as one so that only exhaustion can produce
    /// an empty segment.
    pub fn partition(&mut self, preferred_fragment_count: usize) -> Segment {
        if self.exhausted {
            return Segment::empty();
        }

        let count = preferred_fragment_count.max(1);

        let (x, y) = match self.last {
            None => (0, 0),
            Some(last) if last.right() < self.area.width => (last.right(), last.y),
            Some(last) => (0, last.bottom()),
        };

        if y >= self.area.height {
            self.exhausted = true;
            return Segment::empty();
        }

        let width = count
            .saturating_mul(self.fragment_width)
            .min(self.area.width - x);
        let height = self.fragment_height.min(self.area.height - y);

        let segment = Segment::new(x, y, width, height);
        self.last = Some(segment);
        segment
    }

    /// Whether the area has been fully handed out.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Rewind to the top-left corner.
    pub fn reset(&mut self) {
        self.last = None;
        self.exhausted = false;
    }
}
