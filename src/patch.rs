//! The patch collaborator interface and its rectangle geometry.

use crate::error::ForestError;

/// An axis-aligned rectangle with inclusive bounds, in patch coordinates.
///
/// A `Rect` covers the pixel range `[x0, x1] × [y0, y1]`. Rectangles are
/// plain values; whether one fits a concrete patch is checked against that
/// patch's side length via [`Rect::require_within`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
}

impl Rect {
    /// Create a rectangle from inclusive bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidRect`] when `x1 < x0` or `y1 < y0`.
    pub fn try_new(x0: usize, y0: usize, x1: usize, y1: usize) -> Result<Self, ForestError> {
        if x1 < x0 || y1 < y0 {
            return Err(ForestError::InvalidRect { x0, y0, x1, y1 });
        }
        Ok(Self { x0, y0, x1, y1 })
    }

    /// Internal constructor for bounds already known to be ordered.
    pub(crate) fn new_unchecked(x0: usize, y0: usize, x1: usize, y1: usize) -> Self {
        debug_assert!(x0 <= x1 && y0 <= y1);
        Self { x0, y0, x1, y1 }
    }

    /// Number of pixels covered (inclusive bounds, so never zero).
    #[must_use]
    pub fn area(&self) -> usize {
        (self.x1 - self.x0 + 1) * (self.y1 - self.y0 + 1)
    }

    /// Check that this rectangle lies inside a patch of side length `size`.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::RectOutOfBounds`] when either end coordinate
    /// is `>= size`.
    pub fn require_within(&self, size: usize) -> Result<(), ForestError> {
        if self.x1 >= size || self.y1 >= size {
            return Err(ForestError::RectOutOfBounds {
                x1: self.x1,
                y1: self.y1,
                size,
            });
        }
        Ok(())
    }

    /// Left bound.
    #[must_use]
    pub fn x0(&self) -> usize {
        self.x0
    }

    /// Top bound.
    #[must_use]
    pub fn y0(&self) -> usize {
        self.y0
    }

    /// Right bound (inclusive).
    #[must_use]
    pub fn x1(&self) -> usize {
        self.x1
    }

    /// Bottom bound (inclusive).
    #[must_use]
    pub fn y1(&self) -> usize {
        self.y1
    }
}

/// A fixed-size multi-channel image patch with O(1) rectangle sums.
///
/// This is the only interface the forest requires of its training and
/// prediction data. Implementations typically back `sum` with a precomputed
/// summed-area table; the forest never reads individual pixels.
///
/// Patches are immutable once constructed: `size` and `n_channels` must not
/// change between calls, and `sum` must be correct for every rectangle fully
/// inside `[0, size) × [0, size)`.
pub trait Patch {
    /// Side length of the square patch; rectangles live in `[0, size)²`.
    fn size(&self) -> usize;

    /// Number of image channels.
    fn n_channels(&self) -> usize;

    /// Sum of channel `channel` over `rect` (inclusive bounds), in O(1).
    fn sum(&self, rect: Rect, channel: usize) -> f64;
}

impl<P: Patch + ?Sized> Patch for &P {
    fn size(&self) -> usize {
        (**self).size()
    }

    fn n_channels(&self) -> usize {
        (**self).n_channels()
    }

    fn sum(&self, rect: Rect, channel: usize) -> f64 {
        (**self).sum(rect, channel)
    }
}
