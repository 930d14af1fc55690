//! 2-D floating-point raster type.

/// A 2-D grid of floating-point intensity samples in row-major order.
///
/// NaN marks an invalid/masked sample, matching the convention of the
/// scientific image files the harness consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
  width: usize,
  height: usize,
  samples: Vec<f32>,
}

impl Raster {
  /// Creates a raster from row-major samples.
  ///
  /// # Panics
  ///
  /// Panics if `samples.len() != width * height`.
  pub fn from_samples(width: usize, height: usize, samples: Vec<f32>) -> Self {
    assert_eq!(
      samples.len(),
      width * height,
      "sample count must equal width * height"
    );
    Self {
      width,
      height,
      samples,
    }
  }

  /// Creates a raster filled with a constant value.
  pub fn filled(width: usize, height: usize, value: f32) -> Self {
    Self {
      width,
      height,
      samples: vec![value; width * height],
    }
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  /// Returns the sample at (row, column).
  ///
  /// # Panics
  ///
  /// Panics if the position is out of bounds.
  pub fn get(&self, row: usize, col: usize) -> f32 {
    assert!(row < self.height && col < self.width, "position out of bounds");
    self.samples[row * self.width + col]
  }

  /// Overwrites the sample at (row, column).
  pub fn set(&mut self, row: usize, col: usize, value: f32) {
    assert!(row < self.height && col < self.width, "position out of bounds");
    self.samples[row * self.width + col] = value;
  }

  /// Row-major view of the raw samples.
  pub fn samples(&self) -> &[f32] {
    &self.samples
  }
}
