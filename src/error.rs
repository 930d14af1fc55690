//! Error types for the verification harness.
//!
//! Library-level failures are split by subsystem:
//! - FITS errors (file decoding, unsupported layouts)
//! - Comparison errors (shape mismatch, degenerate sample sets)
//!
//! Everything here derives `thiserror::Error`; the orchestration layer
//! and the binary wrap these in `anyhow` where context matters more
//! than the concrete variant.

use thiserror::Error;

/// Result type alias for harness library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the harness library.
#[derive(Error, Debug)]
pub enum Error {
  /// FITS decoding or encoding error
  #[error("FITS error: {0}")]
  Fits(#[from] FitsError),

  /// Raster comparison error
  #[error("Compare error: {0}")]
  Compare(#[from] CompareError),

  /// I/O error (file reading, directory management)
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

/// Errors that occur while reading or writing FITS files.
///
/// The harness only understands the subset of FITS it needs: a primary
/// HDU holding exactly one 2-D floating-point image.
#[derive(Error, Debug)]
pub enum FitsError {
  /// File does not start with a valid `SIMPLE` card
  #[error("not a FITS file: missing SIMPLE card")]
  NotFits,

  /// A mandatory header keyword is absent
  #[error("missing mandatory keyword {keyword}")]
  MissingKeyword { keyword: &'static str },

  /// A header card could not be parsed
  #[error("malformed header card: {card:?}")]
  MalformedCard { card: String },

  /// The header ended without an END card
  #[error("header ended without END card")]
  UnterminatedHeader,

  /// Sample format the harness does not support
  #[error("unsupported BITPIX {bitpix} (expected -32 or -64)")]
  UnsupportedBitpix { bitpix: i64 },

  /// The data array is not two-dimensional
  #[error("expected a 2-D image, found NAXIS = {naxis}")]
  NotTwoDimensional { naxis: i64 },

  /// Data unit shorter than the header promised
  #[error("truncated data unit: expected {expected} bytes, found {found}")]
  TruncatedData { expected: usize, found: usize },

  /// Underlying I/O failure while reading or writing
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

/// Errors that occur while comparing two rasters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompareError {
  /// The rasters do not have identical dimensions
  #[error("shape mismatch: reference is {reference_width}x{reference_height}, candidate is {candidate_width}x{candidate_height}")]
  ShapeMismatch {
    reference_width: usize,
    reference_height: usize,
    candidate_width: usize,
    candidate_height: usize,
  },

  /// Every position was NaN in at least one raster, so no statistic is defined
  #[error("no comparable samples: every position is NaN in at least one raster")]
  NoComparableSamples,
}
