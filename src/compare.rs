//! Raster comparison engine.
//!
//! Quantifies how close a produced raster is to its golden reference:
//! absolute and relative error statistics over the positions where both
//! rasters hold valid data, plus a count of NaN mismatches. Pure and
//! deterministic; all side effects live in the orchestration layer.

use crate::error::CompareError;
use crate::raster::Raster;
use serde::Serialize;

/// Relative-error statistics, defined only over positions where the
/// reference sample is strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RelativeStats {
  /// Largest `|reference - candidate| / reference` observed.
  pub max_rel_error: f64,
  /// Mean relative error over the strictly-positive-reference positions.
  pub mean_rel_error: f64,
}

/// Error-statistics report for one reference/candidate raster pair.
#[derive(Debug, Clone, Serialize)]
pub struct DiffReport {
  /// Largest `|reference - candidate|` over comparable positions.
  pub max_abs_error: f64,
  /// Mean absolute error over comparable positions.
  pub mean_abs_error: f64,
  /// (row, column) of the first position achieving `max_abs_error`.
  pub max_abs_error_coords: (usize, usize),
  /// Relative statistics, absent when no reference sample is strictly
  /// positive (distinguishable from a genuine 0.0).
  pub relative: Option<RelativeStats>,
  /// Positions where exactly one raster holds NaN.
  pub wrong_nan_count: u64,
  /// Positions where both rasters hold valid data.
  pub compared_samples: u64,
  /// Comparable positions whose reference sample is strictly positive.
  pub positive_reference_samples: u64,
}

impl DiffReport {
  /// Maximum relative error, or 0.0 when the relative branch is undefined.
  ///
  /// Convenience for threshold checks; callers that must distinguish
  /// "no positive reference samples" inspect `relative` directly.
  pub fn max_rel_error_or_zero(&self) -> f64 {
    self.relative.map(|rel| rel.max_rel_error).unwrap_or(0.0)
  }
}

/// Compares a candidate raster against its golden reference.
///
/// Iterates every position in row-major order. Positions where both
/// samples are NaN are skipped entirely; positions where exactly one is
/// NaN increment `wrong_nan_count` and contribute to nothing else. The
/// relative branch only accumulates where the reference is strictly
/// positive. Maxima use strict comparison, so ties keep the first
/// position encountered.
///
/// Returns `ShapeMismatch` when dimensions differ and
/// `NoComparableSamples` when not a single position holds valid data in
/// both rasters (a mean over zero samples is undefined, not zero).
pub fn compare(reference: &Raster, candidate: &Raster) -> Result<DiffReport, CompareError> {
  if reference.width() != candidate.width() || reference.height() != candidate.height() {
    return Err(CompareError::ShapeMismatch {
      reference_width: reference.width(),
      reference_height: reference.height(),
      candidate_width: candidate.width(),
      candidate_height: candidate.height(),
    });
  }

  let mut max_abs_error = f64::NEG_INFINITY;
  let mut max_abs_error_coords = (0usize, 0usize);
  let mut abs_sum = 0.0f64;
  let mut max_rel_error = f64::NEG_INFINITY;
  let mut rel_sum = 0.0f64;
  let mut wrong_nan_count = 0u64;
  let mut compared_samples = 0u64;
  let mut positive_reference_samples = 0u64;

  for row in 0..reference.height() {
    for col in 0..reference.width() {
      let r = reference.get(row, col) as f64;
      let c = candidate.get(row, col) as f64;

      if r.is_nan() || c.is_nan() {
        if r.is_nan() != c.is_nan() {
          wrong_nan_count += 1;
        }
        continue;
      }

      let abs_err = (r - c).abs();
      abs_sum += abs_err;
      if abs_err > max_abs_error {
        max_abs_error = abs_err;
        max_abs_error_coords = (row, col);
      }
      compared_samples += 1;

      if r > 0.0 {
        let rel_err = abs_err / r;
        rel_sum += rel_err;
        if rel_err > max_rel_error {
          max_rel_error = rel_err;
        }
        positive_reference_samples += 1;
      }
    }
  }

  if compared_samples == 0 {
    return Err(CompareError::NoComparableSamples);
  }

  let relative = if positive_reference_samples > 0 {
    Some(RelativeStats {
      max_rel_error,
      mean_rel_error: rel_sum / positive_reference_samples as f64,
    })
  } else {
    None
  };

  Ok(DiffReport {
    max_abs_error,
    mean_abs_error: abs_sum / compared_samples as f64,
    max_abs_error_coords,
    relative,
    wrong_nan_count,
    compared_samples,
    positive_reference_samples,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn raster(width: usize, height: usize, samples: &[f32]) -> Raster {
    Raster::from_samples(width, height, samples.to_vec())
  }

  #[test]
  fn self_comparison_is_identity() {
    let r = raster(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let report = compare(&r, &r).expect("comparable");

    assert_eq!(report.max_abs_error, 0.0);
    assert_eq!(report.mean_abs_error, 0.0);
    assert_eq!(report.wrong_nan_count, 0);
    assert_eq!(report.compared_samples, 6);

    let rel = report.relative.expect("all references positive");
    assert_eq!(rel.max_rel_error, 0.0);
    assert_eq!(rel.mean_rel_error, 0.0);
  }

  #[test]
  fn shared_nan_contributes_nothing() {
    let reference = raster(2, 1, &[f32::NAN, 2.0]);
    let candidate = raster(2, 1, &[f32::NAN, 2.0]);
    let report = compare(&reference, &candidate).expect("comparable");

    assert_eq!(report.wrong_nan_count, 0);
    assert_eq!(report.compared_samples, 1);
    assert_eq!(report.max_abs_error, 0.0);
  }

  #[test]
  fn lone_nan_counts_once_regardless_of_magnitude() {
    let reference = raster(2, 1, &[f32::NAN, 2.0]);
    let candidate = raster(2, 1, &[1.0e30, 2.0]);
    let report = compare(&reference, &candidate).expect("comparable");

    assert_eq!(report.wrong_nan_count, 1);
    // The mismatched position must not pollute the error statistics.
    assert_eq!(report.max_abs_error, 0.0);
    assert_eq!(report.compared_samples, 1);

    let flipped = compare(&candidate, &reference).expect("comparable");
    assert_eq!(flipped.wrong_nan_count, 1);
  }

  #[test]
  fn non_positive_references_never_reach_the_relative_branch() {
    // Large absolute error at a zero and a negative reference sample.
    let reference = raster(3, 1, &[0.0, -5.0, 4.0]);
    let candidate = raster(3, 1, &[100.0, 95.0, 5.0]);
    let report = compare(&reference, &candidate).expect("comparable");

    assert_eq!(report.max_abs_error, 100.0);
    assert_eq!(report.positive_reference_samples, 1);

    let rel = report.relative.expect("one positive reference");
    assert_eq!(rel.max_rel_error, 0.25);
    assert_eq!(rel.mean_rel_error, 0.25);
  }

  #[test]
  fn relative_stats_absent_when_no_reference_is_positive() {
    let reference = raster(2, 1, &[0.0, -1.0]);
    let candidate = raster(2, 1, &[3.0, -1.0]);
    let report = compare(&reference, &candidate).expect("comparable");

    assert!(report.relative.is_none());
    assert_eq!(report.max_rel_error_or_zero(), 0.0);
  }

  #[test]
  fn max_coords_identify_the_worst_position() {
    let reference = raster(2, 2, &[1.0, 1.0, 1.0, 1.0]);
    let candidate = raster(2, 2, &[1.0, 1.5, 4.0, 1.1]);
    let report = compare(&reference, &candidate).expect("comparable");

    assert_eq!(report.max_abs_error, 3.0);
    assert_eq!(report.max_abs_error_coords, (1, 0));

    let (row, col) = report.max_abs_error_coords;
    let at_coords = (reference.get(row, col) - candidate.get(row, col)).abs() as f64;
    assert_eq!(at_coords, report.max_abs_error);
  }

  #[test]
  fn ties_keep_the_first_position_in_row_major_order() {
    let reference = raster(2, 2, &[0.0, 0.0, 0.0, 0.0]);
    let candidate = raster(2, 2, &[0.0, 2.0, 2.0, 0.0]);
    let report = compare(&reference, &candidate).expect("comparable");

    assert_eq!(report.max_abs_error, 2.0);
    assert_eq!(report.max_abs_error_coords, (0, 1));
  }

  #[test]
  fn mean_rel_divides_by_positive_reference_count() {
    // Two comparable samples, one positive reference: the relative mean
    // must average over one sample, not two.
    let reference = raster(2, 1, &[2.0, -1.0]);
    let candidate = raster(2, 1, &[1.0, -1.0]);
    let report = compare(&reference, &candidate).expect("comparable");

    assert_eq!(report.compared_samples, 2);
    assert_eq!(report.positive_reference_samples, 1);
    let rel = report.relative.expect("one positive reference");
    assert_eq!(rel.mean_rel_error, 0.5);
  }

  #[test]
  fn all_nan_pair_is_degenerate() {
    let reference = raster(2, 1, &[f32::NAN, f32::NAN]);
    let candidate = raster(2, 1, &[f32::NAN, f32::NAN]);

    assert!(matches!(
      compare(&reference, &candidate),
      Err(CompareError::NoComparableSamples)
    ));
  }

  #[test]
  fn mismatched_shapes_are_rejected() {
    let reference = Raster::filled(2, 2, 1.0);
    let candidate = Raster::filled(3, 2, 1.0);

    assert!(matches!(
      compare(&reference, &candidate),
      Err(CompareError::ShapeMismatch { .. })
    ));
  }
}
